/*
 *  display/drivers/simulated.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Simulated panel: every update lands in a PNG file
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use image::{ImageFormat, RgbImage};
use log::{debug, info};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::display::error::DisplayError;
use crate::display::frame::decode_rgb565;
use crate::display::traits::{check_region, DisplayCapabilities, DisplayDriver};
use crate::vframebuf::VarFrameBuf;

/// Desktop stand-in for the USB panel.
///
/// Brightness is applied to the saved image so dim settings look dim.
pub struct SimulatedDriver {
    capabilities: DisplayCapabilities,
    panel: VarFrameBuf<Rgb565>,
    output: PathBuf,
    brightness: u8,
    is_on: bool,
}

impl SimulatedDriver {
    pub fn new(width: u32, height: u32, output: impl Into<PathBuf>) -> Self {
        Self {
            capabilities: DisplayCapabilities {
                width,
                height,
                supports_brightness: true,
            },
            panel: VarFrameBuf::new(width, height, Rgb565::BLACK),
            output: output.into(),
            brightness: 100,
            is_on: false,
        }
    }

    fn to_image(&self) -> RgbImage {
        let (w, h) = (self.capabilities.width, self.capabilities.height);
        let scale = if self.is_on { self.brightness as u32 } else { 0 };
        let dim = |v: u8| ((v as u32 * scale) / 100) as u8;
        RgbImage::from_fn(w, h, |x, y| {
            let c = Rgb888::from(self.panel.pixel(x, y).unwrap_or(Rgb565::BLACK));
            image::Rgb([dim(c.r()), dim(c.g()), dim(c.b())])
        })
    }

    /// Replace the output file in one step so viewers never see half a PNG.
    fn save(&self) -> Result<(), DisplayError> {
        let dir = self.output.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            self.to_image().write_to(&mut writer, ImageFormat::Png)?;
            writer.flush()?;
        }
        tmp.persist(&self.output).map_err(|e| DisplayError::Io(e.error))?;
        debug!("Simulated panel saved to {}", self.output.display());
        Ok(())
    }
}

impl DisplayDriver for SimulatedDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn name(&self) -> &str {
        "simulated"
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.panel.clear_color(Rgb565::BLACK);
        self.is_on = true;
        self.save()?;
        info!("Simulated panel writing to {}", self.output.display());
        Ok(())
    }

    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        self.brightness = level.min(100);
        self.save()
    }

    fn screen_on(&mut self) -> Result<(), DisplayError> {
        self.is_on = true;
        self.save()
    }

    fn screen_off(&mut self) -> Result<(), DisplayError> {
        self.is_on = false;
        self.save()
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.panel.clear_color(Rgb565::BLACK);
        self.save()
    }

    fn write_region(&mut self, area: &Rectangle, pixels: &[u8]) -> Result<(), DisplayError> {
        check_region(&self.capabilities, area, pixels)?;
        let _ = self.panel.fill_contiguous(area, decode_rgb565(pixels));
        self.save()
    }
}
