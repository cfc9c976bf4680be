/*
 *  display/screen.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Panel state on top of a driver: power and partial updates
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

use log::{debug, info};

use crate::display::error::DisplayError;
use crate::display::factory::BoxedDriver;
use crate::display::frame::DisplayFrame;
use crate::display::traits::Orientation;

/// Owns the driver and remembers what the panel shows, so only the
/// changed part of each frame goes over the wire.
pub struct Screen {
    driver: BoxedDriver,
    brightness: u8,
    last: Option<DisplayFrame>,
    is_on: bool,
}

impl Screen {
    pub fn new(driver: BoxedDriver, brightness: u8) -> Self {
        Self { driver, brightness, last: None, is_on: false }
    }

    /// (Re)initialize the panel; the next write sends a full frame.
    pub fn init(&mut self) -> Result<(), DisplayError> {
        self.last = None;
        self.is_on = false;
        self.driver.init()?;
        match self.driver.set_orientation(Orientation::Landscape) {
            Ok(()) | Err(DisplayError::UnsupportedOperation) => {}
            Err(e) => return Err(e),
        }
        if self.driver.capabilities().supports_brightness {
            self.driver.set_brightness(self.brightness)?;
        }
        self.is_on = true;
        let (w, h) = self.driver.dimensions();
        info!("Display {} ready, {}x{}, brightness {}", self.driver.name(), w, h, self.brightness);
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        self.driver.dimensions()
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn last_frame(&self) -> Option<&DisplayFrame> {
        self.last.as_ref()
    }

    pub fn on(&mut self) -> Result<(), DisplayError> {
        if self.is_on {
            return Ok(());
        }
        self.driver.screen_on()?;
        self.is_on = true;
        debug!("Screen on");
        Ok(())
    }

    /// Power down and blank the panel. The next write sends a full frame.
    pub fn off(&mut self) -> Result<(), DisplayError> {
        if !self.is_on {
            return Ok(());
        }
        self.last = None;
        self.driver.screen_off()?;
        self.driver.clear()?;
        self.is_on = false;
        debug!("Screen off");
        Ok(())
    }

    /// Send `frame`, or just the part that differs from the previous one.
    ///
    /// Returns false when the panel already shows this frame. After a
    /// failure the previous frame is forgotten and the next write is full.
    pub fn write(&mut self, frame: &DisplayFrame) -> Result<bool, DisplayError> {
        let area = match &self.last {
            Some(prev) => match frame.dirty_region(prev) {
                Some(area) => area,
                None => return Ok(false),
            },
            None => frame.bounds(),
        };
        let bytes = frame.region_bytes(&area);
        if let Err(e) = self.driver.write_region(&area, &bytes) {
            self.last = None;
            return Err(e);
        }
        debug!(
            "Sent {}x{} at ({}, {})",
            area.size.width, area.size.height, area.top_left.x, area.top_left.y
        );
        self.last = Some(frame.clone());
        Ok(true)
    }
}
