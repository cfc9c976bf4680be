/*
 *  display/frame.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Rendered frame, ready for the panel
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

use core::convert::Infallible;
use embedded_graphics::pixelcolor::raw::RawU16;
use embedded_graphics::pixelcolor::{IntoStorage, Rgb565};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::vframebuf::VarFrameBuf;

/// One full panel image in RGB565.
///
/// Besides pixels the frame remembers the text it carries, which keeps log
/// lines and tests readable without OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    buf: VarFrameBuf<Rgb565>,
    labels: Vec<String>,
}

impl DisplayFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: VarFrameBuf::new(width, height, Rgb565::BLACK),
            labels: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.buf.width() as u32
    }

    pub fn height(&self) -> u32 {
        self.buf.height() as u32
    }

    pub fn bounds(&self) -> Rectangle {
        self.buf.bounds()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        self.buf.pixel(x, y)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains_text(&self, text: &str) -> bool {
        self.labels.iter().any(|l| l.contains(text))
    }

    pub(crate) fn add_label(&mut self, text: &str) {
        if !text.is_empty() {
            self.labels.push(text.to_string());
        }
    }

    /// Area that changed since `previous`, `None` if nothing did.
    pub fn dirty_region(&self, previous: &DisplayFrame) -> Option<Rectangle> {
        self.buf.changed_bounds(&previous.buf)
    }

    /// Little-endian RGB565 bytes of `area`, row by row.
    pub fn region_bytes(&self, area: &Rectangle) -> Vec<u8> {
        let mut out = Vec::with_capacity((area.size.width * area.size.height * 2) as usize);
        for c in self.buf.region(area) {
            out.extend_from_slice(&c.into_storage().to_le_bytes());
        }
        out
    }

    /// Raw 16-bit pixel values.
    #[cfg(test)]
    pub(crate) fn raw_pixels(&self) -> impl Iterator<Item = u16> + '_ {
        self.buf.as_slice().iter().map(|c| c.into_storage())
    }
}

impl OriginDimensions for DisplayFrame {
    fn size(&self) -> Size {
        self.buf.size()
    }
}

impl DrawTarget for DisplayFrame {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.buf.draw_iter(pixels)
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        self.buf.fill_contiguous(area, colors)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.buf.clear_color(color);
        Ok(())
    }
}

/// Decode little-endian RGB565 bytes, the inverse of `region_bytes`.
pub fn decode_rgb565(bytes: &[u8]) -> impl Iterator<Item = Rgb565> + '_ {
    bytes
        .chunks_exact(2)
        .map(|b| Rgb565::from(RawU16::new(u16::from_le_bytes([b[0], b[1]]))))
}
