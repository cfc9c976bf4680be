/*
 *  display/traits.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for display driver abstraction
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

use embedded_graphics::primitives::Rectangle;

use crate::display::error::DisplayError;

/// Panel orientation, numbered the way the Turing firmware expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    Portrait,
    ReversePortrait,
    #[default]
    Landscape,
    ReverseLandscape,
}

impl Orientation {
    pub fn code(self) -> u8 {
        match self {
            Orientation::Portrait => 0,
            Orientation::ReversePortrait => 1,
            Orientation::Landscape => 2,
            Orientation::ReverseLandscape => 3,
        }
    }

    pub fn is_landscape(self) -> bool {
        matches!(self, Orientation::Landscape | Orientation::ReverseLandscape)
    }
}

/// Display capabilities and metadata
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Display width in pixels, as oriented
    pub width: u32,

    /// Display height in pixels, as oriented
    pub height: u32,

    /// Whether the display supports brightness control
    pub supports_brightness: bool,
}

/// Minimal hardware abstraction - all display drivers must implement this trait
///
/// Pixels travel as little-endian RGB565, row by row, which is what the
/// USB panels take on the wire.
pub trait DisplayDriver: Send {
    /// Returns the capabilities of this display
    fn capabilities(&self) -> &DisplayCapabilities;

    /// Returns the display dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Short name for logs
    fn name(&self) -> &str;

    /// Reset the panel and get it ready to take bitmaps
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Set display brightness, 0 (dark) to 100
    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError>;

    fn set_orientation(&mut self, _orientation: Orientation) -> Result<(), DisplayError> {
        Err(DisplayError::UnsupportedOperation)
    }

    fn screen_on(&mut self) -> Result<(), DisplayError>;

    fn screen_off(&mut self) -> Result<(), DisplayError>;

    /// Clear the display to black
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Write a block of pixels to `area`
    ///
    /// `pixels` holds `area.width * area.height` little-endian RGB565 values.
    fn write_region(&mut self, area: &Rectangle, pixels: &[u8]) -> Result<(), DisplayError>;
}

/// Check a region against the panel and the pixel payload.
pub fn check_region(caps: &DisplayCapabilities, area: &Rectangle, pixels: &[u8]) -> Result<(), DisplayError> {
    let invalid = || DisplayError::InvalidRegion {
        x: area.top_left.x,
        y: area.top_left.y,
        width: area.size.width,
        height: area.size.height,
    };
    if area.top_left.x < 0 || area.top_left.y < 0 || area.size.width == 0 || area.size.height == 0 {
        return Err(invalid());
    }
    if area.top_left.x as u32 + area.size.width > caps.width
        || area.top_left.y as u32 + area.size.height > caps.height
    {
        return Err(invalid());
    }
    let expected = (area.size.width * area.size.height * 2) as usize;
    if pixels.len() != expected {
        return Err(DisplayError::BufferSizeMismatch { expected, actual: pixels.len() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::*;

    fn caps() -> DisplayCapabilities {
        DisplayCapabilities { width: 480, height: 320, supports_brightness: true }
    }

    #[test]
    fn test_check_region() {
        let area = Rectangle::new(Point::new(470, 310), Size::new(10, 10));
        assert!(check_region(&caps(), &area, &[0; 200]).is_ok());
        assert!(matches!(
            check_region(&caps(), &area, &[0; 100]),
            Err(DisplayError::BufferSizeMismatch { expected: 200, actual: 100 })
        ));
        let area = Rectangle::new(Point::new(471, 0), Size::new(10, 10));
        assert!(matches!(check_region(&caps(), &area, &[0; 200]), Err(DisplayError::InvalidRegion { .. })));
        let area = Rectangle::new(Point::new(-1, 0), Size::new(1, 1));
        assert!(check_region(&caps(), &area, &[0; 2]).is_err());
    }

    #[test]
    fn test_orientation_codes() {
        assert_eq!(Orientation::Portrait.code(), 0);
        assert_eq!(Orientation::Landscape.code(), 2);
        assert!(Orientation::default().is_landscape());
    }
}
