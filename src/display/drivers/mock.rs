/*
 *  display/drivers/mock.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock display driver for testing without hardware
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

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

use crate::display::error::DisplayError;
use crate::display::frame::decode_rgb565;
use crate::display::traits::{check_region, DisplayCapabilities, DisplayDriver, Orientation};
use crate::vframebuf::VarFrameBuf;

use std::sync::{Arc, Mutex, MutexGuard};

/// Mock display driver for testing
///
/// Keeps what a real panel would show in memory and records every call.
/// The state is shared, so a test can hand the driver to a `Screen` and
/// still inspect it afterwards.
#[derive(Debug, Clone)]
pub struct MockDriver {
    capabilities: DisplayCapabilities,
    state: Arc<Mutex<MockDriverState>>,
}

/// Internal state for the mock driver (shared for inspection in tests)
#[derive(Debug)]
pub struct MockDriverState {
    /// What the panel currently shows
    pub panel: VarFrameBuf<Rgb565>,

    /// Number of times init() was called
    pub init_count: usize,

    /// Number of times clear() was called
    pub clear_count: usize,

    /// Number of successful write_region() calls
    pub write_count: usize,

    /// Regions written, oldest first
    pub regions: Vec<Rectangle>,

    /// Total pixel bytes written
    pub bytes_written: usize,

    pub last_brightness: Option<u8>,
    pub last_orientation: Option<Orientation>,

    pub is_on: bool,
    pub on_count: usize,
    pub off_count: usize,

    /// Simulate failures (for error testing)
    pub simulate_write_failure: bool,
    pub simulate_init_failure: bool,
}

impl MockDriverState {
    fn new(width: u32, height: u32) -> Self {
        Self {
            panel: VarFrameBuf::new(width, height, Rgb565::BLACK),
            init_count: 0,
            clear_count: 0,
            write_count: 0,
            regions: Vec::new(),
            bytes_written: 0,
            last_brightness: None,
            last_orientation: None,
            is_on: false,
            on_count: 0,
            off_count: 0,
            simulate_write_failure: false,
            simulate_init_failure: false,
        }
    }
}

impl MockDriver {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            capabilities: DisplayCapabilities {
                width,
                height,
                supports_brightness: true,
            },
            state: Arc::new(Mutex::new(MockDriverState::new(width, height))),
        }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockDriverState>, DisplayError> {
        self.state
            .lock()
            .map_err(|_| DisplayError::Other("mock driver state poisoned".to_string()))
    }

    /// Get pixel at position for testing
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgb565> {
        self.lock().ok()?.panel.pixel(x, y)
    }
}

impl DisplayDriver for MockDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        if state.simulate_init_failure {
            return Err(DisplayError::DeviceNotFound("Simulated init failure".to_string()));
        }
        state.init_count += 1;
        state.is_on = true;
        Ok(())
    }

    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        self.lock()?.last_brightness = Some(level.min(100));
        Ok(())
    }

    fn set_orientation(&mut self, orientation: Orientation) -> Result<(), DisplayError> {
        self.lock()?.last_orientation = Some(orientation);
        Ok(())
    }

    fn screen_on(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        state.is_on = true;
        state.on_count += 1;
        Ok(())
    }

    fn screen_off(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        state.is_on = false;
        state.off_count += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock()?;
        state.clear_count += 1;
        state.panel.clear_color(Rgb565::BLACK);
        Ok(())
    }

    fn write_region(&mut self, area: &Rectangle, pixels: &[u8]) -> Result<(), DisplayError> {
        check_region(&self.capabilities, area, pixels)?;
        let mut state = self.lock()?;
        if state.simulate_write_failure {
            return Err(DisplayError::SerialError("Simulated write failure".to_string()));
        }
        // infallible for an in-memory buffer
        let _ = state.panel.fill_contiguous(area, decode_rgb565(pixels));
        state.write_count += 1;
        state.bytes_written += pixels.len();
        state.regions.push(*area);
        Ok(())
    }
}
