/*
 *  display/factory.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Builds the configured display driver
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

use log::info;
use std::path::Path;

use crate::config::{DisplayConfig, DriverKind};
use crate::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH, SIMULATED_FILE_NAME};
use crate::display::drivers::simulated::SimulatedDriver;
use crate::display::error::DisplayFactoryError;
use crate::display::traits::DisplayDriver;

#[cfg(feature = "driver-turing")]
use crate::display::drivers::turing::TuringDriver;
#[cfg(feature = "driver-turing")]
use crate::display::traits::Orientation;

/// Type alias for boxed display driver trait objects
pub type BoxedDriver = Box<dyn DisplayDriver>;

/// Factory for creating display drivers from configuration
pub struct DisplayDriverFactory;

impl DisplayDriverFactory {
    /// Create a display driver from configuration
    ///
    /// Nothing is opened yet; the hardware is touched on `init`.
    /// `app_dir` hosts the simulated panel image unless `output` says otherwise.
    pub fn create_from_config(
        config: &DisplayConfig,
        app_dir: &Path,
    ) -> Result<BoxedDriver, DisplayFactoryError> {
        Self::validate_config(config)?;

        match config.driver() {
            DriverKind::Simulated => {
                let (width, height) = config.size();
                let output = config
                    .output
                    .clone()
                    .unwrap_or_else(|| app_dir.join(SIMULATED_FILE_NAME));
                info!("Creating simulated driver ({}x{}) -> {}", width, height, output.display());
                Ok(Box::new(SimulatedDriver::new(width, height, output)))
            }

            #[cfg(feature = "driver-turing")]
            DriverKind::Turing => {
                info!("Creating Turing driver on port {}", config.port());
                Ok(Box::new(TuringDriver::new(config.port(), Orientation::Landscape)))
            }

            #[cfg(not(feature = "driver-turing"))]
            DriverKind::Turing => Err(DisplayFactoryError::DriverNotEnabled("driver-turing")),
        }
    }

    /// Validate a configuration without creating a driver
    pub fn validate_config(config: &DisplayConfig) -> Result<(), DisplayFactoryError> {
        if config.brightness() > 100 {
            return Err(DisplayFactoryError::ConfigError(format!(
                "brightness {} is out of range (0-100)",
                config.brightness()
            )));
        }
        let (width, height) = config.size();
        if width == 0 || height == 0 {
            return Err(DisplayFactoryError::ConfigError("display width and height must be > 0".to_string()));
        }
        if config.driver() == DriverKind::Turing && (width, height) != (DISPLAY_WIDTH, DISPLAY_HEIGHT) {
            return Err(DisplayFactoryError::ConfigError(format!(
                "the Turing panel is {}x{}, got {}x{}",
                DISPLAY_WIDTH, DISPLAY_HEIGHT, width, height
            )));
        }
        Ok(())
    }
}
