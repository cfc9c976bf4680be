/*
 *  display/drivers/turing.rs
 *
 *  SpotiScreen - now playing, on the desk
 *  (c) 2020-26 Stuart Hunter
 *
 *  Turing smart screen 3.5" (revision A) over USB serial
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
use log::{debug, info, warn};
use serialport::{SerialPort, SerialPortType};
use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::display::error::DisplayError;
use crate::display::traits::{check_region, DisplayCapabilities, DisplayDriver, Orientation};

const BAUD_RATE: u32 = 115_200;
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Serial number the revision A panels report over USB.
const PANEL_SERIAL: &str = "USB35INCHIPSV2";
/// The panel drops off the bus on reset and needs this long to come back.
const RESET_DELAY: Duration = Duration::from_secs(5);
/// Rows per serial write when streaming a bitmap.
const ROWS_PER_CHUNK: usize = 8;

/// Native (portrait) panel size.
const NATIVE_WIDTH: u32 = 320;
const NATIVE_HEIGHT: u32 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Command {
    Reset = 101,
    Clear = 102,
    ScreenOff = 108,
    ScreenOn = 109,
    SetBrightness = 110,
    SetOrientation = 121,
    DisplayBitmap = 197,
}

/// Pack a command and its coordinates into the 6 byte header.
fn header(cmd: Command, x: u16, y: u16, ex: u16, ey: u16) -> [u8; 6] {
    [
        (x >> 2) as u8,
        (((x & 3) << 6) + (y >> 4)) as u8,
        (((y & 15) << 4) + (ex >> 6)) as u8,
        (((ex & 63) << 2) + (ey >> 8)) as u8,
        (ey & 255) as u8,
        cmd as u8,
    ]
}

/// Orientation packet: header, then orientation and panel size.
fn orientation_packet(orientation: Orientation, width: u32, height: u32) -> [u8; 16] {
    let mut packet = [0u8; 16];
    packet[..6].copy_from_slice(&header(Command::SetOrientation, 0, 0, 0, 0));
    packet[6] = orientation.code() + 100;
    packet[7] = (width >> 8) as u8;
    packet[8] = (width & 255) as u8;
    packet[9] = (height >> 8) as u8;
    packet[10] = (height & 255) as u8;
    packet
}

/// 0..=100 user brightness to the panel's inverted 0..=255 scale.
fn brightness_level(level: u8) -> u16 {
    let level = level.min(100) as u32;
    ((100 - level) * 255 / 100) as u16
}

/// Pick the panel among the serial ports.
fn find_port() -> Result<String, DisplayError> {
    let ports = serialport::available_ports()?;
    let usb: Vec<_> = ports
        .iter()
        .filter_map(|p| match &p.port_type {
            SerialPortType::UsbPort(info) => Some((p.port_name.clone(), info.serial_number.clone())),
            _ => None,
        })
        .collect();

    if let Some((name, _)) = usb.iter().find(|(_, sn)| sn.as_deref() == Some(PANEL_SERIAL)) {
        return Ok(name.clone());
    }
    if let Some((name, sn)) = usb.first() {
        warn!("No port reports serial {}, trying {} ({:?})", PANEL_SERIAL, name, sn);
        return Ok(name.clone());
    }
    Err(DisplayError::DeviceNotFound("no USB serial port found".to_string()))
}

pub struct TuringDriver {
    capabilities: DisplayCapabilities,
    port_setting: String,
    port: Option<Box<dyn SerialPort>>,
    orientation: Orientation,
}

impl TuringDriver {
    /// `port` is a device path or "AUTO". Nothing is opened until `init`.
    pub fn new(port: &str, orientation: Orientation) -> Self {
        let (width, height) = if orientation.is_landscape() {
            (NATIVE_HEIGHT, NATIVE_WIDTH)
        } else {
            (NATIVE_WIDTH, NATIVE_HEIGHT)
        };
        Self {
            capabilities: DisplayCapabilities {
                width,
                height,
                supports_brightness: true,
            },
            port_setting: port.to_string(),
            port: None,
            orientation,
        }
    }

    fn open(&mut self) -> Result<(), DisplayError> {
        let name = if self.port_setting.eq_ignore_ascii_case("AUTO") {
            find_port()?
        } else {
            self.port_setting.clone()
        };
        debug!("Opening {} at {} baud", name, BAUD_RATE);
        let port = serialport::new(&name, BAUD_RATE)
            .timeout(WRITE_TIMEOUT)
            .open()?;
        info!("Turing panel on {}", name);
        self.port = Some(port);
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| DisplayError::DeviceNotFound("panel not initialized".to_string()))?;
        if let Err(e) = port.write_all(bytes).and_then(|_| port.flush()) {
            // the handle is useless after a failed write, reopen on next init
            self.port = None;
            return Err(DisplayError::SerialError(e.to_string()));
        }
        Ok(())
    }

    fn send(&mut self, cmd: Command, x: u16, y: u16, ex: u16, ey: u16) -> Result<(), DisplayError> {
        self.write_all(&header(cmd, x, y, ex, ey))
    }

    fn apply_orientation(&mut self, orientation: Orientation) -> Result<(), DisplayError> {
        let (width, height) = self.dimensions();
        self.write_all(&orientation_packet(orientation, width, height))
    }
}

impl DisplayDriver for TuringDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn name(&self) -> &str {
        "turing"
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        self.open()?;
        self.send(Command::Reset, 0, 0, 0, 0)?;
        // the panel re-enumerates after a reset
        self.port = None;
        thread::sleep(RESET_DELAY);
        self.open()?;
        self.apply_orientation(self.orientation)?;
        Ok(())
    }

    fn set_brightness(&mut self, level: u8) -> Result<(), DisplayError> {
        self.send(Command::SetBrightness, brightness_level(level), 0, 0, 0)
    }

    fn set_orientation(&mut self, orientation: Orientation) -> Result<(), DisplayError> {
        if orientation.is_landscape() != self.orientation.is_landscape() {
            let caps = &mut self.capabilities;
            std::mem::swap(&mut caps.width, &mut caps.height);
        }
        self.orientation = orientation;
        self.apply_orientation(orientation)
    }

    fn screen_on(&mut self) -> Result<(), DisplayError> {
        self.send(Command::ScreenOn, 0, 0, 0, 0)
    }

    fn screen_off(&mut self) -> Result<(), DisplayError> {
        self.send(Command::ScreenOff, 0, 0, 0, 0)
    }

    /// Revision A only clears properly in portrait.
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.write_all(&orientation_packet(Orientation::Portrait, NATIVE_WIDTH, NATIVE_HEIGHT))?;
        self.send(Command::Clear, 0, 0, 0, 0)?;
        self.apply_orientation(self.orientation)
    }

    fn write_region(&mut self, area: &Rectangle, pixels: &[u8]) -> Result<(), DisplayError> {
        check_region(&self.capabilities, area, pixels)?;
        let x = area.top_left.x as u16;
        let y = area.top_left.y as u16;
        let ex = x + area.size.width as u16 - 1;
        let ey = y + area.size.height as u16 - 1;
        self.send(Command::DisplayBitmap, x, y, ex, ey)?;

        let chunk = area.size.width as usize * 2 * ROWS_PER_CHUNK;
        for part in pixels.chunks(chunk) {
            self.write_all(part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::prelude::*;

    #[test]
    fn test_header_packing() {
        // full landscape bitmap
        assert_eq!(header(Command::DisplayBitmap, 0, 0, 479, 319), [0, 0, 7, 125, 63, 197]);
        assert_eq!(header(Command::Reset, 0, 0, 0, 0), [0, 0, 0, 0, 0, 101]);
        let h = header(Command::DisplayBitmap, 5, 17, 10, 300);
        assert_eq!(h[0], 1);
        assert_eq!(h[1], (1 << 6) + 1);
        assert_eq!(h[2], 1 << 4);
        assert_eq!(h[3], (10 << 2) + 1);
        assert_eq!(h[4], 44);
    }

    #[test]
    fn test_orientation_packet() {
        let p = orientation_packet(Orientation::Landscape, 480, 320);
        assert_eq!(p[5], 121);
        assert_eq!(p[6], 102);
        assert_eq!(&p[7..11], &[1, 224, 1, 64]);
        assert!(p[11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_brightness_is_inverted() {
        assert_eq!(brightness_level(0), 255);
        assert_eq!(brightness_level(100), 0);
        assert_eq!(brightness_level(25), 191);
        assert_eq!(brightness_level(200), 0);
    }

    #[test]
    fn test_landscape_dimensions() {
        let driver = TuringDriver::new("/dev/null", Orientation::Landscape);
        assert_eq!(driver.dimensions(), (480, 320));
        let driver = TuringDriver::new("/dev/null", Orientation::Portrait);
        assert_eq!(driver.dimensions(), (320, 480));
    }

    #[test]
    fn test_writes_need_init() {
        let mut driver = TuringDriver::new("/dev/null", Orientation::Landscape);
        let area = Rectangle::new(Point::zero(), Size::new(1, 1));
        assert!(matches!(driver.write_region(&area, &[0, 0]), Err(DisplayError::DeviceNotFound(_))));
    }
}
