use std::time::Duration;

use log::{debug, info};

use crate::error::{Capability, HardwareError};

use super::{DigitalIo, HwResult};

/// Pin number of the RTS line.
pub const PIN_RTS: u8 = 0;
/// Pin number of the DTR line.
pub const PIN_DTR: u8 = 1;

/// Keys PTT through the RTS/DTR modem-control lines of a serial port, the
/// usual interface of USB keying cables.
pub struct SerialLinePtt {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    levels: [bool; 2],
}

impl SerialLinePtt {
    pub fn new(port: Box<dyn serialport::SerialPort>, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
            levels: [false; 2],
        }
    }

    /// Open `device` 8N1 with both lines dropped.
    pub fn open(device: &str, baud_rate: u32) -> HwResult<Self> {
        let port = serialport::new(device, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .timeout(Duration::from_millis(500))
            .open()
            .map_err(|e| HardwareError::driver(Capability::Gpio, format!("{device}: {e}")))?;

        info!("opened {device} at {baud_rate} baud for PTT");
        let mut ptt = Self::new(port, device);
        ptt.set_pin(PIN_RTS, false)?;
        ptt.set_pin(PIN_DTR, false)?;
        Ok(ptt)
    }
}

impl DigitalIo for SerialLinePtt {
    fn set_pin(&mut self, pin: u8, high: bool) -> HwResult<()> {
        let result = match pin {
            PIN_RTS => self.port.write_request_to_send(high),
            PIN_DTR => self.port.write_data_terminal_ready(high),
            _ => return Err(HardwareError::driver(Capability::Gpio, format!("no line for pin {pin}"))),
        };
        result.map_err(|e| HardwareError::driver(Capability::Gpio, format!("{}: {e}", self.name)))?;
        debug!("{} pin {pin} -> {high}", self.name);
        self.levels[pin as usize] = high;
        Ok(())
    }

    /// Returns the level last written; both lines are outputs.
    fn get_pin(&mut self, pin: u8) -> HwResult<bool> {
        self.levels
            .get(pin as usize)
            .copied()
            .ok_or_else(|| HardwareError::driver(Capability::Gpio, format!("no line for pin {pin}")))
    }

    fn close(&mut self) -> HwResult<()> {
        self.set_pin(PIN_RTS, false)?;
        self.set_pin(PIN_DTR, false)
    }
}
