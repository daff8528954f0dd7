pub mod display;
pub mod manager;
pub mod mock;
pub mod serial;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Capability, HardwareError};
use crate::pool::{AudioBufferPool, PooledBuffer};

pub use manager::HardwareManager;

pub type HwResult<T> = std::result::Result<T, HardwareError>;

/// Numbered output/input pins (PTT line, status LEDs).
pub trait DigitalIo: Send {
    fn set_pin(&mut self, pin: u8, high: bool) -> HwResult<()>;
    fn get_pin(&mut self, pin: u8) -> HwResult<bool>;

    fn close(&mut self) -> HwResult<()> {
        Ok(())
    }
}

/// A small text display addressed by line.
pub trait StatusDisplay: Send {
    fn clear(&mut self) -> HwResult<()>;
    fn write_line(&mut self, line: usize, text: &str) -> HwResult<()>;
    fn flush(&mut self) -> HwResult<()>;
    /// Number of addressable lines.
    fn lines(&self) -> usize;

    fn close(&mut self) -> HwResult<()> {
        Ok(())
    }
}

/// Sound card input and output.
pub trait AudioIo: Send {
    fn start_input(&mut self) -> HwResult<()>;
    fn stop_input(&mut self) -> HwResult<()>;
    fn start_output(&mut self) -> HwResult<()>;
    fn stop_output(&mut self) -> HwResult<()>;

    /// Queue samples for playback at the output sample rate.
    fn queue_samples(&mut self, samples: &[f32]) -> HwResult<()>;

    /// Open a fresh channel of captured sample batches. Any earlier receiver
    /// stops getting data.
    fn capture(&mut self) -> HwResult<mpsc::Receiver<PooledBuffer>>;

    fn input_sample_rate(&self) -> u32;
    fn output_sample_rate(&self) -> u32;

    fn close(&mut self) -> HwResult<()> {
        Ok(())
    }
}

/// Static description of the controlled transceiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RadioInfo {
    pub model: String,
    pub manufacturer: String,
    pub capabilities: Vec<String>,
}

/// Live meter readings from the transceiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RadioTelemetry {
    pub power_watts: f32,
    pub swr: f32,
    pub signal_dbm: i32,
}

/// CAT control of the transceiver.
pub trait RadioControl: Send {
    fn info(&self) -> RadioInfo;

    /// Point the binding at a different device without recreating it.
    fn set_config(&mut self, config: &RadioConfig) -> HwResult<()>;

    fn frequency(&mut self) -> HwResult<u64>;
    fn set_frequency(&mut self, hz: u64) -> HwResult<()>;

    /// Current mode name and passband width in Hz.
    fn mode(&mut self) -> HwResult<(String, u32)>;
    fn set_mode(&mut self, mode: &str, bandwidth: u32) -> HwResult<()>;

    fn set_ptt(&mut self, on: bool) -> HwResult<()>;
    fn is_connected(&self) -> bool;
    fn telemetry(&mut self) -> HwResult<RadioTelemetry>;

    fn close(&mut self) -> HwResult<()> {
        Ok(())
    }
}

/// Builds bindings for each capability from its config section.
pub trait DeviceFactory: Send + Sync {
    fn gpio(&self, config: &GpioConfig) -> HwResult<Box<dyn DigitalIo>>;
    fn display(&self, config: &DisplayConfig) -> HwResult<Box<dyn StatusDisplay>>;
    fn audio(&self, config: &AudioConfig, pool: Arc<AudioBufferPool>) -> HwResult<Box<dyn AudioIo>>;
    fn radio(&self, config: &RadioConfig) -> HwResult<Box<dyn RadioControl>>;
}

/// Selects bindings by driver name: `mock` for every capability, `serial`
/// for GPIO and `terminal` for the display.
#[derive(Debug, Default)]
pub struct DefaultFactory;

fn unknown_driver(capability: Capability, driver: &str) -> HardwareError {
    HardwareError::driver(capability, format!("unknown driver {driver:?}"))
}

impl DeviceFactory for DefaultFactory {
    fn gpio(&self, config: &GpioConfig) -> HwResult<Box<dyn DigitalIo>> {
        match config.driver.as_str() {
            "mock" => Ok(Box::new(mock::MockGpio::default())),
            "serial" => Ok(Box::new(serial::SerialLinePtt::open(&config.device, config.baud_rate)?)),
            other => Err(unknown_driver(Capability::Gpio, other)),
        }
    }

    fn display(&self, config: &DisplayConfig) -> HwResult<Box<dyn StatusDisplay>> {
        match config.driver.as_str() {
            "mock" => Ok(Box::new(mock::MockDisplay::new(config.lines))),
            "terminal" => Ok(Box::new(display::TerminalDisplay::stdout(config.lines)?)),
            other => Err(unknown_driver(Capability::Display, other)),
        }
    }

    fn audio(&self, config: &AudioConfig, pool: Arc<AudioBufferPool>) -> HwResult<Box<dyn AudioIo>> {
        match config.driver.as_str() {
            "mock" => Ok(Box::new(
                mock::MockAudio::new(pool, config.input_sample_rate, config.output_sample_rate)
                    .loopback(config.loopback)
                    .chunk_size(config.buffer_size),
            )),
            other => Err(unknown_driver(Capability::Audio, other)),
        }
    }

    fn radio(&self, config: &RadioConfig) -> HwResult<Box<dyn RadioControl>> {
        match config.driver.as_str() {
            "mock" => Ok(Box::new(mock::MockRadio::new(config.clone()))),
            other => Err(unknown_driver(Capability::Radio, other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub enabled: bool,
    pub driver: String,
    /// Serial device for the `serial` driver.
    pub device: String,
    pub baud_rate: u32,
    /// Pin keyed for PTT.
    pub ptt_pin: u8,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            driver: "mock".into(),
            device: String::new(),
            baud_rate: 9600,
            ptt_pin: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub driver: String,
    pub lines: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            driver: "mock".into(),
            lines: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub driver: String,
    pub input_device: String,
    pub output_device: String,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Samples per captured batch.
    pub buffer_size: usize,
    /// Mock driver only: feed played audio back into the capture channel.
    pub loopback: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: "mock".into(),
            input_device: "default".into(),
            output_device: "default".into(),
            input_sample_rate: 12_000,
            output_sample_rate: 12_000,
            buffer_size: 4096,
            loopback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub enabled: bool,
    pub driver: String,
    pub model: String,
    pub device: String,
    pub baud_rate: u32,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: "mock".into(),
            model: "Dummy".into(),
            device: String::new(),
            baud_rate: 19200,
        }
    }
}

/// Snapshot handed to the manager at startup. Replaced wholesale, never
/// edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub gpio: GpioConfig,
    pub display: DisplayConfig,
    pub audio: AudioConfig,
    pub radio: RadioConfig,
}

impl HardwareConfig {
    pub fn is_enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::Gpio => self.gpio.enabled,
            Capability::Display => self.display.enabled,
            Capability::Audio => self.audio.enabled,
            Capability::Radio => self.radio.enabled,
        }
    }
}
