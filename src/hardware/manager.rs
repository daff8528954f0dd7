use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::error::{Capability, HardwareError};
use crate::pool::AudioBufferPool;

use super::{AudioIo, DeviceFactory, DigitalIo, HardwareConfig, HwResult, RadioConfig, RadioControl, StatusDisplay};

#[derive(Default)]
struct Devices {
    initialized: bool,
    gpio: Option<Box<dyn DigitalIo>>,
    display: Option<Box<dyn StatusDisplay>>,
    audio: Option<Box<dyn AudioIo>>,
    radio: Option<Box<dyn RadioControl>>,
}

/// Owns one binding per enabled capability and serializes PTT.
///
/// Lock order is `ptt` then `devices`. The PTT lock is never held by
/// status reads, so a long transmission does not stall them.
pub struct HardwareManager {
    config: HardwareConfig,
    factory: Arc<dyn DeviceFactory>,
    pool: Arc<AudioBufferPool>,
    devices: Mutex<Devices>,
    ptt: Mutex<bool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl HardwareManager {
    pub fn new(config: HardwareConfig, factory: Arc<dyn DeviceFactory>, pool: Arc<AudioBufferPool>) -> Self {
        Self {
            config,
            factory,
            pool,
            devices: Mutex::default(),
            ptt: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<AudioBufferPool> {
        &self.pool
    }

    /// Create a binding for every enabled capability. A binding that fails
    /// is logged and left out; its accessor then reports `NotInitialized`.
    /// Calling this again after success does nothing.
    pub fn initialize(&self) -> HwResult<()> {
        let mut devices = lock(&self.devices);
        if devices.initialized {
            debug!("hardware already initialized");
            return Ok(());
        }

        let c = &self.config;
        if c.gpio.enabled {
            devices.gpio = keep(Capability::Gpio, self.factory.gpio(&c.gpio));
        }
        if c.display.enabled {
            devices.display = keep(Capability::Display, self.factory.display(&c.display));
        }
        if c.audio.enabled {
            devices.audio = keep(Capability::Audio, self.factory.audio(&c.audio, Arc::clone(&self.pool)));
        }
        if c.radio.enabled {
            devices.radio = keep(Capability::Radio, self.factory.radio(&c.radio));
        }

        devices.initialized = true;
        info!(
            "hardware initialized (gpio: {}, display: {}, audio: {}, radio: {})",
            devices.gpio.is_some(),
            devices.display.is_some(),
            devices.audio.is_some(),
            devices.radio.is_some()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.devices).initialized
    }

    /// Release PTT if keyed, then close and drop every binding. Closing an
    /// already closed manager does nothing.
    pub fn close(&self) -> HwResult<()> {
        if self.ptt() {
            if let Err(e) = self.set_ptt(false) {
                warn!("failed to release PTT on close: {e}");
            }
        }

        let mut devices = lock(&self.devices);
        if !devices.initialized {
            return Ok(());
        }

        if let Some(mut d) = devices.gpio.take() {
            log_close(Capability::Gpio, d.close());
        }
        if let Some(mut d) = devices.display.take() {
            log_close(Capability::Display, d.close());
        }
        if let Some(mut d) = devices.audio.take() {
            log_close(Capability::Audio, d.close());
        }
        if let Some(mut d) = devices.radio.take() {
            log_close(Capability::Radio, d.close());
        }
        devices.initialized = false;
        info!("hardware closed");
        Ok(())
    }

    pub fn ptt(&self) -> bool {
        *lock(&self.ptt)
    }

    /// Key or unkey the transmitter.
    ///
    /// Only a change of state reaches the GPIO binding; a repeated request
    /// returns at once. The flag follows the request even when the binding
    /// fails.
    pub fn set_ptt(&self, on: bool) -> HwResult<()> {
        let mut ptt = lock(&self.ptt);
        if *ptt == on {
            return Ok(());
        }
        *ptt = on;
        debug!("PTT {}", if on { "on" } else { "off" });

        if !self.config.gpio.enabled {
            return Ok(());
        }
        let pin = self.config.gpio.ptt_pin;
        self.with_gpio(|gpio| gpio.set_pin(pin, on))
    }

    pub fn with_gpio<R>(&self, f: impl FnOnce(&mut dyn DigitalIo) -> HwResult<R>) -> HwResult<R> {
        self.check(Capability::Gpio)?;
        let mut devices = lock(&self.devices);
        let gpio = devices.gpio.as_deref_mut().ok_or(HardwareError::NotInitialized(Capability::Gpio))?;
        f(gpio)
    }

    pub fn with_display<R>(&self, f: impl FnOnce(&mut dyn StatusDisplay) -> HwResult<R>) -> HwResult<R> {
        self.check(Capability::Display)?;
        let mut devices = lock(&self.devices);
        let display = devices
            .display
            .as_deref_mut()
            .ok_or(HardwareError::NotInitialized(Capability::Display))?;
        f(display)
    }

    pub fn with_audio<R>(&self, f: impl FnOnce(&mut dyn AudioIo) -> HwResult<R>) -> HwResult<R> {
        self.check(Capability::Audio)?;
        let mut devices = lock(&self.devices);
        let audio = devices.audio.as_deref_mut().ok_or(HardwareError::NotInitialized(Capability::Audio))?;
        f(audio)
    }

    pub fn with_radio<R>(&self, f: impl FnOnce(&mut dyn RadioControl) -> HwResult<R>) -> HwResult<R> {
        self.check(Capability::Radio)?;
        let mut devices = lock(&self.devices);
        let radio = devices.radio.as_deref_mut().ok_or(HardwareError::NotInitialized(Capability::Radio))?;
        f(radio)
    }

    /// Write `lines` to the display, clearing any lines not given.
    pub fn show_status(&self, lines: &[String]) -> HwResult<()> {
        self.with_display(|display| {
            for i in 0..display.lines() {
                display.write_line(i, lines.get(i).map(String::as_str).unwrap_or(""))?;
            }
            display.flush()
        })
    }

    /// Re-point the radio binding at a new device.
    pub fn retarget_radio(&self, config: &RadioConfig) -> HwResult<()> {
        self.with_radio(|radio| radio.set_config(config))?;
        info!("radio re-targeted to {} on {:?}", config.model, config.device);
        Ok(())
    }

    pub fn radio_connected(&self) -> bool {
        self.with_radio(|radio| Ok(radio.is_connected())).unwrap_or(false)
    }

    fn check(&self, capability: Capability) -> HwResult<()> {
        if self.config.is_enabled(capability) {
            Ok(())
        } else {
            Err(HardwareError::Disabled(capability))
        }
    }
}

fn keep<T>(capability: Capability, created: HwResult<T>) -> Option<T> {
    match created {
        Ok(device) => Some(device),
        Err(e) => {
            warn!("{capability} unavailable: {e}");
            None
        }
    }
}

fn log_close(capability: Capability, result: HwResult<()>) {
    if let Err(e) = result {
        warn!("error closing {capability}: {e}");
    }
}
