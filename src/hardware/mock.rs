use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use tokio::sync::mpsc;

use crate::error::{Capability, HardwareError};
use crate::pool::{AudioBufferPool, PooledBuffer};

use super::{
    AudioConfig, AudioIo, DeviceFactory, DigitalIo, DisplayConfig, GpioConfig, HwResult, RadioConfig, RadioControl,
    RadioInfo, RadioTelemetry, StatusDisplay,
};

/// Captured batches buffered before the mock starts dropping them.
pub const CAPTURE_DEPTH: usize = 64;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct GpioState {
    pins: HashMap<u8, bool>,
    set_calls: usize,
    fail: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockGpio {
    state: Arc<Mutex<GpioState>>,
}

impl MockGpio {
    /// Number of `set_pin` calls seen, failed ones included.
    pub fn set_calls(&self) -> usize {
        lock(&self.state).set_calls
    }

    pub fn pin(&self, pin: u8) -> bool {
        lock(&self.state).pins.get(&pin).copied().unwrap_or(false)
    }

    /// Make every later call fail with a driver error.
    pub fn set_failing(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }
}

impl DigitalIo for MockGpio {
    fn set_pin(&mut self, pin: u8, high: bool) -> HwResult<()> {
        let mut state = lock(&self.state);
        state.set_calls += 1;
        if state.fail {
            return Err(HardwareError::driver(Capability::Gpio, "simulated failure"));
        }
        state.pins.insert(pin, high);
        Ok(())
    }

    fn get_pin(&mut self, pin: u8) -> HwResult<bool> {
        Ok(lock(&self.state).pins.get(&pin).copied().unwrap_or(false))
    }
}

#[derive(Debug, Default)]
struct DisplayState {
    lines: Vec<String>,
    shown: Vec<String>,
    flushes: usize,
}

#[derive(Debug, Clone)]
pub struct MockDisplay {
    state: Arc<Mutex<DisplayState>>,
}

impl MockDisplay {
    pub fn new(lines: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(DisplayState {
                lines: vec![String::new(); lines],
                ..DisplayState::default()
            })),
        }
    }

    /// Lines as of the last flush.
    pub fn shown(&self) -> Vec<String> {
        lock(&self.state).shown.clone()
    }

    pub fn flushes(&self) -> usize {
        lock(&self.state).flushes
    }
}

impl StatusDisplay for MockDisplay {
    fn clear(&mut self) -> HwResult<()> {
        lock(&self.state).lines.iter_mut().for_each(String::clear);
        Ok(())
    }

    fn write_line(&mut self, line: usize, text: &str) -> HwResult<()> {
        let mut state = lock(&self.state);
        let slot = state
            .lines
            .get_mut(line)
            .ok_or_else(|| HardwareError::driver(Capability::Display, format!("no line {line}")))?;
        *slot = text.to_string();
        Ok(())
    }

    fn flush(&mut self) -> HwResult<()> {
        let mut state = lock(&self.state);
        state.shown = state.lines.clone();
        state.flushes += 1;
        Ok(())
    }

    fn lines(&self) -> usize {
        lock(&self.state).lines.len()
    }
}

#[derive(Debug, Default)]
struct AudioState {
    input_running: bool,
    output_running: bool,
    played: Vec<f32>,
    capture_tx: Option<mpsc::Sender<PooledBuffer>>,
    overruns: usize,
}

/// Sound card stand-in. Played samples are recorded and, in loopback mode,
/// fed straight back into the capture channel.
#[derive(Debug, Clone)]
pub struct MockAudio {
    state: Arc<Mutex<AudioState>>,
    pool: Arc<AudioBufferPool>,
    input_rate: u32,
    output_rate: u32,
    loopback: bool,
    chunk: usize,
}

impl MockAudio {
    pub fn new(pool: Arc<AudioBufferPool>, input_rate: u32, output_rate: u32) -> Self {
        Self {
            state: Arc::default(),
            pool,
            input_rate,
            output_rate,
            loopback: false,
            chunk: 4096,
        }
    }

    pub fn loopback(mut self, on: bool) -> Self {
        self.loopback = on;
        self
    }

    pub fn chunk_size(mut self, samples: usize) -> Self {
        self.chunk = samples.max(1);
        self
    }

    /// Push samples into the capture channel as if they had been recorded.
    /// Dropped while input is stopped.
    pub fn inject(&self, samples: &[f32]) {
        let mut state = lock(&self.state);
        self.push_capture(&mut state, samples);
    }

    fn push_capture(&self, state: &mut AudioState, samples: &[f32]) {
        if !state.input_running {
            return;
        }
        let Some(tx) = state.capture_tx.as_ref() else {
            return;
        };
        let mut dropped = 0;
        for chunk in samples.chunks(self.chunk) {
            let mut buf = self.pool.get(chunk.len());
            buf.copy_from_slice(chunk);
            if tx.try_send(buf).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!("mock capture dropped {dropped} batch(es)");
            state.overruns += dropped;
        }
    }

    /// All samples queued for playback so far.
    pub fn played(&self) -> Vec<f32> {
        lock(&self.state).played.clone()
    }

    pub fn played_len(&self) -> usize {
        lock(&self.state).played.len()
    }

    pub fn is_input_running(&self) -> bool {
        lock(&self.state).input_running
    }

    pub fn is_output_running(&self) -> bool {
        lock(&self.state).output_running
    }

    pub fn overruns(&self) -> usize {
        lock(&self.state).overruns
    }
}

impl AudioIo for MockAudio {
    fn start_input(&mut self) -> HwResult<()> {
        lock(&self.state).input_running = true;
        Ok(())
    }

    fn stop_input(&mut self) -> HwResult<()> {
        lock(&self.state).input_running = false;
        Ok(())
    }

    fn start_output(&mut self) -> HwResult<()> {
        lock(&self.state).output_running = true;
        Ok(())
    }

    fn stop_output(&mut self) -> HwResult<()> {
        lock(&self.state).output_running = false;
        Ok(())
    }

    fn queue_samples(&mut self, samples: &[f32]) -> HwResult<()> {
        let mut state = lock(&self.state);
        if !state.output_running {
            return Err(HardwareError::driver(Capability::Audio, "output not started"));
        }
        state.played.extend_from_slice(samples);
        if self.loopback {
            self.push_capture(&mut state, samples);
        }
        Ok(())
    }

    fn capture(&mut self) -> HwResult<mpsc::Receiver<PooledBuffer>> {
        let (tx, rx) = mpsc::channel(CAPTURE_DEPTH);
        lock(&self.state).capture_tx = Some(tx);
        Ok(rx)
    }

    fn input_sample_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_sample_rate(&self) -> u32 {
        self.output_rate
    }

    fn close(&mut self) -> HwResult<()> {
        let mut state = lock(&self.state);
        state.input_running = false;
        state.output_running = false;
        state.capture_tx = None;
        Ok(())
    }
}

#[derive(Debug)]
struct RadioState {
    config: RadioConfig,
    frequency: u64,
    mode: String,
    bandwidth: u32,
    ptt: bool,
    connected: bool,
    retargets: usize,
}

#[derive(Debug, Clone)]
pub struct MockRadio {
    state: Arc<Mutex<RadioState>>,
}

impl MockRadio {
    pub fn new(config: RadioConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(RadioState {
                config,
                frequency: 14_078_000,
                mode: "USB".into(),
                bandwidth: 3000,
                ptt: false,
                connected: true,
                retargets: 0,
            })),
        }
    }

    pub fn ptt(&self) -> bool {
        lock(&self.state).ptt
    }

    pub fn config(&self) -> RadioConfig {
        lock(&self.state).config.clone()
    }

    /// Number of `set_config` calls.
    pub fn retargets(&self) -> usize {
        lock(&self.state).retargets
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    fn check(state: &RadioState) -> HwResult<()> {
        if state.connected {
            Ok(())
        } else {
            Err(HardwareError::driver(Capability::Radio, "radio not connected"))
        }
    }
}

impl RadioControl for MockRadio {
    fn info(&self) -> RadioInfo {
        let state = lock(&self.state);
        RadioInfo {
            model: state.config.model.clone(),
            manufacturer: "Mock".into(),
            capabilities: ["frequency", "mode", "ptt", "telemetry"].map(String::from).to_vec(),
        }
    }

    fn set_config(&mut self, config: &RadioConfig) -> HwResult<()> {
        let mut state = lock(&self.state);
        state.config = config.clone();
        state.retargets += 1;
        Ok(())
    }

    fn frequency(&mut self) -> HwResult<u64> {
        let state = lock(&self.state);
        Self::check(&state)?;
        Ok(state.frequency)
    }

    fn set_frequency(&mut self, hz: u64) -> HwResult<()> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        state.frequency = hz;
        Ok(())
    }

    fn mode(&mut self) -> HwResult<(String, u32)> {
        let state = lock(&self.state);
        Self::check(&state)?;
        Ok((state.mode.clone(), state.bandwidth))
    }

    fn set_mode(&mut self, mode: &str, bandwidth: u32) -> HwResult<()> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        state.mode = mode.to_string();
        state.bandwidth = bandwidth;
        Ok(())
    }

    fn set_ptt(&mut self, on: bool) -> HwResult<()> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        state.ptt = on;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    fn telemetry(&mut self) -> HwResult<RadioTelemetry> {
        let state = lock(&self.state);
        Self::check(&state)?;
        Ok(RadioTelemetry {
            power_watts: if state.ptt { 25.0 } else { 0.0 },
            swr: 1.2,
            signal_dbm: -97,
        })
    }

    fn close(&mut self) -> HwResult<()> {
        lock(&self.state).ptt = false;
        Ok(())
    }
}

/// Hands out clones of pre-built mocks so tests keep their own handles.
/// Each mock is a handle around shared state.
/// Capabilities listed with [`MockFactory::failing`] refuse to initialise.
#[derive(Debug, Clone)]
pub struct MockFactory {
    pub gpio: MockGpio,
    pub display: MockDisplay,
    pub audio: MockAudio,
    pub radio: MockRadio,
    failing: HashSet<Capability>,
}

impl MockFactory {
    pub fn new(pool: Arc<AudioBufferPool>, sample_rate: u32) -> Self {
        Self {
            gpio: MockGpio::default(),
            display: MockDisplay::new(4),
            audio: MockAudio::new(pool, sample_rate, sample_rate),
            radio: MockRadio::new(RadioConfig::default()),
            failing: HashSet::new(),
        }
    }

    pub fn with_audio(mut self, audio: MockAudio) -> Self {
        self.audio = audio;
        self
    }

    pub fn failing(mut self, capability: Capability) -> Self {
        self.failing.insert(capability);
        self
    }

    fn check(&self, capability: Capability) -> HwResult<()> {
        if self.failing.contains(&capability) {
            Err(HardwareError::driver(capability, "driver unavailable"))
        } else {
            Ok(())
        }
    }
}

impl DeviceFactory for MockFactory {
    fn gpio(&self, _config: &GpioConfig) -> HwResult<Box<dyn DigitalIo>> {
        self.check(Capability::Gpio)?;
        Ok(Box::new(self.gpio.clone()))
    }

    fn display(&self, _config: &DisplayConfig) -> HwResult<Box<dyn StatusDisplay>> {
        self.check(Capability::Display)?;
        Ok(Box::new(self.display.clone()))
    }

    fn audio(&self, _config: &AudioConfig, _pool: Arc<AudioBufferPool>) -> HwResult<Box<dyn AudioIo>> {
        self.check(Capability::Audio)?;
        Ok(Box::new(self.audio.clone()))
    }

    fn radio(&self, _config: &RadioConfig) -> HwResult<Box<dyn RadioControl>> {
        self.check(Capability::Radio)?;
        Ok(Box::new(self.radio.clone()))
    }
}
