use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use js8_protocol::SubMode;
use js8_protocol::{directed, grid};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hardware::HardwareConfig;

/// Station identity and beacon policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub callsign: String,
    pub grid: String,
    pub heartbeat: bool,
    /// Seconds between heartbeats.
    pub heartbeat_interval: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            callsign: String::new(),
            grid: String::new(),
            heartbeat: true,
            heartbeat_interval: 300,
        }
    }
}

impl StationConfig {
    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }
}

/// Engine tuning. Read at start and on reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tx_queue_capacity: usize,
    pub rx_queue_capacity: usize,
    /// Audio offset of tone 0, in Hz.
    pub base_frequency: f32,
    /// `normal`, `fast`, `turbo` or `slow`.
    pub submode: String,
    /// Dial frequency at start, in Hz.
    pub frequency: u64,
    /// `tone` or `null`.
    pub decoder: String,
    /// Per-attempt and per-frame trace output.
    pub verbose: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tx_queue_capacity: 16,
            rx_queue_capacity: 64,
            base_frequency: js8_protocol::modulator::DEFAULT_BASE_FREQUENCY,
            submode: "normal".into(),
            frequency: 14_078_000,
            decoder: "tone".into(),
            verbose: false,
        }
    }
}

impl EngineSettings {
    pub fn submode(&self) -> Result<SubMode> {
        Ok(self.submode.parse()?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/js8d.sock"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub engine: EngineSettings,
    pub hardware: HardwareConfig,
    pub control: ControlConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let callsign = &self.station.callsign;
        if !callsign.is_empty() && !directed::is_callsign(callsign) {
            return Err(Error::Config(format!("invalid callsign {callsign:?}")));
        }
        let grid = &self.station.grid;
        if !grid.is_empty() && !grid::is_grid(grid) {
            return Err(Error::Config(format!("invalid grid {grid:?}")));
        }
        if self.station.heartbeat && self.station.heartbeat_interval == 0 {
            return Err(Error::Config("heartbeat_interval must be positive".into()));
        }
        if self.engine.tx_queue_capacity == 0 || self.engine.rx_queue_capacity == 0 {
            return Err(Error::Config("queue capacities must be positive".into()));
        }
        let audio = &self.hardware.audio;
        if audio.input_sample_rate == 0 || audio.output_sample_rate == 0 {
            return Err(Error::Config("sample rates must be positive".into()));
        }
        self.engine.submode()?;
        if !matches!(self.engine.decoder.as_str(), "tone" | "null") {
            return Err(Error::Config(format!("unknown decoder {:?}", self.engine.decoder)));
        }
        Ok(())
    }
}

/// Where configuration comes from. Called at startup and on every reload.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<Config>;
}

/// Configuration held in memory. [`StaticSource::replace`] changes what the
/// next load returns.
#[derive(Debug, Default)]
pub struct StaticSource {
    config: Mutex<Config>,
}

impl StaticSource {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    pub fn replace(&self, config: Config) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
    }
}

impl ConfigSource for StaticSource {
    fn load(&self) -> Result<Config> {
        let config = self.config.lock().unwrap_or_else(PoisonError::into_inner).clone();
        config.validate()?;
        Ok(config)
    }
}

/// A JSON file, re-read on every load.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonFileSource {
    fn load(&self) -> Result<Config> {
        debug!("loading configuration from {}", self.path.display());
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Config(format!("{}: {e}", self.path.display())))?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }
}
