mod dispatch;
mod heartbeat;
mod receive;
pub mod state;
mod transmit;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use futures::future::join_all;
use js8_protocol::varicode::index64;
use js8_protocol::{
    Decoder, FrameEncoder, Modulator, NullDecoder, ParityPolicy, PlaceholderParity, ProtocolError, SubMode,
    ToneDecoder,
};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigSource};
use crate::error::{Error, HardwareError, Result};
use crate::hardware::{DefaultFactory, DeviceFactory, HardwareManager, RadioInfo, RadioTelemetry};
use crate::message::{Message, MessageKind, unix_now};
use crate::pool::AudioBufferPool;
use crate::store::{MemoryStore, MessageFilter, MessageStore, StoredMessage};

pub use dispatch::auto_reply;
pub use receive::{RecentDecodes, RollingBuffer};
use state::SharedState;

/// Runtime station keys reachable through `CONFIG`.
pub const CONFIG_KEYS: [&str; 4] = ["callsign", "grid", "heartbeat", "heartbeat_interval"];

/// A message waiting to be sent.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub message: Message,
    pub kind: MessageKind,
}

/// A decoded message waiting for dispatch.
#[derive(Debug, Clone)]
pub struct Received {
    pub message: Message,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub running: bool,
    pub callsign: String,
    pub grid: String,
    pub frequency: u64,
    pub ptt: bool,
    pub radio_connected: bool,
    /// Seconds since start.
    pub uptime: u64,
    pub tx_queue: usize,
    pub rx_queue: usize,
    pub submode: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadioReport {
    pub info: RadioInfo,
    pub connected: bool,
    pub frequency: u64,
    pub mode: String,
    pub bandwidth: u32,
    pub telemetry: RadioTelemetry,
}

/// What a reload changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    pub station_changed: bool,
    pub engine_changed: bool,
    pub radio_retargeted: bool,
    /// Hardware or control settings changed that only apply on restart.
    pub restart_required: bool,
}

struct Queues {
    tx: mpsc::Sender<Outgoing>,
    rx: mpsc::Sender<Received>,
}

struct Workers {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub(crate) struct Inner {
    config: RwLock<Arc<Config>>,
    source: Option<Arc<dyn ConfigSource>>,
    state: SharedState,
    hardware: RwLock<Arc<HardwareManager>>,
    factory: Arc<dyn DeviceFactory>,
    pool: Arc<AudioBufferPool>,
    store: Arc<dyn MessageStore>,
    decoder: Option<Arc<dyn Decoder>>,
    encoder: FrameEncoder,
    queues: Mutex<Option<Queues>>,
    next_id: AtomicU64,
    last_heard: Mutex<String>,
    verbose: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn hardware(&self) -> Arc<HardwareManager> {
        Arc::clone(&self.hardware.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn submode(&self) -> SubMode {
        self.config().engine.submode().unwrap_or_default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// A message from this station, stamped now.
    fn new_message(&self, to: &str, text: &str) -> Message {
        let config = self.config();
        let dial = self.state.read().frequency;
        Message {
            id: self.next_id(),
            timestamp: unix_now(),
            from: config.station.callsign.clone(),
            to: to.to_string(),
            text: text.to_string(),
            snr: 0,
            frequency: dial + config.engine.base_frequency.max(0.0).round() as u64,
            mode: self.submode().tag().to_string(),
        }
    }

    /// Queue `message` for the transmit worker. Text that cannot be put on
    /// the air is refused here, before the transmitter is ever keyed.
    fn enqueue(&self, message: Message, kind: MessageKind) -> Result<()> {
        if let Some(c) = message.frame_text().chars().find(|&c| index64(c).is_none()) {
            return Err(ProtocolError::InvalidCharacter(c).into());
        }
        let queues = lock(&self.queues);
        let queues = queues.as_ref().ok_or(Error::NotRunning)?;
        match queues.tx.try_send(Outgoing { message, kind }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Closed(_)) => Err(Error::NotRunning),
        }
    }

    fn queue_depths(&self) -> (usize, usize) {
        match lock(&self.queues).as_ref() {
            Some(q) => (
                q.tx.max_capacity() - q.tx.capacity(),
                q.rx.max_capacity() - q.rx.capacity(),
            ),
            None => (0, 0),
        }
    }

    fn set_ptt(&self, on: bool) -> Result<()> {
        let hardware = self.hardware();
        let result = hardware.set_ptt(on);
        self.state.write().ptt = hardware.ptt();
        result.map_err(Error::from)
    }

    fn set_last_heard(&self, line: String) {
        *lock(&self.last_heard) = line;
    }

    /// Redraw the status display from current state. Failures only matter
    /// for debugging.
    fn refresh_display(&self) {
        let hardware = self.hardware();
        if !hardware.config().display.enabled {
            return;
        }
        let config = self.config();
        let state = self.state.snapshot();
        let station = if config.station.callsign.is_empty() {
            "NOCALL".to_string()
        } else {
            format!("{} {}", config.station.callsign, config.station.grid).trim().to_string()
        };
        let lines = [
            station,
            format!(
                "{:.6} MHz {}",
                state.frequency as f64 / 1e6,
                if state.ptt { "TX" } else { "RX" }
            ),
            lock(&self.last_heard).clone(),
            format!("JS8 {}", self.submode()),
        ];
        if let Err(e) = hardware.show_status(&lines) {
            debug!("display update failed: {e}");
        }
    }
}

/// Assembles an [`Engine`] from a config and optional replacements for its
/// collaborators.
pub struct EngineBuilder {
    config: Config,
    source: Option<Arc<dyn ConfigSource>>,
    factory: Arc<dyn DeviceFactory>,
    store: Arc<dyn MessageStore>,
    decoder: Option<Arc<dyn Decoder>>,
    parity: Box<dyn ParityPolicy>,
    pool: Arc<AudioBufferPool>,
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: None,
            factory: Arc::new(DefaultFactory),
            store: Arc::new(MemoryStore::default()),
            decoder: None,
            parity: Box::new(PlaceholderParity),
            pool: Arc::new(AudioBufferPool::default()),
        }
    }

    /// Load the initial config from `source` and keep it for `RELOAD`.
    pub fn from_source(source: Arc<dyn ConfigSource>) -> Result<Self> {
        let config = source.load()?;
        Ok(Self::new(config).source(source))
    }

    pub fn source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn DeviceFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = store;
        self
    }

    /// Use `decoder` instead of the one named in the config.
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn parity(mut self, parity: Box<dyn ParityPolicy>) -> Self {
        self.parity = parity;
        self
    }

    pub fn pool(mut self, pool: Arc<AudioBufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        let verbose = self.config.engine.verbose;
        let hardware = HardwareManager::new(
            self.config.hardware.clone(),
            Arc::clone(&self.factory),
            Arc::clone(&self.pool),
        );
        let inner = Inner {
            state: SharedState::new(self.config.engine.frequency),
            config: RwLock::new(Arc::new(self.config)),
            source: self.source,
            hardware: RwLock::new(Arc::new(hardware)),
            factory: self.factory,
            pool: self.pool,
            store: self.store,
            decoder: self.decoder,
            encoder: FrameEncoder::new(self.parity).verbose(verbose),
            queues: Mutex::new(None),
            next_id: AtomicU64::new(1),
            last_heard: Mutex::new(String::new()),
            verbose,
        };
        Ok(Engine {
            inner: Arc::new(inner),
            workers: Mutex::new(None),
        })
    }
}

/// The station engine. [`Engine::start`] spawns the transmit, receive,
/// dispatch and heartbeat workers under one cancellation token. A full
/// transmit queue is reported to the caller; anything else that cannot be
/// queued is logged and dropped.
pub struct Engine {
    inner: Arc<Inner>,
    workers: Mutex<Option<Workers>>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> Arc<Config> {
        self.inner.config()
    }

    pub fn hardware(&self) -> Arc<HardwareManager> {
        self.inner.hardware()
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.inner.store
    }

    pub fn pool(&self) -> &Arc<AudioBufferPool> {
        &self.inner.pool
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.read().running
    }

    /// Bring up hardware, open the queues and spawn the workers. Must be
    /// called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut workers = lock(&self.workers);
        if workers.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let inner = &self.inner;
        let config = inner.config();
        let submode = config.engine.submode()?;

        let hardware = {
            let mut slot = inner.hardware.write().unwrap_or_else(PoisonError::into_inner);
            if slot.config() != &config.hardware {
                debug!("hardware config changed, rebuilding bindings");
                *slot = Arc::new(HardwareManager::new(
                    config.hardware.clone(),
                    Arc::clone(&inner.factory),
                    Arc::clone(&inner.pool),
                ));
            }
            Arc::clone(&slot)
        };
        hardware.initialize()?;

        let input_rate = hardware
            .with_audio(|audio| Ok(audio.input_sample_rate()))
            .unwrap_or(config.hardware.audio.input_sample_rate);
        let capture = match hardware.with_audio(|audio| {
            let rx = audio.capture()?;
            audio.start_input()?;
            Ok(rx)
        }) {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!("audio input unavailable, receive disabled: {e}");
                None
            }
        };

        let frequency = inner.state.read().frequency;
        if let Err(e) = hardware.with_radio(|radio| radio.set_frequency(frequency)) {
            warn!("could not tune radio to {frequency} Hz: {e}");
        }

        let (tx_send, tx_recv) = mpsc::channel(config.engine.tx_queue_capacity);
        let (rx_send, rx_recv) = mpsc::channel(config.engine.rx_queue_capacity);
        *lock(&inner.queues) = Some(Queues {
            tx: tx_send,
            rx: rx_send.clone(),
        });

        let decoder = inner.decoder.clone().unwrap_or_else(|| {
            let modulator = Modulator::new(input_rate, config.engine.base_frequency, submode);
            match config.engine.decoder.as_str() {
                "tone" => Arc::new(ToneDecoder::new(modulator)) as Arc<dyn Decoder>,
                _ => Arc::new(NullDecoder),
            }
        });

        let cancel = CancellationToken::new();
        let mut handles = vec![
            tokio::spawn(transmit::run(Arc::clone(inner), tx_recv, cancel.clone())),
            tokio::spawn(dispatch::run(Arc::clone(inner), rx_recv, cancel.clone())),
            tokio::spawn(heartbeat::run(Arc::clone(inner), cancel.clone())),
        ];
        if let Some(capture) = capture {
            handles.push(tokio::spawn(receive::run(
                Arc::clone(inner),
                capture,
                decoder,
                rx_send,
                input_rate,
                cancel.clone(),
            )));
        }

        {
            let mut state = inner.state.write();
            state.running = true;
            state.started_at = Some(Instant::now());
            state.radio_connected = hardware.radio_connected();
        }
        *workers = Some(Workers { cancel, handles });
        drop(workers);

        inner.refresh_display();
        info!(
            "engine started ({}, {submode}, {} Hz)",
            if config.station.callsign.is_empty() { "no callsign" } else { config.station.callsign.as_str() },
            frequency
        );
        Ok(())
    }

    /// Cancel the workers, wait for all of them, then release PTT and close
    /// the hardware.
    pub async fn stop(&self) -> Result<()> {
        let Some(workers) = lock(&self.workers).take() else {
            return Err(Error::NotRunning);
        };
        let inner = &self.inner;
        *lock(&inner.queues) = None;

        workers.cancel.cancel();
        for result in join_all(workers.handles).await {
            if let Err(e) = result {
                warn!("worker ended abnormally: {e}");
            }
        }

        let hardware = inner.hardware();
        if let Err(e) = hardware.with_audio(|audio| {
            audio.stop_input()?;
            audio.stop_output()
        }) {
            debug!("stopping audio: {e}");
        }
        if let Err(e) = inner.set_ptt(false) {
            warn!("releasing PTT: {e}");
        }
        hardware.close()?;

        {
            let mut state = inner.state.write();
            state.running = false;
            state.ptt = false;
            state.radio_connected = false;
            state.started_at = None;
        }
        info!("engine stopped");
        Ok(())
    }

    /// Queue a message for transmission. `to` empty means broadcast.
    ///
    /// Fails at once with [`Error::QueueFull`] when the transmit queue has
    /// no room; nothing is retried.
    pub fn send(&self, to: &str, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidCommand("message text is empty".into()));
        }
        let to = to.trim().to_ascii_uppercase();
        let message = self.inner.new_message(&to, text);

        let kind = if to.is_empty() {
            MessageKind::Broadcast
        } else {
            MessageKind::Directed
        };
        self.inner.enqueue(message.clone(), kind)?;
        info!(
            "queued message {} to {}",
            message.id,
            if to.is_empty() { "all" } else { to.as_str() }
        );
        Ok(message)
    }

    pub fn status(&self) -> Status {
        let config = self.inner.config();
        let state = self.inner.state.snapshot();
        let (tx_queue, rx_queue) = self.inner.queue_depths();
        Status {
            running: state.running,
            callsign: config.station.callsign.clone(),
            grid: config.station.grid.clone(),
            frequency: state.frequency,
            ptt: state.ptt,
            radio_connected: state.radio_connected,
            uptime: state.uptime_secs(),
            tx_queue,
            rx_queue,
            submode: self.inner.submode().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn messages(&self, filter: &MessageFilter) -> Result<Vec<StoredMessage>> {
        self.inner.store.get_messages(filter)
    }

    pub fn frequency(&self) -> u64 {
        self.inner.state.read().frequency
    }

    /// Retune. Without a usable radio the new frequency is only tracked
    /// locally; a radio that rejects it leaves the state unchanged.
    pub fn set_frequency(&self, hz: u64) -> Result<()> {
        if hz == 0 {
            return Err(Error::InvalidCommand("frequency must be positive".into()));
        }
        match self.inner.hardware().with_radio(|radio| radio.set_frequency(hz)) {
            Ok(()) => {}
            Err(e @ (HardwareError::Disabled(_) | HardwareError::NotInitialized(_))) => {
                debug!("{e}; tracking frequency locally");
            }
            Err(e) => return Err(e.into()),
        }
        self.inner.state.write().frequency = hz;
        self.inner.refresh_display();
        info!("frequency set to {hz} Hz");
        Ok(())
    }

    pub fn set_ptt(&self, on: bool) -> Result<()> {
        let result = self.inner.set_ptt(on);
        self.inner.refresh_display();
        result
    }

    pub fn radio(&self) -> Result<RadioReport> {
        let report = self.inner.hardware().with_radio(|radio| {
            let (mode, bandwidth) = radio.mode()?;
            Ok(RadioReport {
                info: radio.info(),
                connected: radio.is_connected(),
                frequency: radio.frequency()?,
                mode,
                bandwidth,
                telemetry: radio.telemetry()?,
            })
        })?;
        self.inner.state.write().radio_connected = report.connected;
        Ok(report)
    }

    /// Re-read the config source and swap in the result. A changed radio
    /// section re-targets the running radio binding. Engine settings are
    /// bound when the workers start, so those and any other hardware or
    /// control change wait for the next start.
    pub fn reload(&self) -> Result<ReloadSummary> {
        let source = self
            .inner
            .source
            .as_ref()
            .ok_or_else(|| Error::Config("no configuration source".into()))?;
        let new = Arc::new(source.load()?);
        let old = {
            let mut slot = self.inner.config.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, Arc::clone(&new))
        };

        let mut summary = ReloadSummary {
            station_changed: old.station != new.station,
            engine_changed: old.engine != new.engine,
            ..ReloadSummary::default()
        };

        if old.hardware.radio != new.hardware.radio && self.is_running() {
            match self.inner.hardware().retarget_radio(&new.hardware.radio) {
                Ok(()) => summary.radio_retargeted = true,
                Err(e) => warn!("radio re-target failed: {e}"),
            }
        }
        let mut old_rest = old.hardware.clone();
        old_rest.radio = new.hardware.radio.clone();
        summary.restart_required =
            summary.engine_changed || old_rest != new.hardware || old.control != new.control;

        self.inner.refresh_display();
        info!("configuration reloaded: {summary:?}");
        Ok(summary)
    }

    pub fn config_get(&self, key: &str) -> Result<String> {
        let config = self.inner.config();
        let station = &config.station;
        match key {
            "callsign" => Ok(station.callsign.clone()),
            "grid" => Ok(station.grid.clone()),
            "heartbeat" => Ok(station.heartbeat.to_string()),
            "heartbeat_interval" => Ok(station.heartbeat_interval.to_string()),
            other => Err(Error::InvalidCommand(format!("unknown config key {other:?}"))),
        }
    }

    /// Change one runtime key. The whole config is re-validated before the
    /// change is published.
    pub fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        {
            let mut slot = self.inner.config.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = Config::clone(&slot);
            let station = &mut next.station;
            match key {
                "callsign" => station.callsign = value.to_ascii_uppercase(),
                "grid" => station.grid = value.to_string(),
                "heartbeat" => station.heartbeat = parse_bool(value)?,
                "heartbeat_interval" => {
                    station.heartbeat_interval = value
                        .parse()
                        .map_err(|_| Error::InvalidCommand(format!("invalid interval {value:?}")))?;
                }
                other => return Err(Error::InvalidCommand(format!("unknown config key {other:?}"))),
            }
            next.validate()?;
            *slot = Arc::new(next);
        }
        info!("config {key} set to {value:?}");
        self.inner.refresh_display();
        Ok(())
    }

    pub fn config_list(&self) -> BTreeMap<String, String> {
        CONFIG_KEYS
            .iter()
            .filter_map(|&key| self.config_get(key).ok().map(|v| (key.to_string(), v)))
            .collect()
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(Error::InvalidCommand(format!("expected true or false, got {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticSource;
    use crate::error::Capability;
    use crate::hardware::mock::MockFactory;

    fn config() -> Config {
        let mut config = Config::default();
        config.station.callsign = "N0CALL".into();
        config.station.grid = "EM12".into();
        config.station.heartbeat = false;
        config.engine.decoder = "null".into();
        config.hardware.gpio.enabled = true;
        config.hardware.display.enabled = true;
        config
    }

    fn engine_with(config: Config) -> (Engine, MockFactory) {
        let pool = Arc::new(AudioBufferPool::default());
        let factory = MockFactory::new(Arc::clone(&pool), 12_000);
        let mocks = factory.clone();
        let engine = Engine::builder(config)
            .factory(Arc::new(factory))
            .pool(pool)
            .build()
            .unwrap();
        (engine, mocks)
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (engine, mocks) = engine_with(config());
        assert!(matches!(engine.stop().await, Err(Error::NotRunning)));

        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(), Err(Error::AlreadyRunning)));
        assert!(mocks.audio.is_input_running());
        assert!(engine.status().radio_connected);

        engine.stop().await.unwrap();
        assert!(!engine.is_running());
        assert!(!mocks.audio.is_input_running());
        assert!(!engine.hardware().is_initialized());

        engine.start().unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_requires_running() {
        let (engine, _mocks) = engine_with(config());
        assert!(matches!(engine.send("K1ABC", "HELLO"), Err(Error::NotRunning)));
    }

    #[tokio::test]
    async fn test_send_validates() {
        let (engine, _mocks) = engine_with(config());
        engine.start().unwrap();
        assert!(matches!(engine.send("K1ABC", "   "), Err(Error::InvalidCommand(_))));
        assert!(matches!(
            engine.send("K1ABC", "SNR?"),
            Err(Error::Protocol(ProtocolError::InvalidCharacter('?')))
        ));
        assert!(matches!(
            engine.send("W1/K1ABC", "HI"),
            Err(Error::Protocol(ProtocolError::InvalidCharacter('/')))
        ));
        assert_eq!(engine.status().tx_queue, 0);

        let message = engine.send("k1abc", "Hello world").unwrap();
        assert_eq!(message.to, "K1ABC");
        assert_eq!(message.from, "N0CALL");
        assert_eq!(message.frequency, 14_079_500);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_engine_ptt_transitions() {
        let (engine, mocks) = engine_with(config());
        engine.start().unwrap();

        engine.set_ptt(true).unwrap();
        engine.set_ptt(true).unwrap();
        assert_eq!(mocks.gpio.set_calls(), 1);
        assert!(engine.status().ptt);

        engine.set_ptt(false).unwrap();
        assert_eq!(mocks.gpio.set_calls(), 2);
        assert!(!engine.status().ptt);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_ptt_with_gpio_unavailable() {
        let pool = Arc::new(AudioBufferPool::default());
        let factory = MockFactory::new(Arc::clone(&pool), 12_000).failing(Capability::Gpio);
        let engine = Engine::builder(config()).factory(Arc::new(factory)).build().unwrap();
        engine.start().unwrap();

        assert!(matches!(
            engine.set_ptt(true),
            Err(Error::Hardware(HardwareError::NotInitialized(Capability::Gpio)))
        ));
        assert!(engine.status().ptt);
        engine.stop().await.unwrap();
        assert!(!engine.status().ptt);
    }

    #[tokio::test]
    async fn test_set_frequency() {
        let (engine, mocks) = engine_with(config());
        engine.set_frequency(7_078_000).unwrap();
        assert_eq!(engine.frequency(), 7_078_000);

        engine.start().unwrap();
        engine.set_frequency(10_130_000).unwrap();
        assert_eq!(engine.radio().unwrap().frequency, 10_130_000);

        mocks.radio.set_connected(false);
        assert!(matches!(engine.set_frequency(14_078_000), Err(Error::Hardware(_))));
        assert_eq!(engine.frequency(), 10_130_000);
        assert!(matches!(engine.set_frequency(0), Err(Error::InvalidCommand(_))));
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_display_follows_state() {
        let (engine, mocks) = engine_with(config());
        engine.start().unwrap();
        let shown = mocks.display.shown();
        assert_eq!(shown[0], "N0CALL EM12");
        assert_eq!(shown[1], "14.078000 MHz RX");

        engine.set_ptt(true).unwrap();
        assert_eq!(mocks.display.shown()[1], "14.078000 MHz TX");
        engine.stop().await.unwrap();
    }

    #[test]
    fn test_config_keys() {
        let (engine, _mocks) = engine_with(config());
        assert_eq!(engine.config_get("callsign").unwrap(), "N0CALL");
        engine.config_set("callsign", "k1abc").unwrap();
        assert_eq!(engine.config().station.callsign, "K1ABC");

        engine.config_set("heartbeat", "on").unwrap();
        engine.config_set("heartbeat_interval", "600").unwrap();
        let all = engine.config_list();
        assert_eq!(all.len(), 4);
        assert_eq!(all["heartbeat"], "true");
        assert_eq!(all["heartbeat_interval"], "600");

        assert!(engine.config_set("grid", "ZZ99").is_err());
        assert_eq!(engine.config().station.grid, "EM12");
        assert!(matches!(engine.config_set("power", "5"), Err(Error::InvalidCommand(_))));
        assert!(matches!(engine.config_get("power"), Err(Error::InvalidCommand(_))));
    }

    #[tokio::test]
    async fn test_reload_retargets_radio() {
        let source = Arc::new(StaticSource::new(config()));
        let pool = Arc::new(AudioBufferPool::default());
        let factory = MockFactory::new(Arc::clone(&pool), 12_000);
        let radio = factory.radio.clone();
        let engine = EngineBuilder::from_source(source.clone())
            .unwrap()
            .factory(Arc::new(factory))
            .build()
            .unwrap();
        engine.start().unwrap();

        let mut next = config();
        next.station.grid = "FN42".into();
        next.hardware.radio.model = "IC-7300".into();
        next.hardware.display.enabled = false;
        source.replace(next);

        let summary = engine.reload().unwrap();
        assert!(summary.station_changed);
        assert!(!summary.engine_changed);
        assert!(summary.radio_retargeted);
        assert!(summary.restart_required);
        assert_eq!(radio.config().model, "IC-7300");
        assert_eq!(engine.status().grid, "FN42");

        let mut bad = config();
        bad.station.callsign = "bad".into();
        source.replace(bad);
        assert!(engine.reload().is_err());
        assert_eq!(engine.status().grid, "FN42");
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_engine_change_needs_restart() {
        let source = Arc::new(StaticSource::new(config()));
        let pool = Arc::new(AudioBufferPool::default());
        let engine = EngineBuilder::from_source(source.clone())
            .unwrap()
            .factory(Arc::new(MockFactory::new(Arc::clone(&pool), 12_000)))
            .build()
            .unwrap();
        engine.start().unwrap();

        let summary = engine.reload().unwrap();
        assert!(!summary.engine_changed);
        assert!(!summary.restart_required);

        let changes: [fn(&mut Config); 3] = [
            |c| c.engine.submode = "turbo".into(),
            |c| c.engine.decoder = "tone".into(),
            |c| c.engine.base_frequency = 1000.0,
        ];
        for change in changes {
            let mut next = config();
            change(&mut next);
            source.replace(next);
            let summary = engine.reload().unwrap();
            assert!(summary.engine_changed);
            assert!(summary.restart_required);
            assert!(!summary.radio_retargeted);
            source.replace(config());
            engine.reload().unwrap();
        }
        assert_eq!(engine.status().submode, "normal");

        engine.stop().await.unwrap();
    }

    #[test]
    fn test_reload_without_source() {
        let (engine, _mocks) = engine_with(config());
        assert!(matches!(engine.reload(), Err(Error::Config(_))));
    }

    #[test]
    fn test_status_when_stopped() {
        let (engine, _mocks) = engine_with(config());
        let status = engine.status();
        assert!(!status.running);
        assert_eq!(status.callsign, "N0CALL");
        assert_eq!(status.frequency, 14_078_000);
        assert_eq!(status.submode, "normal");
        assert_eq!((status.tx_queue, status.rx_queue), (0, 0));
        assert_eq!(status.uptime, 0);
    }
}
