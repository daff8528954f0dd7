use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Mutable engine state. Readers take the read lock only long enough to
/// copy what they need; nothing holds it across I/O.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    pub running: bool,
    /// Dial frequency in Hz.
    pub frequency: u64,
    pub ptt: bool,
    pub radio_connected: bool,
    pub started_at: Option<Instant>,
}

impl EngineState {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct SharedState(RwLock<EngineState>);

impl SharedState {
    pub fn new(frequency: u64) -> Self {
        Self(RwLock::new(EngineState {
            frequency,
            ..EngineState::default()
        }))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> EngineState {
        self.read().clone()
    }
}
