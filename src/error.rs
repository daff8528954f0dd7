use std::fmt;

use js8_protocol::ProtocolError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// One of the four hardware capabilities the manager owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Gpio,
    Display,
    Audio,
    Radio,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gpio => "gpio",
            Self::Display => "display",
            Self::Audio => "audio",
            Self::Radio => "radio",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("{0} is disabled")]
    Disabled(Capability),

    #[error("{0} is not initialized")]
    NotInitialized(Capability),

    #[error("{capability} driver error: {message}")]
    Driver {
        capability: Capability,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn driver(capability: Capability, message: impl Into<String>) -> Self {
        Self::Driver {
            capability,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("transmit queue full")]
    QueueFull,

    #[error("engine not running")]
    NotRunning,

    #[error("engine already running")]
    AlreadyRunning,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("message store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
