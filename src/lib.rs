pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod message;
pub mod pool;
pub mod store;

pub use config::{Config, ConfigSource, JsonFileSource, StaticSource};
pub use engine::{Engine, EngineBuilder, Status};
pub use error::{Capability, Error, HardwareError, Result};
pub use message::Message;
pub use pool::AudioBufferPool;
