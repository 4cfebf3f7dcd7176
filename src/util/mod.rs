//! Miscellaneous shared helpers (config loading, clock, storage errors).

pub mod clock;
pub mod config;
pub mod error;

pub use clock::now_ms;
pub use config::{resolve_relative, ConfigError, RuleGateConfig};
pub use error::{SerializationError, StorageError};
