mod config;

pub use config::{ConfigError, MAX_IDLE_TIMEOUT_MS, Overrides, SerteeConfig};
