use serde::Deserialize;
use sertee_ring::DEFAULT_CAPACITY;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SerteeConfig {
    /// Upstream device or stream path.
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default = "defaults::capacity")]
    pub capacity: usize,
    /// Consumer identities, in order. Duplicates are independent consumers.
    #[serde(default)]
    pub consumers: Vec<String>,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::idle_timeout_ms")]
    /// Epoll wait bound in milliseconds, at most [`MAX_IDLE_TIMEOUT_MS`].
    pub idle_timeout_ms: u32,
    #[serde(default = "defaults::socket_dir")]
    pub socket_dir: PathBuf,
}

pub const MAX_IDLE_TIMEOUT_MS: u32 = i32::MAX as u32;

/// Values given on the command line; each one set replaces the file value.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub source: Option<PathBuf>,
    pub capacity: Option<usize>,
    pub consumers: Option<Vec<String>>,
    pub socket_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("buffer capacity must be greater than zero")]
    InvalidCapacity,

    #[error("at least one consumer name is required")]
    NoConsumers,

    #[error("invalid consumer name '{0}'")]
    InvalidConsumer(String),

    #[error("idle timeout {0} ms is over the limit of {max} ms", max = MAX_IDLE_TIMEOUT_MS)]
    IdleTimeoutTooLong(u32),

    #[error("no upstream source given")]
    MissingSource,
}

mod defaults {
    use std::path::PathBuf;

    pub fn capacity() -> usize {
        super::DEFAULT_CAPACITY
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn idle_timeout_ms() -> u32 {
        30_000
    }

    pub fn socket_dir() -> PathBuf {
        "/tmp/sertee".into()
    }
}

impl Default for SerteeConfig {
    fn default() -> Self {
        Self {
            source: None,
            capacity: defaults::capacity(),
            consumers: Vec::new(),
            log_level: defaults::log_level(),
            idle_timeout_ms: defaults::idle_timeout_ms(),
            socket_dir: defaults::socket_dir(),
        }
    }
}

impl SerteeConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let sertee_config: SerteeConfig = toml::from_str(&toml_to_str)?;
        Ok(sertee_config)
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(source) = overrides.source {
            self.source = Some(source);
        }
        if let Some(capacity) = overrides.capacity {
            self.capacity = capacity;
        }
        if let Some(consumers) = overrides.consumers {
            self.consumers = consumers;
        }
        if let Some(socket_dir) = overrides.socket_dir {
            self.socket_dir = socket_dir;
        }
        self
    }

    /// Checks everything needed to start, returning the upstream path.
    pub fn validate(&self) -> Result<&Path, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.idle_timeout_ms > MAX_IDLE_TIMEOUT_MS {
            return Err(ConfigError::IdleTimeoutTooLong(self.idle_timeout_ms));
        }
        if self.consumers.is_empty() {
            return Err(ConfigError::NoConsumers);
        }
        if let Some(bad) = self
            .consumers
            .iter()
            .find(|name| name.is_empty() || name.contains('/'))
        {
            return Err(ConfigError::InvalidConsumer(bad.clone()));
        }
        self.source.as_deref().ok_or(ConfigError::MissingSource)
    }

    /// Socket path per consumer, in order. The first use of a name binds
    /// `name.sock`, the k-th repeat binds `name.k.sock`.
    pub fn socket_paths(&self) -> Vec<(String, PathBuf)> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        self.consumers
            .iter()
            .map(|name| {
                let k = seen.entry(name.as_str()).or_insert(0);
                let file = match *k {
                    0 => format!("{name}.sock"),
                    k => format!("{name}.{k}.sock"),
                };
                *k += 1;
                (name.clone(), self.socket_dir.join(file))
            })
            .collect()
    }
}
