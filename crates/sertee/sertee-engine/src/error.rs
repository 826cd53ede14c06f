use sertee_ring::RingError;
use thiserror::Error;

/// Failure inside one session endpoint.
#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("System error: {0}")]
    Nix(#[from] nix::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("System error: {0}")]
    Nix(#[from] nix::Error),
    #[error("Ring error: {0}")]
    Ring(#[from] RingError),
    #[error("upstream read failed: {0}")]
    Upstream(#[source] std::io::Error),
    #[error("endpoint '{name}' failed: {source}")]
    Endpoint {
        name: String,
        #[source]
        source: EndpointError,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
