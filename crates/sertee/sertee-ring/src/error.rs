use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("ring capacity must be greater than zero")]
    ZeroCapacity,

    #[error("unknown reader {0}")]
    UnknownReader(usize),
}
