pub mod endpoint;
mod error;
mod multiplexer;
mod upstream;

pub use endpoint::{Received, Reply, Request, SessionEndpoint, Waiter};
pub use error::{EndpointError, EngineError, Result};
pub use multiplexer::{DEFAULT_IDLE_TIMEOUT_MS, LoopState, Multiplexer, StopReason};
pub use upstream::Upstream;
