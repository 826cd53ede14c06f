//! The contract between the multiplexer and the consumer-facing sessions.
//!
//! One endpoint exists per consumer identity. The multiplexer watches its
//! file descriptor, pulls exactly one [`Request`] per readiness event, turns
//! it into a broadcast-engine call, and hands the outcome back through
//! [`SessionEndpoint::reply`].

use crate::error::EndpointError;
use nix::errno::Errno;
use std::fmt;
use std::os::fd::AsFd;

pub mod channel;
pub mod unix;
pub mod wire;

pub use channel::{ChannelClient, ChannelEndpoint, ChannelReply, channel};
pub use unix::UnixEndpoint;

/// One-shot readiness callback parked by a poll request.
///
/// Calling it tells the consumer data is readable; dropping it discards the
/// registration silently.
pub type Waiter = Box<dyn FnOnce()>;

/// A single consumer request.
pub enum Request {
    Open,
    Release,
    Read { offset: usize, len: usize },
    Write(Vec<u8>),
    Poll { waiter: Option<Waiter> },
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Open => f.write_str("Open"),
            Request::Release => f.write_str("Release"),
            Request::Read { offset, len } => f
                .debug_struct("Read")
                .field("offset", offset)
                .field("len", len)
                .finish(),
            Request::Write(bytes) => f.debug_tuple("Write").field(&bytes.len()).finish(),
            Request::Poll { waiter } => f
                .debug_struct("Poll")
                .field("waiter", &waiter.is_some())
                .finish(),
        }
    }
}

/// Answer to the request last returned by [`SessionEndpoint::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply<'a> {
    Opened,
    Released,
    Data(&'a [u8]),
    Written(usize),
    Poll { readable: bool },
    Error(Errno),
}

/// Outcome of one receive attempt.
#[derive(Debug)]
pub enum Received {
    Request(Request),
    /// Nothing to service now (spurious wakeup, interrupt, dropped request).
    Pending,
    /// The session is gone for good.
    Ended,
}

pub trait SessionEndpoint: AsFd {
    /// Consumer identity, used in logs and stop reasons.
    fn name(&self) -> &str;

    /// Takes at most one request. Must not block.
    fn receive(&mut self) -> Result<Received, EndpointError>;

    /// Answers the request most recently received.
    fn reply(&mut self, reply: Reply<'_>) -> Result<(), EndpointError>;

    fn session_ended(&self) -> bool;
}

/// Maps an I/O failure onto the errno a consumer sees.
pub(crate) fn errno_of(err: &std::io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(libc::EIO))
}
