//! In-process endpoint: requests are queued in memory and readiness is an
//! `eventfd` the multiplexer can poll like any other descriptor.
//!
//! [`channel`] returns the two halves. The [`ChannelEndpoint`] goes to the
//! multiplexer; the [`ChannelClient`] stays with whoever plays the consumer
//! (tests, or an embedding application).

use super::{Received, Reply, Request, SessionEndpoint, Waiter};
use crate::error::EndpointError;
use nix::errno::Errno;
use nix::sys::eventfd::{EfdFlags, EventFd};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::fd::{AsFd, BorrowedFd};
use std::rc::{Rc, Weak};

/// Owned copy of a [`Reply`], as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelReply {
    Opened,
    Released,
    Data(Vec<u8>),
    Written(usize),
    Poll { readable: bool },
    Error(Errno),
}

impl From<Reply<'_>> for ChannelReply {
    fn from(reply: Reply<'_>) -> Self {
        match reply {
            Reply::Opened => ChannelReply::Opened,
            Reply::Released => ChannelReply::Released,
            Reply::Data(bytes) => ChannelReply::Data(bytes.to_vec()),
            Reply::Written(n) => ChannelReply::Written(n),
            Reply::Poll { readable } => ChannelReply::Poll { readable },
            Reply::Error(errno) => ChannelReply::Error(errno),
        }
    }
}

#[derive(Default)]
struct Shared {
    requests: VecDeque<Request>,
    replies: VecDeque<ChannelReply>,
    notifications: u32,
    ended: bool,
}

/// Creates a connected endpoint/client pair for consumer `name`.
pub fn channel(name: impl Into<String>) -> Result<(ChannelEndpoint, ChannelClient), EndpointError> {
    // Semaphore mode: one read consumes one queued wakeup.
    let ready = EventFd::from_value_and_flags(
        0,
        EfdFlags::EFD_CLOEXEC | EfdFlags::EFD_NONBLOCK | EfdFlags::EFD_SEMAPHORE,
    )?;
    let ready = Rc::new(ready);
    let shared = Rc::new(RefCell::new(Shared::default()));

    let endpoint = ChannelEndpoint {
        name: name.into(),
        ready: ready.clone(),
        shared: shared.clone(),
    };
    Ok((endpoint, ChannelClient { ready, shared }))
}

pub struct ChannelEndpoint {
    name: String,
    ready: Rc<EventFd>,
    shared: Rc<RefCell<Shared>>,
}

impl AsFd for ChannelEndpoint {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.ready.as_fd()
    }
}

impl SessionEndpoint for ChannelEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&mut self) -> Result<Received, EndpointError> {
        match self.ready.read() {
            Ok(_) => {}
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => return Ok(Received::Pending),
            Err(e) => return Err(e.into()),
        }

        let mut shared = self.shared.borrow_mut();
        Ok(match shared.requests.pop_front() {
            Some(request) => Received::Request(request),
            None if shared.ended => Received::Ended,
            None => Received::Pending,
        })
    }

    fn reply(&mut self, reply: Reply<'_>) -> Result<(), EndpointError> {
        self.shared.borrow_mut().replies.push_back(reply.into());
        Ok(())
    }

    fn session_ended(&self) -> bool {
        self.shared.borrow().ended
    }
}

/// Consumer side of a [`channel`].
pub struct ChannelClient {
    ready: Rc<EventFd>,
    shared: Rc<RefCell<Shared>>,
}

impl ChannelClient {
    fn submit(&self, request: Request) -> Result<(), EndpointError> {
        self.shared.borrow_mut().requests.push_back(request);
        self.ready.write(1)?;
        Ok(())
    }

    pub fn open(&self) -> Result<(), EndpointError> {
        self.submit(Request::Open)
    }

    pub fn release(&self) -> Result<(), EndpointError> {
        self.submit(Request::Release)
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<(), EndpointError> {
        self.submit(Request::Read { offset, len })
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), EndpointError> {
        self.submit(Request::Write(bytes.to_vec()))
    }

    /// Asks whether data is readable. With `register` set, a waiter is
    /// parked and counted in [`notifications`](Self::notifications) when it
    /// fires.
    pub fn poll(&self, register: bool) -> Result<(), EndpointError> {
        let waiter = register.then(|| self.waiter());
        self.submit(Request::Poll { waiter })
    }

    fn waiter(&self) -> Waiter {
        // Weak: the waiter may sit inside `shared.requests` itself.
        let shared: Weak<RefCell<Shared>> = Rc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.borrow_mut().notifications += 1;
            }
        })
    }

    /// Ends the session. The endpoint reports it on its next wakeup.
    pub fn end(&self) -> Result<(), EndpointError> {
        self.shared.borrow_mut().ended = true;
        self.ready.write(1)?;
        Ok(())
    }

    pub fn take_reply(&self) -> Option<ChannelReply> {
        self.shared.borrow_mut().replies.pop_front()
    }

    pub fn pending_replies(&self) -> usize {
        self.shared.borrow().replies.len()
    }

    /// Number of parked waiters that have fired.
    pub fn notifications(&self) -> u32 {
        self.shared.borrow().notifications
    }
}
