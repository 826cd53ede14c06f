//! Single-threaded epoll reactor tying the upstream stream, the broadcast
//! engine and every session endpoint together.
//!
//! The upstream descriptor and each endpoint are registered level-triggered.
//! Upstream readiness drains the source into the ring until it would block.
//! Endpoint readiness services exactly one request. Any endpoint whose
//! session ends stops the whole multiplexer.

use crate::endpoint::{Received, Reply, Request, SessionEndpoint, Waiter, errno_of};
use crate::error::{EngineError, Result};
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use sertee_ring::{BroadcastEngine, ReaderId, RingConfig};
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use tracing::{debug, info, trace, warn};

const UPSTREAM_TOKEN: u64 = u64::MAX;
const MAX_EVENTS: usize = 16;

pub const DEFAULT_IDLE_TIMEOUT_MS: u32 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The upstream source reported end of stream.
    UpstreamClosed,
    /// A consumer session ended; the others go down with it.
    SessionEnded { endpoint: String },
    /// A non-transient error was returned from [`Multiplexer::turn`].
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped(StopReason),
}

struct Slot {
    endpoint: Box<dyn SessionEndpoint>,
    reader: ReaderId,
}

pub struct Multiplexer<S> {
    epoll: Epoll,
    upstream: S,
    engine: BroadcastEngine<Waiter>,
    slots: Vec<Slot>,
    events: Vec<EpollEvent>,
    read_buf: Vec<u8>,
    idle_timeout_ms: u32,
    state: LoopState,
}

impl<S: Read + Write + AsFd> Multiplexer<S> {
    pub fn new(upstream: S, cfg: RingConfig, idle_timeout_ms: u32) -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
        epoll.add(
            upstream.as_fd(),
            EpollEvent::new(EpollFlags::EPOLLIN, UPSTREAM_TOKEN),
        )?;

        info!(capacity = cfg.capacity, "multiplexer ready");
        Ok(Self {
            epoll,
            upstream,
            engine: BroadcastEngine::new(cfg),
            slots: Vec::new(),
            events: vec![EpollEvent::empty(); MAX_EVENTS],
            read_buf: Vec::new(),
            idle_timeout_ms,
            state: LoopState::Running,
        })
    }

    /// Registers a consumer endpoint with its own reader cursor.
    pub fn add_endpoint(&mut self, endpoint: impl SessionEndpoint + 'static) -> Result<ReaderId> {
        let token = self.slots.len() as u64;
        self.epoll.add(
            endpoint.as_fd(),
            EpollEvent::new(EpollFlags::EPOLLIN, token),
        )?;

        let reader = self.engine.register_reader();
        info!(consumer = endpoint.name(), reader = reader.0, "endpoint registered");
        self.slots.push(Slot {
            endpoint: Box::new(endpoint),
            reader,
        });
        Ok(reader)
    }

    pub fn engine(&self) -> &BroadcastEngine<Waiter> {
        &self.engine
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Runs until the loop stops, returning why.
    pub fn run(&mut self) -> Result<StopReason> {
        info!(endpoints = self.slots.len(), "multiplexer running");
        loop {
            if let LoopState::Stopped(reason) = self.turn(self.idle_timeout_ms)? {
                return Ok(reason);
            }
        }
    }

    /// One wait plus dispatch round. Once stopped, further calls return the
    /// stopped state without waiting. A timeout beyond `i32::MAX` ms waits
    /// without limit.
    pub fn turn(&mut self, timeout_ms: u32) -> Result<LoopState> {
        if let LoopState::Stopped(_) = self.state {
            return Ok(self.state.clone());
        }

        let timeout = EpollTimeout::try_from(timeout_ms).unwrap_or(EpollTimeout::NONE);
        let nfds = match self.epoll.wait(&mut self.events, timeout) {
            Ok(n) => n,
            Err(Errno::EINTR) => return Ok(self.state.clone()),
            Err(e) => return Err(self.fail(e.into())),
        };
        if nfds == 0 {
            trace!("idle");
        }

        for i in 0..nfds {
            let token = self.events[i].data();
            let outcome = if token == UPSTREAM_TOKEN {
                self.drain_upstream()
            } else {
                self.service_endpoint(token as usize)
            };

            match outcome {
                Ok(LoopState::Running) => {}
                Ok(stopped) => {
                    info!(state = ?stopped, "multiplexer stopped");
                    self.state = stopped;
                    break;
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(self.state.clone())
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        warn!(error = %err, "multiplexer failed");
        self.state = LoopState::Stopped(StopReason::Failed);
        err
    }

    /// Reads until the source would block, one tail-sized chunk at a time.
    fn drain_upstream(&mut self) -> Result<LoopState> {
        let mut total = 0usize;
        loop {
            match self.engine.fill_from(&mut self.upstream) {
                Ok(0) => {
                    info!(bytes = total, "upstream closed");
                    return Ok(LoopState::Stopped(StopReason::UpstreamClosed));
                }
                Ok(n) => total += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                    ) =>
                {
                    break;
                }
                Err(e) => return Err(EngineError::Upstream(e)),
            }
        }
        trace!(bytes = total, written = self.engine.bytes_written(), "upstream drained");
        Ok(LoopState::Running)
    }

    fn service_endpoint(&mut self, index: usize) -> Result<LoopState> {
        let Self {
            upstream,
            engine,
            slots,
            read_buf,
            ..
        } = self;
        let Some(slot) = slots.get_mut(index) else {
            warn!(token = index, "event for unknown endpoint");
            return Ok(LoopState::Running);
        };
        let endpoint = slot.endpoint.as_mut();

        let request = match endpoint.receive() {
            Ok(Received::Request(request)) => request,
            Ok(Received::Pending) if !endpoint.session_ended() => return Ok(LoopState::Running),
            Ok(Received::Pending) | Ok(Received::Ended) => {
                info!(consumer = endpoint.name(), "session ended");
                return Ok(LoopState::Stopped(StopReason::SessionEnded {
                    endpoint: endpoint.name().to_owned(),
                }));
            }
            Err(source) => {
                return Err(EngineError::Endpoint {
                    name: endpoint.name().to_owned(),
                    source,
                });
            }
        };
        debug!(consumer = endpoint.name(), request = ?request, "request");

        let reader = slot.reader;
        let attached = engine.reader(reader)?.is_attached();
        let reply = match request {
            Request::Open => {
                let open = engine.attach(reader)?;
                debug!(consumer = endpoint.name(), open, "attached");
                Reply::Opened
            }
            Request::Release => {
                let open = engine.detach(reader)?;
                debug!(consumer = endpoint.name(), open, "detached");
                Reply::Released
            }
            Request::Read { .. } | Request::Poll { .. } if !attached => Reply::Error(Errno::EBADF),
            Request::Read { offset, len } => {
                engine.read_into(reader, offset, len, read_buf)?;
                Reply::Data(read_buf.as_slice())
            }
            Request::Write(bytes) => match upstream.write(&bytes) {
                Ok(n) => Reply::Written(n),
                Err(e) => {
                    warn!(consumer = endpoint.name(), error = %e, "write to upstream failed");
                    Reply::Error(errno_of(&e))
                }
            },
            Request::Poll { waiter } => Reply::Poll {
                readable: engine.register_waiter(reader, waiter)?,
            },
        };

        if let Err(e) = endpoint.reply(reply) {
            warn!(consumer = endpoint.name(), error = %e, "reply not delivered");
        }
        Ok(LoopState::Running)
    }
}
