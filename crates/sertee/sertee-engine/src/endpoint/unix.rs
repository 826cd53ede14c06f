//! One `SOCK_DGRAM` Unix socket per consumer identity.
//!
//! Each datagram is one request. Replies go back to the sender's address,
//! and a parked waiter sends a readiness datagram to the address that parked
//! it. See [`wire`](super::wire) for the framing.

use super::wire::{self, RequestFrame};
use super::{Received, Reply, Request, SessionEndpoint, Waiter};
use crate::error::EndpointError;
use nix::errno::Errno;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

const RECV_BUF_SIZE: usize = 64 * 1024;

pub struct UnixEndpoint {
    name: String,
    path: PathBuf,
    socket: Rc<UnixDatagram>,
    peer: Option<SocketAddr>,
    recv_buf: Box<[u8]>,
    send_buf: Vec<u8>,
}

impl UnixEndpoint {
    /// Binds a non-blocking datagram socket at `path`, replacing a stale
    /// socket file left by an earlier run.
    pub fn bind(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, EndpointError> {
        let path = path.as_ref().to_path_buf();
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let socket = UnixDatagram::bind(&path)?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            name: name.into(),
            path,
            socket: Rc::new(socket),
            peer: None,
            recv_buf: vec![0u8; RECV_BUF_SIZE].into_boxed_slice(),
            send_buf: Vec::with_capacity(64),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn send(&mut self, reply: &Reply<'_>) -> Result<(), EndpointError> {
        let Some(peer) = self.peer.as_ref() else {
            return Ok(());
        };
        wire::encode_reply(reply, &mut self.send_buf);
        self.socket.send_to_addr(&self.send_buf, peer)?;
        Ok(())
    }

    fn waiter_for(&self, peer: SocketAddr) -> Waiter {
        let socket = self.socket.clone();
        let name = self.name.clone();
        Box::new(move || {
            if let Err(e) = socket.send_to_addr(&wire::notify_frame(), &peer) {
                debug!(consumer = %name, error = %e, "readiness notification not delivered");
            }
        })
    }

    fn request_from(&self, frame: RequestFrame<'_>, peer: &SocketAddr) -> Request {
        match frame {
            RequestFrame::Open => Request::Open,
            RequestFrame::Release => Request::Release,
            RequestFrame::Read { offset, len } => Request::Read {
                offset: usize::try_from(offset).unwrap_or(usize::MAX),
                len: (len as usize).min(wire::MAX_REPLY_PAYLOAD),
            },
            RequestFrame::Write(payload) => Request::Write(payload.to_vec()),
            RequestFrame::Poll { register } => Request::Poll {
                waiter: register.then(|| self.waiter_for(peer.clone())),
            },
        }
    }
}

impl AsFd for UnixEndpoint {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }
}

impl SessionEndpoint for UnixEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&mut self) -> Result<Received, EndpointError> {
        let (n, peer) = match self.socket.recv_from(&mut self.recv_buf) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                return Ok(Received::Pending);
            }
            Err(e) => return Err(e.into()),
        };

        let decoded = wire::decode_request(&self.recv_buf[..n]).map(|f| self.request_from(f, &peer));
        let request = match decoded {
            Ok(request) => request,
            Err(e) => {
                warn!(consumer = %self.name, error = %e, "malformed request");
                self.peer = Some(peer);
                if let Err(e) = self.send(&Reply::Error(Errno::EINVAL)) {
                    warn!(consumer = %self.name, error = %e, "reply not delivered");
                }
                return Ok(Received::Pending);
            }
        };

        self.peer = Some(peer);
        Ok(Received::Request(request))
    }

    fn reply(&mut self, reply: Reply<'_>) -> Result<(), EndpointError> {
        self.send(&reply)
    }

    /// Datagram sessions have no connection to lose.
    fn session_ended(&self) -> bool {
        false
    }
}

impl Drop for UnixEndpoint {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
