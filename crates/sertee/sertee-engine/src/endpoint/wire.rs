//! Datagram framing for [`UnixEndpoint`](super::UnixEndpoint).
//!
//! Little endian. Requests start with an op byte, replies with a status byte.
//!
//! | op | request body                      |
//! |----|-----------------------------------|
//! | 1  | open                              |
//! | 2  | release                           |
//! | 3  | read: `offset:u64` `len:u32`      |
//! | 4  | write: payload is the rest        |
//! | 5  | poll: `flags:u8`, bit 0 registers |
//!
//! | status | reply body                                            |
//! |--------|-------------------------------------------------------|
//! | 0      | ok: read data, `accepted:u32`, `readable:u8` or empty |
//! | 1      | error: `errno:i32`                                    |
//! | 2      | readiness notification, empty                         |

use super::Reply;
use nix::errno::Errno;
use thiserror::Error;

pub const OP_OPEN: u8 = 1;
pub const OP_RELEASE: u8 = 2;
pub const OP_READ: u8 = 3;
pub const OP_WRITE: u8 = 4;
pub const OP_POLL: u8 = 5;

pub const STATUS_OK: u8 = 0;
pub const STATUS_ERROR: u8 = 1;
pub const STATUS_NOTIFY: u8 = 2;

pub const POLL_REGISTER: u8 = 0x01;

/// Largest read payload carried in one reply datagram. Reads asking for more
/// are shortened so the reply stays well under the default `SO_SNDBUF`.
pub const MAX_REPLY_PAYLOAD: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown op {0}")]
    UnknownOp(u8),

    #[error("unknown status {0}")]
    UnknownStatus(u8),

    #[error("frame truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
}

/// A decoded request, borrowing the write payload from the datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFrame<'a> {
    Open,
    Release,
    Read { offset: u64, len: u32 },
    Write(&'a [u8]),
    Poll { register: bool },
}

/// A decoded reply. The ok body is left raw; its shape depends on the
/// request it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFrame<'a> {
    Ok(&'a [u8]),
    Error(Errno),
    Notify,
}

fn body<const N: usize>(buf: &[u8]) -> Result<[u8; N], WireError> {
    buf.get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or(WireError::Truncated {
            need: N,
            got: buf.len(),
        })
}

pub fn decode_request(buf: &[u8]) -> Result<RequestFrame<'_>, WireError> {
    let (&op, rest) = buf.split_first().ok_or(WireError::Empty)?;
    match op {
        OP_OPEN => Ok(RequestFrame::Open),
        OP_RELEASE => Ok(RequestFrame::Release),
        OP_READ => {
            let raw: [u8; 12] = body(rest)?;
            let (offset, len) = raw.split_at(8);
            Ok(RequestFrame::Read {
                offset: u64::from_le_bytes(body(offset)?),
                len: u32::from_le_bytes(body(len)?),
            })
        }
        OP_WRITE => Ok(RequestFrame::Write(rest)),
        OP_POLL => {
            let [flags] = body::<1>(rest)?;
            Ok(RequestFrame::Poll {
                register: flags & POLL_REGISTER != 0,
            })
        }
        other => Err(WireError::UnknownOp(other)),
    }
}

pub fn encode_request(frame: &RequestFrame<'_>, out: &mut Vec<u8>) {
    out.clear();
    match *frame {
        RequestFrame::Open => out.push(OP_OPEN),
        RequestFrame::Release => out.push(OP_RELEASE),
        RequestFrame::Read { offset, len } => {
            out.push(OP_READ);
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
        }
        RequestFrame::Write(payload) => {
            out.push(OP_WRITE);
            out.extend_from_slice(payload);
        }
        RequestFrame::Poll { register } => {
            out.push(OP_POLL);
            out.push(if register { POLL_REGISTER } else { 0 });
        }
    }
}

pub fn encode_reply(reply: &Reply<'_>, out: &mut Vec<u8>) {
    out.clear();
    match *reply {
        Reply::Opened | Reply::Released => out.push(STATUS_OK),
        Reply::Data(bytes) => {
            out.push(STATUS_OK);
            out.extend_from_slice(bytes);
        }
        Reply::Written(n) => {
            out.push(STATUS_OK);
            let n = u32::try_from(n).unwrap_or(u32::MAX);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Reply::Poll { readable } => {
            out.push(STATUS_OK);
            out.push(u8::from(readable));
        }
        Reply::Error(errno) => {
            out.push(STATUS_ERROR);
            out.extend_from_slice(&(errno as i32).to_le_bytes());
        }
    }
}

pub fn notify_frame() -> [u8; 1] {
    [STATUS_NOTIFY]
}

pub fn decode_reply(buf: &[u8]) -> Result<ReplyFrame<'_>, WireError> {
    let (&status, rest) = buf.split_first().ok_or(WireError::Empty)?;
    match status {
        STATUS_OK => Ok(ReplyFrame::Ok(rest)),
        STATUS_ERROR => Ok(ReplyFrame::Error(Errno::from_raw(i32::from_le_bytes(
            body(rest)?,
        )))),
        STATUS_NOTIFY => Ok(ReplyFrame::Notify),
        other => Err(WireError::UnknownStatus(other)),
    }
}
