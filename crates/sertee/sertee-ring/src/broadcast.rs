//! Single-producer, multi-consumer (SPMC) broadcast engine over a byte ring.
//!
//! One upstream writer appends bytes; any number of reader cursors drain the
//! same storage at their own pace.
//!
//! # Design
//! - **Writer**: appends at most the remaining tail per call and never waits
//!   for readers. There is no back-pressure.
//! - **Readers**: each [`ReaderCursor`] keeps its own position and lap. A
//!   reader the writer laps is fast-forwarded to the oldest retained byte
//!   (overtake correction); the skipped bytes are counted, not reported.
//! - **Waiters**: a reader may park one waiter. It fires once, on the first
//!   append that leaves the reader with data.
//!
//! # Thread Safety
//! None needed. The engine is driven from a single thread and every method
//! takes `&mut self`.

use crate::cursor::ReaderCursor;
use crate::error::RingError;
use crate::ring::{Position, RingBuffer, RingConfig, available_span};
use std::io::{self, Read};

/// A one-shot readiness callback.
///
/// Calling [`Notify::notify`] consumes the waiter; dropping it discards it
/// silently.
pub trait Notify {
    fn notify(self);
}

impl<F: FnOnce()> Notify for F {
    fn notify(self) {
        self()
    }
}

/// Index of a reader cursor inside a [`BroadcastEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReaderId(pub usize);

/// Owns the ring and every reader cursor.
pub struct BroadcastEngine<W> {
    ring: RingBuffer,
    readers: Vec<ReaderCursor<W>>,
}

impl<W: Notify> BroadcastEngine<W> {
    pub fn new(cfg: RingConfig) -> Self {
        Self {
            ring: RingBuffer::new(cfg),
            readers: Vec::new(),
        }
    }

    /// Adds a detached cursor and returns its id. Ids are dense and never
    /// reused.
    pub fn register_reader(&mut self) -> ReaderId {
        self.readers.push(ReaderCursor::new());
        ReaderId(self.readers.len() - 1)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn write_position(&self) -> Position {
        self.ring.write_position()
    }

    /// Total bytes appended since creation.
    pub fn bytes_written(&self) -> u64 {
        self.ring.bytes_written()
    }

    /// Completed writer laps.
    pub fn laps(&self) -> u64 {
        self.ring.write_position().lap
    }

    /// Room left before the writer wraps; the most a single append accepts.
    pub fn tail_len(&self) -> usize {
        self.ring.tail_len()
    }

    pub fn readers(&self) -> &[ReaderCursor<W>] {
        &self.readers
    }

    pub fn reader(&self, id: ReaderId) -> Result<&ReaderCursor<W>, RingError> {
        self.readers.get(id.0).ok_or(RingError::UnknownReader(id.0))
    }

    fn reader_mut(&mut self, id: ReaderId) -> Result<&mut ReaderCursor<W>, RingError> {
        self.readers.get_mut(id.0).ok_or(RingError::UnknownReader(id.0))
    }

    /// Copies as much of `bytes` as fits in the tail and returns the count.
    ///
    /// Callers holding a larger chunk call again until it is exhausted; each
    /// call runs overtake correction and waiter notification on its own.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.ring.tail_len());
        if n == 0 {
            return 0;
        }
        self.ring.tail_mut()[..n].copy_from_slice(&bytes[..n]);
        self.commit(n);
        n
    }

    /// Reads from `src` straight into the tail with a single `read` call.
    ///
    /// Returns what `src.read` returned. `Ok(0)` means end of stream and
    /// leaves the engine untouched; errors are passed through unchanged.
    pub fn fill_from<R: Read + ?Sized>(&mut self, src: &mut R) -> io::Result<usize> {
        let n = src.read(self.ring.tail_mut())?;
        if n > 0 {
            self.commit(n);
        }
        Ok(n)
    }

    fn commit(&mut self, n: usize) {
        let (before, after) = self.ring.commit(n);
        let end = before.index + n;

        // A reader one lap behind whose next byte sits in [before, end) was
        // just overwritten. Park it on the oldest byte still retained.
        let oldest = Position::new(after.index, after.lap.wrapping_sub(1));
        for cursor in self.readers.iter_mut().filter(|c| c.is_attached()) {
            let pos = cursor.position();
            if pos.lap != before.lap && before.index <= pos.index && pos.index < end {
                cursor.overtake(oldest, end - pos.index);
            }
        }

        for cursor in self.readers.iter_mut().filter(|c| c.is_attached() && c.has_waiter()) {
            if self.ring.available(cursor.position()) > 0 {
                if let Some(waiter) = cursor.take_waiter() {
                    waiter.notify();
                }
            }
        }
    }

    /// Opens a handle on `id`, returning the new open count.
    pub fn attach(&mut self, id: ReaderId) -> Result<u32, RingError> {
        let write = self.ring.write_position();
        Ok(self.reader_mut(id)?.attach(write))
    }

    /// Closes a handle on `id`, returning the remaining open count.
    pub fn detach(&mut self, id: ReaderId) -> Result<u32, RingError> {
        Ok(self.reader_mut(id)?.detach())
    }

    /// Contiguous unread bytes for `id`.
    pub fn available(&self, id: ReaderId) -> Result<usize, RingError> {
        let pos = self.reader(id)?.position();
        Ok(self.ring.available(pos))
    }

    /// Parks `waiter` on `id` and reports whether data is readable now.
    ///
    /// A previously parked waiter is dropped without firing. `None` leaves
    /// the current waiter in place. The new waiter stays parked even when
    /// data is already available; it fires on the next append that leaves
    /// data behind.
    pub fn register_waiter(&mut self, id: ReaderId, waiter: Option<W>) -> Result<bool, RingError> {
        let cursor = self.reader_mut(id)?;
        if let Some(waiter) = waiter {
            drop(cursor.replace_waiter(waiter));
        }
        let pos = cursor.position();
        Ok(self.ring.available(pos) > 0)
    }

    /// Takes up to `len` bytes starting `offset` bytes past the cursor.
    ///
    /// The span never crosses the storage end. The cursor advances by the
    /// returned length only; skipped `offset` bytes stay unread. An `offset`
    /// at or beyond the available span yields an empty slice.
    pub fn consume(&mut self, id: ReaderId, offset: usize, len: usize) -> Result<&[u8], RingError> {
        let capacity = self.ring.capacity();
        let write = self.ring.write_position();
        let cursor = self.reader_mut(id)?;
        let start = cursor.position();

        let available = available_span(start, write, capacity);
        let len = if offset >= available {
            0
        } else {
            len.min(available - offset)
        };
        if len == 0 {
            return Ok(&[]);
        }

        cursor.advance(len, capacity);
        Ok(self.ring.slice(start.index + offset, len))
    }

    /// Fills `out` with up to `len` bytes for `id`, crossing the wrap point
    /// if needed.
    ///
    /// Runs [`consume`](Self::consume) once with `offset`; when that span
    /// ends at the storage boundary and `len` is not yet met, runs it again
    /// from the start of storage. Returns the number of bytes placed in
    /// `out`, which is cleared first.
    pub fn read_into(
        &mut self,
        id: ReaderId,
        offset: usize,
        len: usize,
        out: &mut Vec<u8>,
    ) -> Result<usize, RingError> {
        out.clear();
        let first = self.consume(id, offset, len)?;
        out.extend_from_slice(first);

        let wrapped = !out.is_empty() && self.reader(id)?.position().index == 0;
        if wrapped && out.len() < len {
            let rest = len - out.len();
            let second = self.consume(id, 0, rest)?;
            out.extend_from_slice(second);
        }
        Ok(out.len())
    }

    /// Bytes `id` has lost to overtake correction since it last attached.
    pub fn overruns(&self, id: ReaderId) -> Result<u64, RingError> {
        Ok(self.reader(id)?.overruns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    type Waiter = Box<dyn FnOnce()>;

    fn engine(capacity: usize) -> BroadcastEngine<Waiter> {
        BroadcastEngine::new(RingConfig::new(capacity).unwrap())
    }

    fn counting_waiter(hits: &Rc<Cell<u32>>) -> Waiter {
        let hits = hits.clone();
        Box::new(move || hits.set(hits.get() + 1))
    }

    fn append_all(e: &mut BroadcastEngine<Waiter>, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let n = e.append(bytes);
            bytes = &bytes[n..];
        }
    }

    #[test]
    fn append_stops_at_tail() {
        let mut e = engine(8);
        assert_eq!(e.append(b"abcdef"), 6);
        assert_eq!(e.append(b"ghij"), 2);
        assert_eq!(e.write_position(), Position::new(0, 1));
        assert_eq!(e.append(b""), 0);
        assert_eq!(e.bytes_written(), 8);
        assert_eq!(e.laps(), 1);
    }

    #[test]
    fn unknown_reader_is_an_error() {
        let mut e = engine(8);
        assert_eq!(e.attach(ReaderId(3)), Err(RingError::UnknownReader(3)));
        assert_eq!(e.available(ReaderId(0)), Err(RingError::UnknownReader(0)));
    }

    #[test]
    fn caught_up_reader_sees_new_bytes() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        assert_eq!(e.available(r).unwrap(), 0);

        e.append(b"hey");
        assert_eq!(e.available(r).unwrap(), 3);
        assert_eq!(e.consume(r, 0, 10).unwrap(), b"hey");
        assert_eq!(e.available(r).unwrap(), 0);
    }

    #[test]
    fn consume_honours_offset_without_consuming_it() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        e.append(b"abcde");

        assert_eq!(e.consume(r, 2, 2).unwrap(), b"cd");
        // Advanced by the returned length only.
        assert_eq!(e.reader(r).unwrap().position(), Position::new(2, 0));
        assert_eq!(e.consume(r, 3, 4).unwrap(), b"");
        assert_eq!(e.consume(r, 9, 4).unwrap(), b"");
    }

    #[test]
    fn consume_to_boundary_wraps_reader_lap() {
        let mut e = engine(4);
        let r = e.register_reader();
        e.attach(r).unwrap();
        append_all(&mut e, b"wxyz");

        assert_eq!(e.consume(r, 0, 10).unwrap(), b"wxyz");
        assert_eq!(e.reader(r).unwrap().position(), Position::new(0, 1));
        assert_eq!(e.available(r).unwrap(), 0);
    }

    #[test]
    fn read_into_crosses_wrap_point() {
        let mut e = engine(8);
        let r = e.register_reader();
        append_all(&mut e, b"01234567ab");
        e.attach(r).unwrap();

        let mut out = Vec::new();
        assert_eq!(e.read_into(r, 0, 64, &mut out).unwrap(), 8);
        assert_eq!(out, b"234567ab");
    }

    #[test]
    fn read_into_respects_len_across_wrap() {
        let mut e = engine(8);
        let r = e.register_reader();
        append_all(&mut e, b"01234567ab");
        e.attach(r).unwrap();

        let mut out = Vec::new();
        assert_eq!(e.read_into(r, 0, 7, &mut out).unwrap(), 7);
        assert_eq!(out, b"234567a");
        assert_eq!(e.read_into(r, 0, 7, &mut out).unwrap(), 1);
        assert_eq!(out, b"b");
    }

    #[test]
    fn caught_up_reader_is_never_overtaken() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        append_all(&mut e, b"abc");
        e.consume(r, 0, 3).unwrap();

        append_all(&mut e, b"defghijk");
        assert_eq!(e.overruns(r).unwrap(), 0);

        let mut out = Vec::new();
        e.read_into(r, 0, 64, &mut out).unwrap();
        assert_eq!(out, b"defghijk");
    }

    #[test]
    fn lapped_reader_moves_to_oldest_retained_byte() {
        let mut e = engine(8);
        let r = e.register_reader();
        append_all(&mut e, b"ABCDEFGH");
        e.attach(r).unwrap();

        append_all(&mut e, b"IJK");
        assert_eq!(e.overruns(r).unwrap(), 3);

        let mut out = Vec::new();
        e.read_into(r, 0, 64, &mut out).unwrap();
        assert_eq!(out, b"DEFGHIJK");
    }

    #[test]
    fn overtake_at_end_of_storage_keeps_full_backlog() {
        let mut e = engine(8);
        let r = e.register_reader();
        append_all(&mut e, b"ABCDE");
        e.attach(r).unwrap();
        append_all(&mut e, b"FGH");
        // Reader at 5 lap 0 with "FGH" unread, writer at 0 lap 1.

        append_all(&mut e, b"IJKLMNOP");
        assert_eq!(e.overruns(r).unwrap(), 3);
        let mut out = Vec::new();
        e.read_into(r, 0, 64, &mut out).unwrap();
        assert_eq!(out, b"IJKLMNOP");
    }

    #[test]
    fn detached_reader_is_ignored_by_append() {
        let mut e = engine(4);
        let r = e.register_reader();
        append_all(&mut e, b"abcdefghij");
        assert_eq!(e.reader(r).unwrap().position(), Position::ZERO);
        assert_eq!(e.overruns(r).unwrap(), 0);
    }

    #[test]
    fn waiter_fires_once_on_data() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        let hits = Rc::new(Cell::new(0));

        assert!(!e.register_waiter(r, Some(counting_waiter(&hits))).unwrap());
        e.append(b"x");
        assert_eq!(hits.get(), 1);
        assert!(!e.reader(r).unwrap().has_waiter());

        e.append(b"y");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn replaced_waiter_is_discarded_without_firing() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        let first = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(0));

        e.register_waiter(r, Some(counting_waiter(&first))).unwrap();
        e.register_waiter(r, Some(counting_waiter(&second))).unwrap();
        e.append(b"x");

        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn poll_without_waiter_keeps_existing_one() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        let hits = Rc::new(Cell::new(0));

        e.register_waiter(r, Some(counting_waiter(&hits))).unwrap();
        assert!(!e.register_waiter(r, None).unwrap());
        assert!(e.reader(r).unwrap().has_waiter());
        e.append(b"x");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn poll_reports_readable_immediately() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        e.append(b"x");
        let hits = Rc::new(Cell::new(0));

        assert!(e.register_waiter(r, Some(counting_waiter(&hits))).unwrap());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn waiter_on_detached_reader_never_fires() {
        let mut e = engine(8);
        let a = e.register_reader();
        let b = e.register_reader();
        e.attach(a).unwrap();
        let hits = Rc::new(Cell::new(0));
        e.register_waiter(b, Some(counting_waiter(&hits))).unwrap();

        e.append(b"x");
        assert_eq!(hits.get(), 0);
        assert_eq!(e.available(a).unwrap(), 1);
    }

    #[test]
    fn detach_drops_pending_waiter() {
        let mut e = engine(8);
        let r = e.register_reader();
        e.attach(r).unwrap();
        let hits = Rc::new(Cell::new(0));
        e.register_waiter(r, Some(counting_waiter(&hits))).unwrap();

        e.detach(r).unwrap();
        e.append(b"x");
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn fill_from_reads_into_tail() {
        let mut e = engine(4);
        let r = e.register_reader();
        e.attach(r).unwrap();
        let mut src: &[u8] = b"abcdef";

        assert_eq!(e.fill_from(&mut src).unwrap(), 4);
        assert_eq!(e.fill_from(&mut src).unwrap(), 2);
        assert_eq!(e.fill_from(&mut src).unwrap(), 0);
        assert_eq!(e.bytes_written(), 6);
        assert_eq!(e.write_position(), Position::new(2, 1));
    }
}
