//! Byte ring storage and lapped position arithmetic.
//!
//! This module provides the foundational primitives for the broadcast buffer:
//! - Configuration with capacity validation
//! - `Position`, an index into storage paired with a lap counter
//! - The three-case available-span rule shared by every reader
//! - `RingBuffer`, the fixed storage plus the single write cursor

use crate::error::RingError;

/// Buffer size used when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Configuration for a ring buffer.
///
/// Any non-zero capacity is accepted. Storage is never indexed by masking, so
/// there is no power-of-two requirement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of bytes retained by the ring.
    pub capacity: usize,
}

impl RingConfig {
    /// Creates a new ring configuration with the specified capacity.
    ///
    /// # Errors
    /// Returns [`RingError::ZeroCapacity`] if `capacity` is 0.
    ///
    /// # Example
    /// ```
    /// use sertee_ring::RingConfig;
    /// let cfg = RingConfig::new(16).unwrap();
    /// assert_eq!(cfg.capacity, 16);
    /// assert!(RingConfig::new(0).is_err());
    /// ```
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        Ok(Self { capacity })
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// A point in the ring: storage index plus the number of completed laps.
///
/// `index` is always in `[0, capacity)`. Reaching `capacity` is normalized to
/// index 0 of the next lap, so a position never points one past the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub index: usize,
    pub lap: u64,
}

impl Position {
    pub const ZERO: Position = Position { index: 0, lap: 0 };

    pub fn new(index: usize, lap: u64) -> Self {
        Self { index, lap }
    }

    /// Moves forward by `n` bytes within the current lap.
    ///
    /// `n` must not exceed `capacity - index`; landing exactly on `capacity`
    /// wraps to index 0 and bumps the lap.
    #[inline]
    pub fn advance(self, n: usize, capacity: usize) -> Self {
        debug_assert!(self.index + n <= capacity);
        let index = self.index + n;
        if index == capacity {
            Self {
                index: 0,
                lap: self.lap.wrapping_add(1),
            }
        } else {
            Self {
                index,
                lap: self.lap,
            }
        }
    }
}

/// Returns how many contiguous bytes a reader at `read` may consume.
///
/// The span never crosses the end of storage, which is why the rule has three
/// cases instead of a subtraction:
///
/// ```text
/// read.index <  write.index                  -> write.index - read.index
/// read.index == write.index, same lap        -> 0 (caught up)
/// otherwise (reader one lap behind)          -> capacity - read.index
/// ```
///
/// # Example
///
/// ```
/// use sertee_ring::{Position, available_span};
/// // Writer has wrapped once and sits at 4; the reader is a lap behind at 4.
/// let w = Position::new(4, 1);
/// assert_eq!(available_span(Position::new(4, 0), w, 16), 12);
/// assert_eq!(available_span(Position::new(4, 1), w, 16), 0);
/// assert_eq!(available_span(Position::new(1, 1), w, 16), 3);
/// ```
#[inline]
pub fn available_span(read: Position, write: Position, capacity: usize) -> usize {
    if read.index < write.index {
        write.index - read.index
    } else if read.index == write.index && read.lap == write.lap {
        0
    } else {
        capacity - read.index
    }
}

/// Fixed-capacity byte storage plus the single write cursor.
///
/// Storage is allocated once and mutated in place. Only the broadcast engine
/// writes to it; readers hold positions, never references.
pub struct RingBuffer {
    storage: Box<[u8]>,
    write: Position,
    /// Total bytes committed since creation.
    written: u64,
}

impl RingBuffer {
    pub fn new(cfg: RingConfig) -> Self {
        Self {
            storage: vec![0u8; cfg.capacity].into_boxed_slice(),
            write: Position::ZERO,
            written: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Position of the next byte to be written.
    #[inline]
    pub fn write_position(&self) -> Position {
        self.write
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Room left before the writer wraps.
    #[inline]
    pub fn tail_len(&self) -> usize {
        self.capacity() - self.write.index
    }

    /// Unwritten tail of the current lap, `[write.index, capacity)`.
    #[inline]
    pub(crate) fn tail_mut(&mut self) -> &mut [u8] {
        &mut self.storage[self.write.index..]
    }

    /// Marks `n` tail bytes as written and returns the write positions
    /// before and after.
    pub(crate) fn commit(&mut self, n: usize) -> (Position, Position) {
        let before = self.write;
        self.write = before.advance(n, self.capacity());
        self.written += n as u64;
        (before, self.write)
    }

    /// Bytes available to a reader at `read`. See [`available_span`].
    #[inline]
    pub fn available(&self, read: Position) -> usize {
        available_span(read, self.write, self.capacity())
    }

    #[inline]
    pub(crate) fn slice(&self, start: usize, len: usize) -> &[u8] {
        &self.storage[start..start + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(RingConfig::new(0), Err(RingError::ZeroCapacity));
        assert_eq!(RingConfig::default().capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn advance_wraps_exactly_at_capacity() {
        let p = Position::new(5, 2);
        assert_eq!(p.advance(2, 8), Position::new(7, 2));
        assert_eq!(p.advance(3, 8), Position::new(0, 3));
        assert_eq!(p.advance(0, 8), p);
    }

    #[test]
    fn advance_lap_wraps_at_representation_limit() {
        let p = Position::new(7, u64::MAX);
        assert_eq!(p.advance(1, 8), Position::new(0, 0));
    }

    /// Reader behind the writer in the same lap sees only the gap between them.
    #[test]
    fn span_reader_behind_same_lap() {
        assert_eq!(available_span(Position::new(2, 3), Position::new(6, 3), 8), 4);
    }

    /// A reader at the writer's index is either caught up or a full lap behind.
    #[test]
    fn span_equal_index_depends_on_lap() {
        let w = Position::new(3, 5);
        assert_eq!(available_span(Position::new(3, 5), w, 8), 0);
        assert_eq!(available_span(Position::new(3, 4), w, 8), 5);
    }

    /// A lapped reader ahead of the writer drains only up to the storage end.
    #[test]
    fn span_lapped_reader_stops_at_end() {
        assert_eq!(available_span(Position::new(6, 0), Position::new(2, 1), 8), 2);
    }

    #[test]
    fn commit_moves_write_cursor_and_counts() {
        let mut ring = RingBuffer::new(RingConfig::new(4).unwrap());
        assert_eq!(ring.tail_len(), 4);

        let (before, after) = ring.commit(3);
        assert_eq!(before, Position::ZERO);
        assert_eq!(after, Position::new(3, 0));
        assert_eq!(ring.tail_len(), 1);

        let (_, after) = ring.commit(1);
        assert_eq!(after, Position::new(0, 1));
        assert_eq!(ring.bytes_written(), 4);
        assert_eq!(ring.tail_len(), 4);
    }
}
