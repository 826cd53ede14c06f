use crate::ring::Position;

/// Read-side state for one consumer identity.
///
/// All handles a consumer opens share this one cursor; `open_count` tracks how
/// many are live. The cursor only stores a [`Position`], so it cannot dangle
/// into storage the writer has since reused.
///
/// # Type Parameter
/// - `W`: the pending poll waiter. At most one is held at a time.
#[derive(Debug)]
pub struct ReaderCursor<W> {
    pos: Position,
    open_count: u32,
    pending: Option<W>,
    /// Bytes skipped by overtake correction since the last attach.
    overruns: u64,
}

impl<W> Default for ReaderCursor<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> ReaderCursor<W> {
    pub fn new() -> Self {
        Self {
            pos: Position::ZERO,
            open_count: 0,
            pending: None,
            overruns: 0,
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    pub fn open_count(&self) -> u32 {
        self.open_count
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.open_count > 0
    }

    pub fn has_waiter(&self) -> bool {
        self.pending.is_some()
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Opens one more handle on this cursor.
    ///
    /// The first handle places the cursor relative to the writer: one lap
    /// behind once the writer has wrapped (the whole ring is backlog),
    /// otherwise at the writer (nothing to read yet). Later handles join the
    /// existing cursor untouched.
    pub(crate) fn attach(&mut self, write: Position) -> u32 {
        if self.open_count == 0 {
            let lap = if write.lap > 0 { write.lap - 1 } else { write.lap };
            self.pos = Position::new(write.index, lap);
            self.overruns = 0;
        }
        self.open_count = self.open_count.saturating_add(1);
        self.open_count
    }

    /// Closes one handle. The last close resets the cursor and drops any
    /// pending waiter without notifying it.
    pub(crate) fn detach(&mut self) -> u32 {
        self.open_count = self.open_count.saturating_sub(1);
        if self.open_count == 0 {
            self.pos = Position::ZERO;
            self.pending = None;
        }
        self.open_count
    }

    /// Stores `waiter`, handing back the one it replaces.
    pub(crate) fn replace_waiter(&mut self, waiter: W) -> Option<W> {
        self.pending.replace(waiter)
    }

    pub(crate) fn take_waiter(&mut self) -> Option<W> {
        self.pending.take()
    }

    #[inline]
    pub(crate) fn advance(&mut self, n: usize, capacity: usize) {
        self.pos = self.pos.advance(n, capacity);
    }

    /// Fast-forwards past `skipped` overwritten bytes to `to`.
    pub(crate) fn overtake(&mut self, to: Position, skipped: usize) {
        self.pos = to;
        self.overruns += skipped as u64;
    }
}
