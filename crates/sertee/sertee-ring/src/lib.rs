mod broadcast;
mod cursor;
mod error;
mod ring;

pub use broadcast::{BroadcastEngine, Notify, ReaderId};
pub use cursor::ReaderCursor;
pub use error::RingError;
pub use ring::{DEFAULT_CAPACITY, Position, RingBuffer, RingConfig, available_span};
