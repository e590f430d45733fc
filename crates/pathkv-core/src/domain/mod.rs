//! Domain model (keys, patterns, entries, queries, events, errors).

pub mod entry;
pub mod errors;
pub mod events;
pub mod key;
pub mod query;

pub use self::entry::{Batch, Entry};
pub use self::errors::{ErrorKind, RowError, StoreError};
pub use self::events::{BROADCAST_CHANNEL, ChangeEvent};
pub use self::key::{Key, Pattern, PatternKind, classify_pattern, validate_literal};
pub use self::query::{Query, TimeColumn, TimeWindow};
