//! Event-row helpers layered on top of [`crate::storage::table::Table`].
//!
//! Events are consumed by scanning the sparse map directly (not by
//! iterating `0..table.len()`), since a destroy event is recorded at a
//! table-local index that the table may no longer have by the time a
//! consumer's task runs later in the same tick — grounded on the original
//! `RelationModule.cpp` pattern of iterating an events row's entries
//! rather than indexing into it.

pub use crate::storage::row::{ElementEvent, EventsRow};

/// Call once per tick, after every system that reads events has run, to
/// reset every table's events row for the next tick.
pub fn clear_all(db: &mut crate::storage::Database) {
    db.clear_all_events();
}
