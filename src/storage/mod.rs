//! The columnar table database (spec §3-4.2, component C2).

mod database;
mod events;
mod row;
mod table;

pub use database::{Database, TableBuilder};
pub use events::clear_all as clear_all_events;
pub use row::{AnyRow, Component, DenseRow, ElementEvent, EventsRow, SharedRow, SparseRow};
pub use table::{Table, TableId};
