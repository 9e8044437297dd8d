use thiserror::Error;

use crate::storage::TableId;

/// Errors surfaced to callers as `Result::Err`.
///
/// Stale references, empty manifolds and non-converged solves are *not*
/// represented here — they are encoded directly in their call's return
/// value (`None`, an empty manifold, a truncated `SolveResult`) because the
/// caller is expected to interpret them rather than unwind on them.
#[derive(Debug, Error)]
pub enum DofError {
    #[error("table {table:?} has no remaining capacity")]
    OutOfCapacity { table: TableId },

    #[error("row type {row} is not present on table {table:?}")]
    SchemaMismatch { table: TableId, row: &'static str },
}

pub type DofResult<T> = Result<T, DofError>;

/// Raised when the scheduler's access-set analysis cannot produce a DAG
/// (a dependency cycle was declared) or an invariant is otherwise violated.
/// Per spec §7 these indicate a programming error: the process aborts with
/// a diagnostic rather than returning a recoverable error.
pub fn scheduler_overflow(detail: impl std::fmt::Display) -> ! {
    tracing::error!(%detail, "scheduler detected an unrecoverable graph/invariant violation");
    panic!("SchedulerOverflow: {}", detail);
}
