//! Query alias & task builder (spec §4.3, component C3).
//!
//! Grounded on legion's `Read<T>`/`Write<T>` marker types and tuple `View`
//! composition (`query.rs`), generalized from "fetch a chunk slice" to
//! "does this table carry the row, and what access does declaring it
//! imply for the scheduler's edge inference". Where legion downcasts a
//! chunk's component vec on every fetch, the per-task [`RowCache`] here
//! plays the same role as the source's `tryGetOrSwapRow` — a 1-slot memo
//! of "which table did we last resolve this row against" so a task that
//! revisits the same table back-to-back (the common case for physics
//! inner loops iterating a broadphase pair list) skips a repeated row
//! lookup.

use std::any::TypeId;
use std::marker::PhantomData;

use crate::scheduler::graph::AccessSet;
use crate::storage::{Component, Database, DenseRow, SharedRow, SparseRow, Table, TableId};

/// Read access to a dense row.
pub struct Read<T>(PhantomData<T>);
/// Write access to a dense row.
pub struct Write<T>(PhantomData<T>);
/// Read access to a sparse row (flags/events).
pub struct ReadSparse<T>(PhantomData<T>);
/// Write access to a sparse row.
pub struct WriteSparse<T>(PhantomData<T>);
/// Read access to a table's shared (singleton) row.
pub struct ReadShared<T>(PhantomData<T>);

/// One term of a query alias: does a table carry the row, and what does
/// declaring the term add to the task's access set.
pub trait QueryTerm {
    fn matches(table: &Table) -> bool;
    fn access(set: AccessSet) -> AccessSet;
}

impl<T: Component> QueryTerm for Read<T> {
    fn matches(table: &Table) -> bool {
        table.has_dense::<T>()
    }
    fn access(set: AccessSet) -> AccessSet {
        set.reading::<DenseRow<T>>()
    }
}

impl<T: Component> QueryTerm for Write<T> {
    fn matches(table: &Table) -> bool {
        table.has_dense::<T>()
    }
    fn access(set: AccessSet) -> AccessSet {
        set.writing::<DenseRow<T>>()
    }
}

impl<T: Component> QueryTerm for ReadSparse<T> {
    fn matches(table: &Table) -> bool {
        table.has_sparse::<T>()
    }
    fn access(set: AccessSet) -> AccessSet {
        set.reading::<SparseRow<T>>()
    }
}

impl<T: Component> QueryTerm for WriteSparse<T> {
    fn matches(table: &Table) -> bool {
        table.has_sparse::<T>()
    }
    fn access(set: AccessSet) -> AccessSet {
        set.writing::<SparseRow<T>>()
    }
}

impl<T: Component> QueryTerm for ReadShared<T> {
    fn matches(table: &Table) -> bool {
        table.has_shared::<T>()
    }
    fn access(set: AccessSet) -> AccessSet {
        set.reading::<SharedRow<T>>()
    }
}

macro_rules! impl_query_term_tuple {
    ($($t:ident),+) => {
        impl<$($t: QueryTerm),+> QueryTerm for ($($t,)+) {
            fn matches(table: &Table) -> bool {
                $($t::matches(table))&&+
            }
            fn access(set: AccessSet) -> AccessSet {
                let set = set;
                $(let set = $t::access(set);)+
                set
            }
        }
    };
}

impl_query_term_tuple!(A);
impl_query_term_tuple!(A, B);
impl_query_term_tuple!(A, B, C);
impl_query_term_tuple!(A, B, C, D);
impl_query_term_tuple!(A, B, C, D, E);

/// A compile-time description of one or more row accesses (spec
/// "Query alias"). `Q` is a [`QueryTerm`] — a marker type or tuple of
/// markers — naming the rows and their access mode.
pub struct QueryAlias<Q> {
    _marker: PhantomData<Q>,
}

impl<Q: QueryTerm> QueryAlias<Q> {
    pub fn new() -> Self {
        QueryAlias { _marker: PhantomData }
    }

    pub fn access_set() -> AccessSet {
        Q::access(AccessSet::new())
    }
}

impl<Q: QueryTerm> Default for QueryAlias<Q> {
    fn default() -> Self {
        Self::new()
    }
}

/// The materialised set of tables whose rows satisfy every aliased
/// term, built once per tick and reused by every resolver the task
/// creates. Tables are enumerated in table-creation order.
pub struct QueryResult<Q> {
    tables: Vec<TableId>,
    _marker: PhantomData<Q>,
}

impl<Q: QueryTerm> QueryResult<Q> {
    pub fn new(db: &Database) -> Self {
        let tables = db.tables().filter(|t| Q::matches(t)).map(|t| t.id()).collect();
        QueryResult { tables, _marker: PhantomData }
    }

    pub fn tables(&self) -> &[TableId] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// 1-slot memo of the last `(table, row type)` a resolver was asked
/// about. Declaring one per row a task resolves and reusing it across
/// calls avoids repeating the "does this table carry the row" check when
/// a task revisits the same table on consecutive elements — physics
/// inner loops commonly do, since most pairs and constraints stay within
/// one or two tables for the whole tick. The row type is part of the
/// memo key: a cache is meant to be declared one per row, but nothing
/// stops a caller reusing one across two different `T`s on the same
/// table, and a key of `table` alone would hand the second row type the
/// first's cached answer.
#[derive(Default)]
pub struct RowCache {
    last_table: Option<TableId>,
    last_row: Option<TypeId>,
    last_hit: bool,
}

impl RowCache {
    pub fn new() -> Self {
        RowCache::default()
    }

    /// Returns whether `table` carries row `T`, consulting the 1-slot
    /// memo before falling back to the table's row map.
    pub fn has<T: Component>(&mut self, table: &Table) -> bool {
        let row = TypeId::of::<T>();
        if self.last_table == Some(table.id()) && self.last_row == Some(row) {
            return self.last_hit;
        }
        let hit = table.has_dense::<T>();
        self.last_table = Some(table.id());
        self.last_row = Some(row);
        self.last_hit = hit;
        hit
    }

    pub fn invalidate(&mut self) {
        self.last_table = None;
        self.last_row = None;
    }
}

/// Resolves a dense row on `table` through the cache, returning `None`
/// if the table does not carry `T` (a miss simply swaps the cache's
/// memoized table rather than producing an error — spec "the cache is
/// mandatory" for the hot path, not a correctness gate).
pub fn try_get_or_swap_row<'t, T: Component>(
    cache: &mut RowCache,
    table: &'t Table,
) -> Option<&'t DenseRow<T>> {
    if cache.has::<T>(table) {
        table.dense::<T>()
    } else {
        None
    }
}

pub fn try_get_or_swap_row_mut<'t, T: Component>(
    cache: &mut RowCache,
    table: &'t mut Table,
) -> Option<&'t mut DenseRow<T>> {
    if cache.has::<T>(table) {
        table.dense_mut::<T>()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TableBuilder;

    #[derive(Debug, Default, Clone)]
    struct Position(f32);
    #[derive(Debug, Default, Clone)]
    struct Velocity(f32);

    #[test]
    fn query_result_only_lists_tables_with_every_aliased_row() {
        let mut db = Database::new();
        let both = db.create_table("both", TableBuilder::new().with_dense::<Position>().with_dense::<Velocity>());
        let _pos_only = db.create_table("pos_only", TableBuilder::new().with_dense::<Position>());

        let result: QueryResult<(Read<Position>, Write<Velocity>)> = QueryResult::new(&db);
        assert_eq!(result.tables(), &[both]);
    }

    #[test]
    fn access_set_reflects_declared_read_write_modes() {
        let set = QueryAlias::<(Read<Position>, Write<Velocity>)>::access_set();
        assert_eq!(set.reads.len(), 1);
        assert_eq!(set.writes.len(), 1);
    }

    #[test]
    fn row_cache_memoizes_the_last_table_checked() {
        let mut db = Database::new();
        let t = db.create_table("t", TableBuilder::new().with_dense::<Position>());
        let mut cache = RowCache::new();
        assert!(cache.has::<Position>(db.table(t)));
        // second call against the same table should hit the memo, not re-probe
        assert!(cache.has::<Position>(db.table(t)));
    }

    #[test]
    fn row_cache_does_not_leak_a_hit_across_row_types_on_the_same_table() {
        let mut db = Database::new();
        let t = db.create_table("t", TableBuilder::new().with_dense::<Position>());
        let mut cache = RowCache::new();
        assert!(cache.has::<Position>(db.table(t)));
        // same table, different row: must re-probe instead of returning Position's hit.
        assert!(!cache.has::<Velocity>(db.table(t)));
    }
}
