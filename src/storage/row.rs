//! The three row storage kinds named in spec §3 ("Row"), plus the event
//! payload type. Grounded on legion's per-archetype component storage
//! (`Box<dyn Any>`-erased columns, downcast on access) generalized from
//! "one array per type" to "dense / sparse / shared" per spec.

use downcast_rs::{impl_downcast, Downcast};
use fxhash::FxHashMap;
use std::fmt::Debug;

use crate::storage::TableId;

/// Marker bound for anything storable in a row. Mirrors legion's
/// `EntityData`/`SharedData` blanket impls (`Send + Sync + 'static +
/// Debug`), with `Default`/`Clone` added because dense/shared rows need to
/// materialize a value on append without the caller supplying one.
pub trait Component: Send + Sync + Debug + Default + Clone + 'static {}
impl<T: Send + Sync + Debug + Default + Clone + 'static> Component for T {}

/// Object-safe row storage. A table holds one of these per registered row
/// type, type-erased behind `Box<dyn AnyRow>` and recovered via
/// `downcast-rs` at the query layer — the same erase/downcast idiom
/// `legion::resource::Resources` uses for its `Box<dyn Resource>` map.
pub trait AnyRow: Downcast + Send + Sync + Debug {
    /// Append a default-constructed element (dense/shared: one slot;
    /// sparse: no-op, since a sparse row only ever holds keys that were
    /// explicitly set).
    fn push_default(&mut self);

    /// Swap-remove semantics for row data at `index`, where `tail` is the
    /// table's last valid index *before* removal. Dense rows delegate to
    /// `Vec::swap_remove` (which is exactly this operation); sparse rows
    /// must be told `tail` explicitly since they have no intrinsic notion
    /// of "the last slot".
    fn swap_remove(&mut self, index: usize, tail: usize);

    /// Copies the value at `src_index` into `dst` at `dst_index`. Callers
    /// only ever pair rows registered under the same `TypeId`, so `dst`'s
    /// concrete type always matches `self`'s — each impl downcasts `dst`
    /// back to its own type rather than going through `AnyRow` again.
    fn copy_into(&self, src_index: usize, dst: &mut dyn AnyRow, dst_index: usize);
}
impl_downcast!(AnyRow);

/// Indexable sequence of `T`, length equal to the table's element count.
#[derive(Debug, Clone)]
pub struct DenseRow<T>(pub Vec<T>);

impl<T> Default for DenseRow<T> {
    fn default() -> Self {
        DenseRow(Vec::new())
    }
}

impl<T: Component> DenseRow<T> {
    pub fn get(&self, index: usize) -> &T {
        &self.0[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut T {
        &mut self.0[index]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.0.iter_mut()
    }
}

impl<T: Component> AnyRow for DenseRow<T> {
    fn push_default(&mut self) {
        self.0.push(T::default());
    }

    fn swap_remove(&mut self, index: usize, _tail: usize) {
        self.0.swap_remove(index);
    }

    fn copy_into(&self, src_index: usize, dst: &mut dyn AnyRow, dst_index: usize) {
        let dst = dst.downcast_mut::<DenseRow<T>>().expect("row type mismatch between tables");
        dst.0[dst_index] = self.0[src_index].clone();
    }
}

/// Mapping from table-local index to `T`; used for flags and events, i.e.
/// data that most rows do not carry.
#[derive(Debug, Clone)]
pub struct SparseRow<T>(pub FxHashMap<u32, T>);

impl<T> Default for SparseRow<T> {
    fn default() -> Self {
        SparseRow(FxHashMap::default())
    }
}

impl<T: Component> SparseRow<T> {
    pub fn get_or_add(&mut self, index: u32) -> &mut T
    where
        T: Default,
    {
        self.0.entry(index).or_insert_with(T::default)
    }

    pub fn insert(&mut self, index: u32, value: T) {
        self.0.insert(index, value);
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.0.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.0.contains_key(&index)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, u32, T> {
        self.0.iter()
    }
}

impl<T: Component> AnyRow for SparseRow<T> {
    fn push_default(&mut self) {
        // A sparse row only holds keys explicitly set by a consumer; a
        // freshly appended element simply has no entry.
    }

    fn swap_remove(&mut self, index: usize, tail: usize) {
        let index = index as u32;
        let tail = tail as u32;
        if index == tail {
            self.0.remove(&index);
            return;
        }
        match self.0.remove(&tail) {
            Some(moved) => {
                self.0.insert(index, moved);
            }
            None => {
                self.0.remove(&index);
            }
        }
    }

    fn copy_into(&self, src_index: usize, dst: &mut dyn AnyRow, dst_index: usize) {
        let dst = dst.downcast_mut::<SparseRow<T>>().expect("row type mismatch between tables");
        match self.get(src_index as u32) {
            Some(value) => dst.insert(dst_index as u32, value.clone()),
            None => {
                dst.0.remove(&(dst_index as u32));
            }
        }
    }
}

/// Single value per table — a per-table configuration singleton, not
/// indexed by element.
#[derive(Debug, Clone)]
pub struct SharedRow<T>(pub T);

impl<T: Component> AnyRow for SharedRow<T> {
    fn push_default(&mut self) {}
    fn swap_remove(&mut self, _index: usize, _tail: usize) {}
    fn copy_into(&self, _src_index: usize, _dst: &mut dyn AnyRow, _dst_index: usize) {
        // A table-level singleton has no per-element identity to carry
        // across a move; the destination keeps whatever value it already
        // had from its own registration.
    }
}

/// The event payload: every table that opts into event tracking carries
/// one `SparseRow<ElementEvent>` (see [`crate::storage::events`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementEvent {
    Create,
    Destroy,
    Move { from_table: TableId, from_index: u32 },
}

impl Default for ElementEvent {
    fn default() -> Self {
        ElementEvent::Create
    }
}

impl ElementEvent {
    pub fn is_create(self) -> bool {
        matches!(self, ElementEvent::Create)
    }
    pub fn is_destroy(self) -> bool {
        matches!(self, ElementEvent::Destroy)
    }
    pub fn is_move(self) -> bool {
        matches!(self, ElementEvent::Move { .. })
    }
}

pub type EventsRow = SparseRow<ElementEvent>;
