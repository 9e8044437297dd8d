//! The table database (spec §3-4.2, component C2): owns every [`Table`]
//! and the [`Resolver`] that hands out [`ElementRef`]s across them.
//!
//! Grounded on legion's `World` as the top-level owner of storage plus the
//! allocator, generalized from chunked archetype storage to the flat
//! table/row model spec.md describes.

use std::any::TypeId;

use crate::entity::{ElementRef, Resolver, UnpackedRef};
use crate::error::{DofError, DofResult};
use crate::storage::row::{AnyRow, Component, ElementEvent};
use crate::storage::table::{Table, TableId};

/// Declarative description of a table's row set, built once at startup and
/// handed to [`Database::create_table`]. Mirrors legion's `EntityBuilder`
/// style of chained `with_*` calls, but describes a table's shape rather
/// than a single entity's.
#[derive(Default)]
pub struct TableBuilder {
    capacity: Option<usize>,
    events: bool,
    setup: Vec<Box<dyn FnOnce(&mut Table)>>,
}

impl TableBuilder {
    pub fn new() -> Self {
        TableBuilder::default()
    }

    pub fn with_capacity(mut self, cap: usize) -> Self {
        self.capacity = Some(cap);
        self
    }

    pub fn with_dense<T: Component>(mut self) -> Self {
        self.setup.push(Box::new(|t| t.register_dense::<T>()));
        self
    }

    pub fn with_sparse<T: Component>(mut self) -> Self {
        self.setup.push(Box::new(|t| t.register_sparse::<T>()));
        self
    }

    pub fn with_shared<T: Component>(mut self, value: T) -> Self {
        self.setup.push(Box::new(move |t| t.register_shared::<T>(value)));
        self
    }

    pub fn with_events(mut self) -> Self {
        self.events = true;
        self
    }

    fn build_into(self, table: &mut Table) {
        for step in self.setup {
            step(table);
        }
        if self.events {
            table.register_events();
        }
    }
}

pub struct Database {
    tables: Vec<Table>,
    names: fxhash::FxHashMap<&'static str, TableId>,
    resolver: Resolver,
}

impl Default for Database {
    fn default() -> Self {
        Database {
            tables: Vec::new(),
            names: fxhash::FxHashMap::default(),
            resolver: Resolver::new(),
        }
    }
}

impl Database {
    pub fn new() -> Self {
        Database::default()
    }

    pub fn create_table(&mut self, name: &'static str, builder: TableBuilder) -> TableId {
        let id = TableId::from_raw(self.tables.len() as u32);
        let capacity = builder.capacity;
        let mut table = Table::new(id, name, capacity);
        builder.build_into(&mut table);
        self.tables.push(table);
        self.names.insert(name, id);
        id
    }

    pub fn table_named(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.raw() as usize]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.raw() as usize]
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Appends a fresh element to `table`, default-constructing every row
    /// and returning its new stable reference.
    pub fn add_element(&mut self, table_id: TableId) -> DofResult<ElementRef> {
        {
            let table = self.table(table_id);
            if !table.has_room() {
                return Err(DofError::OutOfCapacity { table: table_id });
            }
        }
        let table = self.table_mut(table_id);
        let index = table.len();
        table.push_default_all();
        let r = self.resolver.allocate(UnpackedRef { table: table_id, index: index as u32 });
        let table = self.table_mut(table_id);
        table.push_stable(r);
        if let Some(events) = table.events_mut() {
            events.insert(index as u32, ElementEvent::Create);
        }
        Ok(r)
    }

    /// Appends `count` elements, returning the index of the first one —
    /// the rest occupy the following `count - 1` indices contiguously.
    pub fn add_elements(&mut self, table_id: TableId, count: usize) -> DofResult<usize> {
        let first = self.table(table_id).len();
        for _ in 0..count {
            self.add_element(table_id)?;
        }
        Ok(first)
    }

    /// Removes the element at `index` from `table`, swap-removing every
    /// row and freeing its reference. Emits a destroy event at the old
    /// tail index, and — if a different element was swapped into the
    /// hole — a move event at `index` naming where it came from.
    pub fn remove(&mut self, table_id: TableId, index: usize) {
        let removed_ref = self.swap_remove_core(table_id, index);
        self.resolver.free(removed_ref);
    }

    /// Removes the element identified by `r`, wherever it currently lives.
    /// No-op if `r` is already stale.
    pub fn remove_ref(&mut self, r: ElementRef) {
        if let Some(loc) = self.resolver.try_unpack(r) {
            self.remove(loc.table, loc.index as usize);
        }
    }

    /// Relocates the element named by `r` from its current table into
    /// `dst`, copying every row type present on both tables. `r` keeps its
    /// identity: callers holding it observe no interruption other than a
    /// change in which table it resolves to.
    pub fn move_to(&mut self, r: ElementRef, dst: TableId) -> DofResult<()> {
        let loc = match self.resolver.try_unpack(r) {
            Some(loc) => loc,
            None => return Ok(()),
        };
        if loc.table == dst {
            return Ok(());
        }
        if !self.table(dst).has_room() {
            return Err(DofError::OutOfCapacity { table: dst });
        }

        let dst_index = self.table(dst).len();
        self.table_mut(dst).push_default_all();
        self.copy_matching_rows(loc.table, loc.index as usize, dst, dst_index);

        self.resolver.repoint(r, UnpackedRef { table: dst, index: dst_index as u32 });
        let dst_table = self.table_mut(dst);
        dst_table.push_stable(r);
        if let Some(events) = dst_table.events_mut() {
            events.insert(dst_index as u32, ElementEvent::Move { from_table: loc.table, from_index: loc.index });
        }

        let _ = self.swap_remove_core(loc.table, loc.index as usize);
        Ok(())
    }

    /// Returns the row value for `T` iff exactly one table carries a
    /// `SharedRow<T>`; ambiguous (more than one) or absent both read as
    /// `None`.
    pub fn try_singleton<T: Component>(&self) -> Option<&T> {
        let mut found: Option<&T> = None;
        for table in &self.tables {
            if let Some(value) = table.shared::<T>() {
                if found.is_some() {
                    return None;
                }
                found = Some(value);
            }
        }
        found
    }

    pub fn try_singleton_mut<T: Component>(&mut self) -> Option<&mut T> {
        let mut hit: Option<usize> = None;
        for (i, table) in self.tables.iter().enumerate() {
            if table.has_shared::<T>() {
                if hit.is_some() {
                    return None;
                }
                hit = Some(i);
            }
        }
        hit.and_then(move |i| self.tables[i].shared_mut::<T>())
    }

    pub fn clear_all_events(&mut self) {
        for table in &mut self.tables {
            table.clear_events();
        }
    }

    /// Copies every row type present on both `src` and `dst` from
    /// `src_index` to `dst_index`. A row type declared on only one side is
    /// simply left at its freshly-pushed default on the destination.
    fn copy_matching_rows(&mut self, src: TableId, src_index: usize, dst: TableId, dst_index: usize) {
        let shared_types: Vec<TypeId> = {
            let src_table = self.table(src);
            let dst_table = self.table(dst);
            src_table
                .type_ids()
                .filter(|ty| dst_table.row(ty).is_some())
                .copied()
                .collect()
        };
        let (src_raw, dst_raw) = (src.raw() as usize, dst.raw() as usize);
        let (lo, hi) = if src_raw < dst_raw { (src_raw, dst_raw) } else { (dst_raw, src_raw) };
        let (left, right) = self.tables.split_at_mut(hi);
        let (src_table, dst_table) = if src_raw < dst_raw {
            (&mut left[lo], &mut right[0])
        } else {
            (&mut right[0], &mut left[lo])
        };
        for ty in shared_types {
            let src_row = src_table.row(&ty).expect("checked present above");
            let dst_row = dst_table.row_mut(&ty).expect("checked present above");
            src_row.copy_into(src_index, dst_row.as_mut(), dst_index);
        }
    }

    fn swap_remove_core(&mut self, table_id: TableId, index: usize) -> ElementRef {
        let table = self.table_mut(table_id);
        let tail = table.len() - 1;
        let moved = index != tail;
        // The events row is excluded from `swap_remove_all_rows`'s generic
        // sweep (it would otherwise immediately relocate or erase the
        // Destroy/Move entries below). Relocate whatever same-tick event it
        // already holds first, exactly as the generic sweep would have, then
        // write this removal's own entries on top.
        table.swap_remove_all_rows(index, tail);
        if let Some(events) = table.events_mut() {
            events.swap_remove(index, tail);
            events.insert(tail as u32, ElementEvent::Destroy);
            if moved {
                events.insert(index as u32, ElementEvent::Move { from_table: table_id, from_index: tail as u32 });
            }
        }
        let removed_ref = table.swap_remove_stable(index);
        if moved {
            let swapped_ref = table.stable_ref(index);
            self.resolver.repoint(swapped_ref, UnpackedRef { table: table_id, index: index as u32 });
        }
        removed_ref
    }
}
