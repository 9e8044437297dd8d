//! Parent/child relations between table rows (SPEC_FULL §3 supplement).
//!
//! Grounded on `dof/table/RelationModule.cpp`'s `HasParentRow` /
//! `HasChildrenRow` pair and `RelationWriter::addChildren`. Per REDESIGN
//! FLAGS ("cyclic parent/child references between tables"), both sides of
//! the relation are stored as opaque [`ElementRef`]s resolved through the
//! [`crate::entity::Resolver`] — never raw pointers — so the cycle between
//! a parent's children list and a child's parent pointer is perfectly safe
//! to hold.
//!
//! The source drives cascade-destroy from a later pass over the parent
//! table's event row (`RemoveChildren::execute`). That reads the
//! `ChildrenEntry` at the event's recorded index, which is only sound if
//! nothing has swap-removed that row's storage out from under it since the
//! event was recorded. This module instead captures a parent's children
//! eagerly at the point of removal/move, before any row storage changes —
//! same cascade semantics, without a staleness window.

use crate::entity::ElementRef;
use crate::error::DofResult;
use crate::storage::{Database, TableId};

#[derive(Debug, Clone, PartialEq)]
pub struct ParentEntry {
    pub parent: ElementRef,
}

impl Default for ParentEntry {
    fn default() -> Self {
        ParentEntry { parent: ElementRef::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChildrenEntry {
    pub children: Vec<ElementRef>,
}

/// Appends `count` fresh elements to `child_table`, linking each one's
/// `ParentEntry` (if the table carries one) to `parent` and appending
/// their references to `parent`'s `ChildrenEntry` (if its table carries
/// one). Either row being absent is not an error — the link is simply
/// one-directional in that case.
pub fn add_children(
    db: &mut Database,
    parent: ElementRef,
    child_table: TableId,
    count: usize,
) -> DofResult<Vec<ElementRef>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let first = db.add_elements(child_table, count)?;
    let mut refs = Vec::with_capacity(count);
    for i in 0..count {
        refs.push(db.table(child_table).stable_ref(first + i));
    }
    if let Some(has_parent) = db.table_mut(child_table).dense_mut::<ParentEntry>() {
        for (i, r) in refs.iter().enumerate() {
            let _ = r;
            *has_parent.get_mut(first + i) = ParentEntry { parent };
        }
    }
    if let Some(loc) = db.resolver().try_unpack(parent) {
        if let Some(children_row) = db.table_mut(loc.table).dense_mut::<ChildrenEntry>() {
            children_row.get_mut(loc.index as usize).children.extend(refs.iter().copied());
        }
    }
    Ok(refs)
}

fn children_of(db: &Database, r: ElementRef) -> Vec<ElementRef> {
    match db.resolver().try_unpack(r) {
        Some(loc) => db
            .table(loc.table)
            .dense::<ChildrenEntry>()
            .map(|row| row.get(loc.index as usize).children.clone())
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Removes `r` and, recursively, every element named in its
/// `ChildrenEntry` (if it has one) — the cascade-destroy behavior named
/// in spec §9's parent/child REDESIGN FLAG. A no-op for any reference
/// that is already stale, parent or child.
pub fn remove_with_children(db: &mut Database, r: ElementRef) {
    for child in children_of(db, r) {
        remove_with_children(db, child);
    }
    db.remove_ref(r);
}

/// Moves `r` into `dst`. If `dst` no longer carries `ChildrenEntry`,
/// `r`'s children would otherwise be orphaned with no table left to
/// cascade through later, so they are destroyed now instead.
pub fn move_with_children(db: &mut Database, r: ElementRef, dst: TableId) -> DofResult<()> {
    if !db.table(dst).has_dense::<ChildrenEntry>() {
        for child in children_of(db, r) {
            remove_with_children(db, child);
        }
    }
    db.move_to(r, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TableBuilder;

    fn setup() -> (Database, TableId, TableId) {
        let mut db = Database::new();
        let parents = db.create_table("parents", TableBuilder::new().with_dense::<ChildrenEntry>());
        let children = db.create_table("children", TableBuilder::new().with_dense::<ParentEntry>());
        (db, parents, children)
    }

    #[test]
    fn add_children_links_both_directions() {
        let (mut db, parents, children) = setup();
        let parent = db.add_element(parents).unwrap();
        let kids = add_children(&mut db, parent, children, 2).unwrap();

        let loc = db.resolver().try_unpack(parent).unwrap();
        let entry = db.table(loc.table).dense::<ChildrenEntry>().unwrap().get(loc.index as usize);
        assert_eq!(entry.children, kids);

        for k in &kids {
            let kloc = db.resolver().try_unpack(*k).unwrap();
            let p = db.table(kloc.table).dense::<ParentEntry>().unwrap().get(kloc.index as usize);
            assert_eq!(p.parent, parent);
        }
    }

    #[test]
    fn removing_a_parent_cascades_to_its_children() {
        let (mut db, parents, children) = setup();
        let parent = db.add_element(parents).unwrap();
        let kids = add_children(&mut db, parent, children, 3).unwrap();

        remove_with_children(&mut db, parent);

        assert!(db.resolver().try_unpack(parent).is_none());
        for k in kids {
            assert!(db.resolver().try_unpack(k).is_none());
        }
    }

    #[test]
    fn moving_to_a_table_without_children_row_destroys_children() {
        let (mut db, parents, children) = setup();
        let bare = db.create_table("bare", TableBuilder::new());
        let parent = db.add_element(parents).unwrap();
        let kids = add_children(&mut db, parent, children, 1).unwrap();

        move_with_children(&mut db, parent, bare).unwrap();

        assert!(db.resolver().try_unpack(parent).is_some());
        assert!(db.resolver().try_unpack(kids[0]).is_none());
    }
}
