//! World/inverse transform resolution (SPEC_FULL §4.8 supplement).
//!
//! Grounded on `dof/transform/src/TransformResolver.cpp`: `resolve`,
//! `resolve_pair`, and `force_resolve_pair` mirror `Resolver::resolve`,
//! `resolvePair`, `forceResolvePair` — the same lazy-inverse contract,
//! where `resolve_pair` trusts whatever inverse is currently stored and
//! `force_resolve_pair` recomputes it on the spot when the element's
//! `TransformNeedsUpdateRow` flag is still set, rather than waiting for
//! the update tick to get to it.

use crate::entity::ElementRef;
use crate::math::PackedTransform;
use crate::storage::{Database, TableId};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TransformPair {
    pub world: PackedTransform,
    pub world_inverse: PackedTransform,
}

/// Sparse flag row: an element's world transform changed since the inverse
/// was last recomputed. Set by whatever writes `WorldTransformRow`, cleared
/// by the update task once it recomputes the inverse.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformNeedsUpdate;

/// Sparse event row emitted once per tick for every element whose inverse
/// was actually recomputed, so downstream consumers (broadphase, mass)
/// know to re-derive anything cached from the transform.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformHasUpdated;

pub fn resolve(db: &Database, r: ElementRef) -> PackedTransform {
    match db.resolver().try_unpack(r) {
        Some(loc) => resolve_at(db, loc.table, loc.index as usize),
        None => PackedTransform::default(),
    }
}

fn resolve_at(db: &Database, table: TableId, index: usize) -> PackedTransform {
    db.table(table)
        .dense::<PackedTransform>()
        .map(|row| *row.get(index))
        .unwrap_or_default()
}

/// Returns the stored `(world, inverse)` pair without recomputing
/// anything, even if the element's `TransformNeedsUpdate` flag is set.
pub fn resolve_pair(db: &Database, r: ElementRef) -> TransformPair {
    match db.resolver().try_unpack(r) {
        Some(loc) => {
            let table = db.table(loc.table);
            let world = table.dense::<PackedTransform>().map(|row| *row.get(loc.index as usize)).unwrap_or_default();
            let world_inverse = table
                .sparse::<WorldInverseTransform>()
                .and_then(|row| row.get(loc.index))
                .map(|v| v.0)
                .unwrap_or_default();
            TransformPair { world, world_inverse }
        }
        None => TransformPair::default(),
    }
}

/// Like [`resolve_pair`], but recomputes the inverse on the spot if this
/// element's `TransformNeedsUpdate` flag is still set, instead of trusting
/// a possibly-stale cached inverse.
pub fn force_resolve_pair(db: &mut Database, r: ElementRef) -> TransformPair {
    let loc = match db.resolver().try_unpack(r) {
        Some(loc) => loc,
        None => return TransformPair::default(),
    };
    let needs_update = db.table(loc.table).sparse::<TransformNeedsUpdate>().map_or(false, |row| row.contains(loc.index));
    let world = resolve_at(db, loc.table, loc.index as usize);
    if needs_update {
        let inverse = world.inverse();
        if let Some(row) = db.table_mut(loc.table).sparse_mut::<WorldInverseTransform>() {
            row.insert(loc.index, WorldInverseTransform(inverse));
        }
        TransformPair { world, world_inverse: inverse }
    } else {
        let world_inverse = db
            .table(loc.table)
            .sparse::<WorldInverseTransform>()
            .and_then(|row| row.get(loc.index))
            .map(|v| v.0)
            .unwrap_or_default();
        TransformPair { world, world_inverse }
    }
}

/// Cached inverse transform, stored sparsely since most elements never
/// need an explicit inverse resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldInverseTransform(pub PackedTransform);

/// Runs over every flagged element in `table`: recomputes its inverse,
/// clears the flag, and records a `TransformHasUpdated` event — the
/// per-tick "transform world/inverse update" step named in spec §2.
pub fn update_flagged(db: &mut Database, table: TableId) {
    let flagged: Vec<u32> = db
        .table(table)
        .sparse::<TransformNeedsUpdate>()
        .map(|row| row.iter().map(|(i, _)| *i).collect())
        .unwrap_or_default();

    for index in flagged {
        let world = resolve_at(db, table, index as usize);
        let inverse = world.inverse();
        let t = db.table_mut(table);
        if let Some(row) = t.sparse_mut::<WorldInverseTransform>() {
            row.insert(index, WorldInverseTransform(inverse));
        }
        if let Some(row) = t.sparse_mut::<TransformNeedsUpdate>() {
            row.0.remove(&index);
        }
        if let Some(row) = t.sparse_mut::<TransformHasUpdated>() {
            row.insert(index, TransformHasUpdated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{vec2, Parts};
    use crate::storage::TableBuilder;

    fn setup() -> (Database, TableId) {
        let mut db = Database::new();
        let table = db.create_table(
            "bodies",
            TableBuilder::new()
                .with_dense::<PackedTransform>()
                .with_sparse::<WorldInverseTransform>()
                .with_sparse::<TransformNeedsUpdate>()
                .with_sparse::<TransformHasUpdated>(),
        );
        (db, table)
    }

    #[test]
    fn update_flagged_recomputes_only_flagged_elements() {
        let (mut db, table) = setup();
        let moved = db.add_element(table).unwrap();
        let still = db.add_element(table).unwrap();

        let loc = db.resolver().try_unpack(moved).unwrap();
        db.table_mut(table).dense_mut::<PackedTransform>().unwrap().get_mut(loc.index as usize).set_pos(vec2(3.0, 4.0));
        db.table_mut(table).sparse_mut::<TransformNeedsUpdate>().unwrap().insert(loc.index, TransformNeedsUpdate);

        update_flagged(&mut db, table);

        let pair = resolve_pair(&db, moved);
        assert!((pair.world_inverse.pos2().x + 3.0).abs() < 1e-4);

        let still_loc = db.resolver().try_unpack(still).unwrap();
        assert!(!db.table(table).sparse::<TransformHasUpdated>().unwrap().contains(still_loc.index));
    }

    #[test]
    fn force_resolve_pair_recomputes_when_flag_is_set_and_trusts_cache_otherwise() {
        let (mut db, table) = setup();
        let r = db.add_element(table).unwrap();
        let loc = db.resolver().try_unpack(r).unwrap();
        db.table_mut(table).dense_mut::<PackedTransform>().unwrap().get_mut(loc.index as usize).set_pos(vec2(1.0, 0.0));

        let stale = force_resolve_pair(&mut db, r);
        assert_eq!(stale.world_inverse, PackedTransform::default());

        db.table_mut(table).sparse_mut::<TransformNeedsUpdate>().unwrap().insert(loc.index, TransformNeedsUpdate);
        let fresh = force_resolve_pair(&mut db, r);
        assert_eq!(fresh.world_inverse, fresh.world.inverse());
        let _ = Parts::default();
    }
}
