//! Physics orchestration (spec §4.8, component C8): mass refresh,
//! transform propagation, shape classification, broadphase, narrowphase,
//! constraint assembly, PGS solve, and velocity integration, tied
//! together into one per-tick [`PhysicsPipeline::step`].
//!
//! Grounded on `dof/physics/module/MassModule.cpp`'s flag-then-refresh
//! pattern (`FlagNewElements` / `UpdateMasses`) for the mass substep, and
//! on spec §2's tick-order list for the rest: preProcessEvents, shape/mass
//! refresh, transform update, broadphase rebuild, narrowphase, constraint
//! assembly, PGS solve, integrate, clear events.
//!
//! Simplification: this module drives its substeps over a single
//! caller-supplied "bodies" table directly, rather than fanning them out
//! as [`crate::scheduler`] graph nodes. The scheduler itself is fully
//! general (any task declaring an [`AccessSet`] can be folded into a
//! shared DAG); physics substeps here mostly share one table and one
//! piece of pipeline-owned state that has no natural row home (the
//! broadphase grid, the pair-manifold map, the solver's flat arrays all
//! span the whole tick rather than belonging to a single row), so nothing
//! is gained by wrapping each one in a `TaskSpec` versus calling it
//! directly in order. `access_set()` on the public step functions below
//! documents what a caller folding these into a larger graph would
//! declare.
//!
//! Also simplified: mass is computed about each shape's local origin
//! (`center_of_mass` from [`mass::compute_mass`] is discarded) — fine for
//! the symmetric primitive shapes this pipeline targets, but not correct
//! for an arbitrary off-center mesh. A full implementation would carry
//! the center of mass as its own row and offset contact jacobians by it.

pub mod broadphase;
pub mod mass;
pub mod narrowphase;
pub mod shapes;
pub mod solver;
pub mod transform;

use fxhash::FxHashMap;

use crate::config::{EngineConfig, PhysicsConfig};
use crate::entity::ElementRef;
use crate::math::geo::cross;
use crate::math::{vec2, PackedTransform, Vec2};
use crate::scheduler::graph::AccessSet;
use crate::storage::{Database, DenseRow, SparseRow, TableId};

use broadphase::{Aabb, BroadphaseGrid, BroadphaseKey, GridConfig};
use mass::{compute_mass, Body as MassBody};
use narrowphase::{generate_contacts_convex, ContactManifold, NarrowphaseOptions};
use shapes::{ClassifiedShape, ShapeData};
use solver::PgsSolver;

/// 2D rigid-body constraint block layout: linear x, linear y, angular.
const BLOCK_SIZE: usize = 3;

/// Per-body linear + angular velocity (spec §3 "Constraint row set"'s
/// `velocity[B x blockSize]`).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Velocity {
    pub linear: Vec2,
    pub angular: f32,
}

/// Mass density used by [`mass::compute_mass`]; defaults to 1 for
/// elements that never set one explicitly.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Density(pub f32);

impl Default for Density {
    fn default() -> Self {
        Density(1.0)
    }
}

/// Per-element inverse-mass/inverse-inertia block, refreshed whenever
/// [`RecomputeMass`] is flagged.
#[derive(Copy, Clone, Debug, Default)]
pub struct MassProps(pub MassBody);

/// Sparse flag: this element's shape or transform changed since its mass
/// was last computed.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RecomputeMass;

/// Sparse handle into the pipeline's [`BroadphaseGrid`], absent for
/// elements with no collision footprint this tick.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BroadphaseHandle(pub Option<BroadphaseKey>);

/// Flags every element whose `EventsRow` recorded a create or move this
/// tick for a mass recompute — `MassModule.cpp`'s `FlagNewElements`.
pub fn flag_new_elements(db: &mut Database, table: TableId) {
    let flagged: Vec<u32> = match db.table(table).events() {
        Some(events) => events.iter().filter(|(_, e)| e.is_create() || e.is_move()).map(|(i, _)| *i).collect(),
        None => return,
    };
    if flagged.is_empty() {
        return;
    }
    if let Some(row) = db.table_mut(table).sparse_mut::<RecomputeMass>() {
        for i in flagged {
            row.insert(i, RecomputeMass);
        }
    }
}

pub fn flag_new_elements_access() -> AccessSet {
    AccessSet::new().reading::<crate::storage::EventsRow>().writing::<SparseRow<RecomputeMass>>()
}

/// Recomputes `MassProps` for every flagged element and clears the flag —
/// `MassModule.cpp`'s `UpdateMasses`, dispatching on [`ShapeData`]'s tag
/// via [`mass::compute_mass`].
pub fn update_masses(db: &mut Database, table: TableId) {
    let flagged: Vec<u32> = match db.table(table).sparse::<RecomputeMass>() {
        Some(row) => row.iter().map(|(i, _)| *i).collect(),
        None => return,
    };
    for index in flagged {
        let t = db.table(table);
        let shape = t.dense::<ShapeData>().map(|row| row.get(index as usize).clone()).unwrap_or_default();
        let density = t.dense::<Density>().map(|row| row.get(index as usize).0).unwrap_or(1.0);
        let props = compute_mass(&shape, density);

        if let Some(row) = db.table_mut(table).dense_mut::<MassProps>() {
            *row.get_mut(index as usize) = MassProps(props.body);
        }
        if let Some(row) = db.table_mut(table).sparse_mut::<RecomputeMass>() {
            row.0.remove(&index);
        }
    }
}

pub fn update_masses_access() -> AccessSet {
    AccessSet::new()
        .reading::<SparseRow<RecomputeMass>>()
        .reading::<DenseRow<ShapeData>>()
        .writing::<DenseRow<MassProps>>()
}

/// Rebuilds `ClassifiedShape` for every element from its current
/// `ShapeData` and world transform — the per-tick "shape classification
/// into a per-pair frame" step named in spec §4.8.
pub fn classify_shapes(db: &mut Database, table: TableId) {
    let len = db.table(table).len();
    for index in 0..len {
        let t = db.table(table);
        let world = t.dense::<PackedTransform>().map(|r| *r.get(index)).unwrap_or_default();
        let shape = t.dense::<ShapeData>().map(|r| r.get(index).clone()).unwrap_or_default();
        let world_inverse = t
            .sparse::<transform::WorldInverseTransform>()
            .and_then(|r| r.get(index as u32))
            .map(|v| v.0)
            .unwrap_or_else(|| world.inverse());

        if let Some(row) = db.table_mut(table).dense_mut::<ClassifiedShape>() {
            *row.get_mut(index) = ClassifiedShape { data: shape, model_to_world: world, world_to_model: world_inverse };
        }
    }
}

pub fn classify_shapes_access() -> AccessSet {
    AccessSet::new()
        .reading::<DenseRow<PackedTransform>>()
        .reading::<DenseRow<ShapeData>>()
        .writing::<DenseRow<ClassifiedShape>>()
}

fn mesh_world_aabb(mesh: &shapes::Mesh) -> Option<Aabb> {
    if mesh.points.is_empty() {
        return None;
    }
    let first = mesh.model_to_world.transform_point(mesh.points[0]);
    let mut min = first;
    let mut max = first;
    for p in &mesh.points[1..] {
        let wp = mesh.model_to_world.transform_point(*p);
        min.x = min.x.min(wp.x);
        min.y = min.y.min(wp.y);
        max.x = max.x.max(wp.x);
        max.y = max.y.max(wp.y);
    }
    let r = vec2(mesh.radius, mesh.radius);
    Some(Aabb { min: min - r, max: max + r })
}

/// A narrowphase-generated manifold, persisted across ticks under its
/// pair's canonical key. `missed_ticks` counts consecutive ticks broadphase
/// has *not* reported the pair; the manifold survives one full tick of
/// that (spec §3: "destroyed when it does not [report the pair] for one
/// full tick") and is dropped once a second consecutive tick misses it.
struct PersistedManifold {
    a: ElementRef,
    b: ElementRef,
    manifold: ContactManifold,
    missed_ticks: u32,
}

/// Top-level per-tick driver. Owns the state with no single-row home:
/// the broadphase grid, the persistent pair-manifold map (spec §3:
/// manifolds "persist while broadphase reports the pair, destroyed when
/// it does not for one full tick"), and the PGS solver's flat storage.
pub struct PhysicsPipeline {
    grid: BroadphaseGrid,
    handle_to_ref: FxHashMap<u32, ElementRef>,
    manifolds: FxHashMap<(u64, u64), PersistedManifold>,
    solver: PgsSolver,
    narrowphase_ops: NarrowphaseOptions,
    physics_config: PhysicsConfig,
}

impl PhysicsPipeline {
    pub fn new(config: &EngineConfig) -> Self {
        PhysicsPipeline {
            grid: BroadphaseGrid::new(GridConfig::from(config.broadphase)),
            handle_to_ref: FxHashMap::default(),
            manifolds: FxHashMap::default(),
            solver: PgsSolver::new(BLOCK_SIZE, &config.solver),
            narrowphase_ops: NarrowphaseOptions::default(),
            physics_config: config.physics,
        }
    }

    /// Runs one full tick over `table`: mass refresh, transform update,
    /// shape classification, broadphase rebuild, narrowphase, constraint
    /// assembly, PGS solve, velocity integration, event clearing.
    pub fn step(&mut self, db: &mut Database, table: TableId) {
        flag_new_elements(db, table);
        update_masses(db, table);
        transform::update_flagged(db, table);
        classify_shapes(db, table);
        self.sync_broadphase(db, table);
        self.run_narrowphase(db, table);
        self.assemble_and_solve(db, table);
        self.integrate_velocities(db, table);
        db.clear_all_events();
    }

    fn sync_broadphase(&mut self, db: &mut Database, table: TableId) {
        let len = db.table(table).len();
        for index in 0..len {
            let aabb = db
                .table(table)
                .dense::<ClassifiedShape>()
                .and_then(|r| mesh_world_aabb(&r.get(index).to_mesh()));
            let current = db.table(table).dense::<BroadphaseHandle>().map(|r| r.get(index).0).unwrap_or(None);

            match (current, aabb) {
                (None, Some(a)) => {
                    let key = self.grid.insert(a);
                    let r = db.table(table).stable_ref(index);
                    self.handle_to_ref.insert(key.raw(), r);
                    if let Some(row) = db.table_mut(table).dense_mut::<BroadphaseHandle>() {
                        *row.get_mut(index) = BroadphaseHandle(Some(key));
                    }
                }
                (Some(key), Some(a)) => self.grid.update(key, a),
                (Some(key), None) => {
                    self.grid.remove(key);
                    self.handle_to_ref.remove(&key.raw());
                    if let Some(row) = db.table_mut(table).dense_mut::<BroadphaseHandle>() {
                        *row.get_mut(index) = BroadphaseHandle(None);
                    }
                }
                (None, None) => {}
            }
        }
    }

    fn run_narrowphase(&mut self, db: &Database, table: TableId) {
        let pairs = self.grid.enumerate_pairs();
        let mut seen_this_tick: std::collections::HashSet<(u64, u64)> = std::collections::HashSet::new();

        for (ka, kb) in pairs {
            let (ra, rb) = match (self.handle_to_ref.get(&ka.raw()), self.handle_to_ref.get(&kb.raw())) {
                (Some(a), Some(b)) => (*a, *b),
                _ => continue,
            };
            let (lo, hi) = if ra.to_bits() < rb.to_bits() { (ra, rb) } else { (rb, ra) };
            let key = (lo.to_bits(), hi.to_bits());
            seen_this_tick.insert(key);

            let mesh_of = |r: ElementRef| -> Option<shapes::Mesh> {
                let loc = db.resolver().try_unpack(r)?;
                db.table(loc.table).dense::<ClassifiedShape>().map(|row| row.get(loc.index as usize).to_mesh())
            };
            if let (Some(mesh_a), Some(mesh_b)) = (mesh_of(lo), mesh_of(hi)) {
                let manifold = generate_contacts_convex(&mesh_a, &mesh_b, &self.narrowphase_ops);
                self.manifolds.insert(key, PersistedManifold { a: lo, b: hi, manifold, missed_ticks: 0 });
            }
        }

        for (key, entry) in self.manifolds.iter_mut() {
            if seen_this_tick.contains(key) {
                entry.missed_ticks = 0;
            } else {
                entry.missed_ticks += 1;
            }
        }
        self.manifolds.retain(|_, entry| entry.missed_ticks <= 1);
        let _ = table;
    }

    /// Builds one normal (non-penetration) constraint per contact point
    /// and runs the solver. Bias is a direct Baumgarte-style fraction of
    /// the overlap rather than a rate divided by a timestep, since this
    /// pipeline has no notion of tick duration of its own — callers after
    /// integration are expected to apply their own fixed-step scale.
    fn assemble_and_solve(&mut self, db: &mut Database, table: TableId) {
        const BAUMGARTE_BETA: f32 = 0.2;

        let bodies = db.table(table).len();
        let constraint_count: usize = self.manifolds.values().map(|entry| entry.manifold.points.len()).sum();
        self.solver.resize(bodies, constraint_count);

        for index in 0..bodies {
            let mass = db.table(table).dense::<MassProps>().map(|r| r.get(index).0).unwrap_or_default();
            self.solver.set_mass(index as u32, &[mass.inverse_mass, mass.inverse_mass, mass.inverse_inertia]);
            let vel = db.table(table).dense::<Velocity>().map(|r| *r.get(index)).unwrap_or_default();
            self.solver.set_velocity(index as u32, &[vel.linear.x, vel.linear.y, vel.angular]);
        }

        let mut constraint = 0u32;
        for entry in self.manifolds.values() {
            let (loc_a, loc_b) = match (db.resolver().try_unpack(entry.a), db.resolver().try_unpack(entry.b)) {
                (Some(a), Some(b)) if a.table == table && b.table == table => (a, b),
                _ => continue,
            };
            let center_a = db.table(table).dense::<ClassifiedShape>().map(|r| r.get(loc_a.index as usize).model_to_world.pos2()).unwrap_or_default();
            let center_b = db.table(table).dense::<ClassifiedShape>().map(|r| r.get(loc_b.index as usize).model_to_world.pos2()).unwrap_or_default();

            for point in &entry.manifold.points {
                let n = point.normal;
                let r_a = point.center_to_contact_a;
                let contact_world = center_a + r_a;
                let r_b = contact_world - center_b;

                let row_a = [-n.x, -n.y, -cross(r_a, n)];
                let row_b = [n.x, n.y, cross(r_b, n)];
                self.solver.set_jacobian(constraint, loc_a.index, loc_b.index, &row_a, &row_b);
                self.solver.set_bias(constraint, point.overlap.max(0.0) * BAUMGARTE_BETA);
                self.solver.set_lambda_bounds(constraint, 0.0, f32::MAX);
                constraint += 1;
            }
        }

        self.solver.premultiply();
        self.solver.solve_pgs();
    }

    fn integrate_velocities(&mut self, db: &mut Database, table: TableId) {
        let len = db.table(table).len();
        for index in 0..len {
            let v = self.solver.velocity(index as u32);
            let mut vel = Velocity { linear: vec2(v[0], v[1]), angular: v[2] };
            vel.linear = vel.linear * self.physics_config.linear_drag_multiplier;
            vel.angular *= self.physics_config.angular_drag_multiplier;
            if let Some(row) = db.table_mut(table).dense_mut::<Velocity>() {
                *row.get_mut(index) = vel;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TableBuilder;

    fn setup() -> (Database, TableId) {
        let db = Database::new();
        let mut db = db;
        let table = db.create_table(
            "bodies",
            TableBuilder::new()
                .with_events()
                .with_dense::<PackedTransform>()
                .with_dense::<ShapeData>()
                .with_dense::<Density>()
                .with_dense::<ClassifiedShape>()
                .with_dense::<MassProps>()
                .with_dense::<Velocity>()
                .with_dense::<BroadphaseHandle>()
                .with_sparse::<RecomputeMass>()
                .with_sparse::<transform::WorldInverseTransform>()
                .with_sparse::<transform::TransformNeedsUpdate>()
                .with_sparse::<transform::TransformHasUpdated>(),
        );
        (db, table)
    }

    fn put_box(db: &mut Database, table: TableId, x: f32) -> ElementRef {
        let r = db.add_element(table).unwrap();
        let loc = db.resolver().try_unpack(r).unwrap();
        *db.table_mut(table).dense_mut::<PackedTransform>().unwrap().get_mut(loc.index as usize) =
            PackedTransform::build(crate::math::Parts { translate: vec2(x, 0.0), ..Default::default() });
        *db.table_mut(table).dense_mut::<ShapeData>().unwrap().get_mut(loc.index as usize) =
            ShapeData::Rectangle { half_extents: vec2(0.5, 0.5) };
        r
    }

    #[test]
    fn newly_created_elements_get_a_nonzero_mass_after_one_step() {
        let (mut db, table) = setup();
        let config = EngineConfig::default();
        let mut pipeline = PhysicsPipeline::new(&config);
        let r = put_box(&mut db, table, 0.0);

        pipeline.step(&mut db, table);

        let loc = db.resolver().try_unpack(r).unwrap();
        let props = db.table(table).dense::<MassProps>().unwrap().get(loc.index as usize);
        assert!(props.0.inverse_mass > 0.0);
    }

    #[test]
    fn overlapping_bodies_gain_a_persisted_manifold_that_survives_one_missed_tick_before_clearing() {
        let (mut db, table) = setup();
        let config = EngineConfig::default();
        let mut pipeline = PhysicsPipeline::new(&config);
        let a = put_box(&mut db, table, 0.0);
        let b = put_box(&mut db, table, 0.9);

        pipeline.step(&mut db, table);
        assert!(!pipeline.manifolds.is_empty());

        let loc_b = db.resolver().try_unpack(b).unwrap();
        *db.table_mut(table).dense_mut::<PackedTransform>().unwrap().get_mut(loc_b.index as usize) =
            PackedTransform::build(crate::math::Parts { translate: vec2(100.0, 0.0), ..Default::default() });

        pipeline.step(&mut db, table);
        assert!(!pipeline.manifolds.is_empty(), "a manifold should survive one full tick of not being reported");

        pipeline.step(&mut db, table);
        assert!(pipeline.manifolds.is_empty(), "and clear once a second consecutive tick misses it");
        let _ = a;
    }
}
