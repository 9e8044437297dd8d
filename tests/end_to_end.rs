use dof::math::{vec2, PackedTransform, Parts};
use dof::physics::narrowphase::{generate_contacts_convex, NarrowphaseOptions};
use dof::physics::shapes::Mesh;
use dof::physics::solver::PgsSolver;
use dof::scheduler::graph::{AccessSet, TaskGraph};
use dof::storage::TableBuilder;
use dof::Database;

fn quad(center: (f32, f32), half: f32) -> Mesh {
    let points = vec![
        vec2(-half, -half),
        vec2(half, -half),
        vec2(half, half),
        vec2(-half, half),
    ];
    let t = PackedTransform::build(Parts { translate: vec2(center.0, center.1), ..Default::default() });
    Mesh { points, radius: 0.0, model_to_world: t, world_to_model: t.inverse() }
}

fn circle(center: (f32, f32), radius: f32) -> Mesh {
    use dof::physics::shapes::{ClassifiedShape, ShapeData};
    let t = PackedTransform::build(Parts { translate: vec2(center.0, center.1), ..Default::default() });
    let shape = ClassifiedShape { data: ShapeData::Circle { radius }, model_to_world: t, world_to_model: t.inverse() };
    shape.to_mesh()
}

#[test]
fn quad_quad_non_touching_has_no_contacts() {
    let eps = 0.01;
    let a = quad((0.0, 0.0), 0.5);
    let b = quad((1.0 + eps, 0.0), 0.5);
    let manifold = generate_contacts_convex(&a, &b, &NarrowphaseOptions::default());
    assert_eq!(manifold.points.len(), 0);
}

#[test]
fn quad_quad_face_contact_has_two_points_near_the_shared_edge() {
    let eps = 0.01;
    let a = quad((0.0, 0.0), 0.5);
    let b = quad((1.0 - eps, 0.0), 0.5);
    let manifold = generate_contacts_convex(&a, &b, &NarrowphaseOptions::default());
    assert_eq!(manifold.points.len(), 2);

    for point in &manifold.points {
        assert!(point.normal.x < -0.9, "normal should point toward A: {:?}", point.normal);
        let world_y = point.center_to_contact_a.y;
        assert!((world_y.abs() - 0.5).abs() < 0.05, "contact y should sit near +-0.5: {}", world_y);
    }
}

#[test]
fn circle_circle_near_produces_a_small_manifold() {
    let eps = 0.01;
    let offset = (2.0 - eps) * std::f32::consts::FRAC_1_SQRT_2;
    let a = circle((0.0, 0.0), 1.0);
    let b = circle((offset, offset), 1.0);
    let manifold = generate_contacts_convex(&a, &b, &NarrowphaseOptions::default());

    assert!(!manifold.points.is_empty(), "near-touching circles should produce at least one contact");
    assert!(manifold.points.len() <= 2);
    for point in &manifold.points {
        assert!(point.overlap > -0.05, "overlap should be close to zero or positive: {}", point.overlap);
    }
}

#[test]
fn solver_one_constraint_kills_the_approaching_relative_velocity() {
    let config = dof::config::SolverConfig::default();
    let mut solver = PgsSolver::new(1, &config);
    solver.resize(2, 1);
    solver.set_mass(0, &[1.0]);
    solver.set_mass(1, &[1.0]);
    solver.set_velocity(0, &[1.0]);
    solver.set_velocity(1, &[0.0]);
    solver.set_jacobian(0, 0, 1, &[-1.0], &[1.0]);
    solver.set_bias(0, 0.0);
    solver.set_lambda_bounds(0, 0.0, f32::MAX);
    solver.premultiply();

    let result = solver.solve_pgs();
    assert!(result.is_finished);

    let va = solver.velocity(0)[0];
    let vb = solver.velocity(1)[0];
    let relative = vb - va;
    assert!(relative.abs() < 1e-3, "relative velocity along the constraint axis should collapse to ~0, got {}", relative);
}

#[test]
fn table_swap_remove_keeps_the_stable_row_consistent() {
    #[derive(Clone, Debug, Default)]
    struct Tag(u32);

    let mut db = Database::new();
    let table = db.create_table("items", TableBuilder::new().with_dense::<Tag>());
    let r0 = db.add_element(table).unwrap();
    let r1 = db.add_element(table).unwrap();
    let r2 = db.add_element(table).unwrap();

    db.remove_ref(r1);

    let loc0 = db.resolver().try_unpack(r0).unwrap();
    assert_eq!(loc0.index, 0);
    assert!(db.resolver().try_unpack(r1).is_none());
    let loc2 = db.resolver().try_unpack(r2).unwrap();
    assert_eq!(loc2.index, 1);
    assert_eq!(db.table(table).stable_ref(1), r2);
}

#[test]
fn scheduler_orders_the_reader_after_the_writer_but_frees_the_unrelated_writer() {
    struct RowR;
    struct RowS;

    let graph = TaskGraph::build(vec![
        ("t1_writes_r", AccessSet::new().writing::<RowR>()),
        ("t2_reads_r", AccessSet::new().reading::<RowR>()),
        ("t3_writes_s", AccessSet::new().writing::<RowS>()),
    ]);

    assert_eq!(graph.dependency_count(1), 1);
    assert!(graph.dependants(0).contains(&1));

    assert_eq!(graph.dependency_count(2), 0);
    let roots = graph.roots();
    assert!(roots.contains(&0));
    assert!(roots.contains(&2));
}
