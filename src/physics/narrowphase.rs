//! Convex-mesh narrowphase (spec §3 "Contact manifold", §4.6, component
//! C6).
//!
//! Grounded directly on `dof/physics/MeshNarrowphase.cpp`:
//! `find_furthest_edge_on` mirrors `findFurthestEdgeOnA` (support mapping
//! against the opposing mesh transformed into the tested mesh's frame,
//! tracking the most-separating edge with an `edge_epsilon` length floor
//! and an `edge_epsilon` bias toward A when picking the reference side).
//! The edge-clip itself (`clipEdgeToEdge` in the source, not present in
//! the filtered `original_source/` tree) is the standard two-plane
//! Sutherland-Hodgman clip against the reference edge's side planes,
//! implemented here from spec §4.6 step 5's description directly.

use crate::math::geo::{orthogonal, make_same_sign, divide_or, LineSegment};
use crate::math::{vec2, Vec2};
use crate::physics::shapes::Mesh;

#[derive(Clone, Copy, Debug)]
pub struct NarrowphaseOptions {
    /// Model-space threshold below which an edge's normal is treated as
    /// degenerate and skipped.
    pub edge_epsilon: f32,
    /// Distance beyond which a pair is not considered touching.
    pub no_collision_distance: f32,
}

impl Default for NarrowphaseOptions {
    fn default() -> Self {
        NarrowphaseOptions { edge_epsilon: 0.00001, no_collision_distance: 0.0 }
    }
}

/// Up to 4 contact points between two shapes (spec §3 "Contact
/// manifold").
#[derive(Clone, Debug, Default)]
pub struct ContactManifold {
    pub points: Vec<ContactPoint>,
}

pub const MAX_CONTACT_POINTS: usize = 4;

#[derive(Clone, Copy, Debug)]
pub struct ContactPoint {
    /// Offset from A's centre to the contact, in world space.
    pub center_to_contact_a: Vec2,
    /// Outward normal, pointing from B toward A.
    pub normal: Vec2,
    /// Positive when penetrating.
    pub overlap: f32,
}

struct SupportPoint {
    min_distance: f32,
    index: usize,
}

fn support_point(direction: Vec2, mesh: &Mesh) -> SupportPoint {
    let mut result = SupportPoint { min_distance: f32::MAX, index: 0 };
    for (i, p) in mesh.points.iter().enumerate() {
        let d = direction.x * p.x + direction.y * p.y;
        if d < result.min_distance {
            result.min_distance = d;
            result.index = i;
        }
    }
    result
}

struct FurthestEdge {
    reference_edge: usize,
    incident_point: usize,
    normal_world: Vec2,
    distance_along_normal: f32,
}

/// Searches A's edges (transformed into B's local frame) for the one
/// whose outward normal separates the two meshes the most — mirrors
/// `findFurthestEdgeOnA` exactly, including the "beginInB -> endInB"
/// walk over the CCW-wound point list.
fn find_furthest_edge_on(a: &Mesh, b: &Mesh, ops: &NarrowphaseOptions) -> FurthestEdge {
    let mut result = FurthestEdge {
        reference_edge: 0,
        incident_point: 0,
        normal_world: vec2(0.0, 0.0),
        distance_along_normal: f32::MIN,
    };
    if a.points.is_empty() {
        return result;
    }

    let a_to_b = b.world_to_model * a.model_to_world;
    let n = a.points.len();
    let mut begin_in_b = a_to_b.transform_point(a.points[n - 1]);
    for e in 0..n {
        let end_in_b = a_to_b.transform_point(a.points[e]);
        let mut normal_in_b = orthogonal(end_in_b - begin_in_b);
        let length = (normal_in_b.x * normal_in_b.x + normal_in_b.y * normal_in_b.y).sqrt();
        if length > ops.edge_epsilon {
            normal_in_b = normal_in_b / length;

            let support_b = support_point(normal_in_b, b);
            let support_a = normal_in_b.x * end_in_b.x + normal_in_b.y * end_in_b.y;
            let a_to_b_distance = support_b.min_distance - support_a;
            if a_to_b_distance > result.distance_along_normal {
                result.distance_along_normal = a_to_b_distance;
                result.reference_edge = e;
                result.incident_point = support_b.index;
                result.normal_world = normal_in_b;
            }
        }
        begin_in_b = end_in_b;
    }

    result.normal_world = result.normal_world * result.distance_along_normal.abs();
    result.normal_world = b.model_to_world.transform_vector(result.normal_world);
    let normal_length = (result.normal_world.x * result.normal_world.x + result.normal_world.y * result.normal_world.y).sqrt();
    result.distance_along_normal = make_same_sign(normal_length, result.distance_along_normal);
    result.normal_world = divide_or(result.normal_world, normal_length, vec2(1.0, 0.0));
    result
}

fn wrapped_decrement(index: usize, len: usize) -> usize {
    if index == 0 { len - 1 } else { index - 1 }
}

fn wrapped_increment(index: usize, len: usize) -> usize {
    if index + 1 == len { 0 } else { index + 1 }
}

fn reference_segment(index: usize, mesh: &Mesh) -> LineSegment {
    let len = mesh.points.len();
    LineSegment {
        start: mesh.model_to_world.transform_point(mesh.points[index]),
        end: mesh.model_to_world.transform_point(mesh.points[wrapped_decrement(index, len)]),
    }
}

fn incident_segment(index: usize, reference_normal: Vec2, mesh: &Mesh) -> LineSegment {
    let len = mesh.points.len();
    let root = mesh.model_to_world.transform_point(mesh.points[index]);
    let a = mesh.model_to_world.transform_point(mesh.points[wrapped_increment(index, len)]);
    let b = mesh.model_to_world.transform_point(mesh.points[wrapped_decrement(index, len)]);
    let edge_a = normalize(root - a);
    let edge_b = normalize(root - b);
    if (reference_normal.x * edge_a.x + reference_normal.y * edge_a.y).abs()
        < (reference_normal.x * edge_b.x + reference_normal.y * edge_b.y).abs()
    {
        LineSegment { start: a, end: root }
    } else {
        LineSegment { start: b, end: root }
    }
}

fn normalize(v: Vec2) -> Vec2 {
    let len = (v.x * v.x + v.y * v.y).sqrt();
    if len > f32::EPSILON { v / len } else { vec2(0.0, 0.0) }
}

/// Clips `incident` against `reference`'s side planes and keeps the
/// points on the negative (penetrating) side of the reference face
/// plane — spec §4.6 step 5.
fn clip_edge_to_edge(normal: Vec2, reference: LineSegment, incident: LineSegment) -> Vec<Vec2> {
    let tangent = normalize(reference.end - reference.start);
    if tangent.x == 0.0 && tangent.y == 0.0 {
        return Vec::new();
    }
    let offset_start = -(tangent.x * reference.start.x + tangent.y * reference.start.y);
    let offset_end = tangent.x * reference.end.x + tangent.y * reference.end.y;

    let points = match clip_segment(incident.start, incident.end, -tangent, offset_start) {
        Some(p) => p,
        None => return Vec::new(),
    };
    let (p0, p1) = points;
    let points = match clip_segment(p0, p1, tangent, offset_end) {
        Some(p) => p,
        None => return Vec::new(),
    };

    let mut result = Vec::with_capacity(2);
    for p in [points.0, points.1] {
        let separation = normal.x * (p.x - reference.start.x) + normal.y * (p.y - reference.start.y);
        if separation <= 0.0 {
            result.push(p);
        }
    }
    result
}

/// Clips segment `(a,b)` against the half-plane `dot(n, p) + offset <=
/// 0`, returning the clipped endpoints, or `None` if the whole segment
/// lies outside the plane.
fn clip_segment(a: Vec2, b: Vec2, n: Vec2, offset: f32) -> Option<(Vec2, Vec2)> {
    let da = n.x * a.x + n.y * a.y + offset;
    let db = n.x * b.x + n.y * b.y + offset;
    if da <= 0.0 && db <= 0.0 {
        return Some((a, b));
    }
    if da > 0.0 && db > 0.0 {
        return None;
    }
    let t = da / (da - db);
    let clipped = vec2(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y));
    if da > 0.0 {
        Some((clipped, b))
    } else {
        Some((a, clipped))
    }
}

/// Convex mesh vs convex mesh contact generation (spec §4.6).
pub fn generate_contacts_convex(a: &Mesh, b: &Mesh, ops: &NarrowphaseOptions) -> ContactManifold {
    if a.points.is_empty() || b.points.is_empty() {
        return ContactManifold::default();
    }

    let best_a = find_furthest_edge_on(a, b, ops);
    let best_b = find_furthest_edge_on(b, a, ops);

    let (reference, incident, normal, is_on_a) = if best_a.distance_along_normal + ops.edge_epsilon > best_b.distance_along_normal {
        let normal = best_a.normal_world;
        let reference = reference_segment(best_a.reference_edge, a);
        let incident = incident_segment(best_a.incident_point, normal, b);
        (reference, incident, normal, true)
    } else {
        let normal = best_b.normal_world;
        let reference = reference_segment(best_b.reference_edge, b);
        let incident = incident_segment(best_b.incident_point, normal, a);
        (reference, incident, normal, false)
    };

    let clipped = clip_edge_to_edge(normal, reference, incident);
    let radius_offset = a.radius + b.radius;
    // `normal` points away from whichever body supplied the reference edge.
    // The manifold convention is the opposite: from B toward A.
    let normal_toward_a = if is_on_a { vec2(-normal.x, -normal.y) } else { normal };
    let center_a = a.model_to_world.pos2();

    let mut points = Vec::with_capacity(clipped.len().min(MAX_CONTACT_POINTS));
    for p in clipped.into_iter().take(MAX_CONTACT_POINTS) {
        let separation = normal.x * (p.x - reference.start.x) + normal.y * (p.y - reference.start.y);
        let overlap = -separation + radius_offset;
        if overlap < -ops.no_collision_distance {
            continue;
        }
        // Shift the clipped point outward along the reference normal by the
        // combined rounding radius (spec §4.6: "radius offset ... added as a
        // post-step to shift contacts outward").
        let contact_point = vec2(p.x + normal.x * radius_offset, p.y + normal.y * radius_offset);
        points.push(ContactPoint {
            center_to_contact_a: contact_point - center_a,
            normal: normal_toward_a,
            overlap,
        });
    }

    ContactManifold { points }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{PackedTransform, Parts};

    fn quad(center: Vec2, half: Vec2) -> Mesh {
        let points = vec![
            vec2(-half.x, -half.y),
            vec2(half.x, -half.y),
            vec2(half.x, half.y),
            vec2(-half.x, half.y),
        ];
        let t = PackedTransform::build(Parts { translate: center, ..Default::default() });
        Mesh { points, radius: 0.0, model_to_world: t, world_to_model: t.inverse() }
    }

    #[test]
    fn non_touching_quads_produce_no_contacts() {
        let half = vec2(0.5, 0.5);
        let eps = 0.01;
        let a = quad(vec2(0.0, 0.0), half);
        let b = quad(vec2(1.0 + eps, 0.0), half);
        let m = generate_contacts_convex(&a, &b, &NarrowphaseOptions::default());
        assert_eq!(m.points.len(), 0);
    }

    #[test]
    fn overlapping_quads_produce_two_face_contacts() {
        let half = vec2(0.5, 0.5);
        let eps = 0.01;
        let a = quad(vec2(0.0, 0.0), half);
        let b = quad(vec2(1.0 - eps, 0.0), half);
        let m = generate_contacts_convex(&a, &b, &NarrowphaseOptions::default());
        assert_eq!(m.points.len(), 2);
        for p in &m.points {
            assert!(p.normal.x < 0.0, "normal should point from B toward A: {:?}", p.normal);
        }
    }

    #[test]
    fn empty_mesh_produces_no_contacts() {
        let a = Mesh { points: vec![], radius: 0.0, model_to_world: PackedTransform::default(), world_to_model: PackedTransform::default() };
        let b = quad(vec2(0.0, 0.0), vec2(0.5, 0.5));
        let m = generate_contacts_convex(&a, &b, &NarrowphaseOptions::default());
        assert_eq!(m.points.len(), 0);
    }
}
