//! Mass & inertia computation (spec §4.8, grounded on `dof/physics/Mass.cpp`
//! and `dof/physics/module/MassModule.cpp`). The source dispatches per
//! shape through a `std::visit` over `ComputeMass`; per spec §9's
//! "polymorphic shapes via visitor" REDESIGN FLAG this is a match over
//! [`crate::physics::shapes::ShapeData`] instead.
//!
//! Formulas are carried over verbatim: the capsule's box2d-derived
//! parallel-axis decomposition (half-circle-plus-box), the shoelace/
//! triangle-fan integration for a general convex mesh, and the standard
//! quad/circle closed forms the mesh case falls back to for 1- and
//! 2-point inputs.

use crate::math::geo::{cross, inverse_or_zero};
use crate::math::{vec2, Vec2};
use crate::physics::shapes::ShapeData;

const PI: f32 = std::f32::consts::PI;

/// Linear + angular inverse-mass pair used directly by the solver's mass
/// block (spec §3 "Constraint row set").
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Body {
    pub inverse_mass: f32,
    pub inverse_inertia: f32,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct MassProps {
    pub center_of_mass: Vec2,
    pub body: Body,
}

/// Converts raw mass/inertia (as accumulated by area integrals) into
/// their inverses, treating a non-positive value as infinite mass (zero
/// inverse) rather than dividing by zero.
fn invert(mass: f32, inertia: f32, center_of_mass: Vec2) -> MassProps {
    MassProps {
        center_of_mass,
        body: Body { inverse_mass: inverse_or_zero(mass), inverse_inertia: inverse_or_zero(inertia) },
    }
}

pub fn compute_circle_mass(radius: f32, density: f32) -> MassProps {
    let mass = PI * radius * radius * density;
    let inertia = 0.5 * mass * radius * radius;
    invert(mass, inertia, vec2(0.0, 0.0))
}

pub fn compute_capsule_mass(top: Vec2, bottom: Vec2, radius: f32, density: f32) -> MassProps {
    let r2 = radius * radius;
    let top_to_bottom = bottom - top;
    let length = (top_to_bottom.x * top_to_bottom.x + top_to_bottom.y * top_to_bottom.y).sqrt();
    let l2 = length * length;
    let circle_mass = PI * r2 * density;
    let box_mass = 2.0 * radius * length * density;

    let mass = circle_mass + box_mass;
    let center_of_mass = top + top_to_bottom * 0.5;

    let half_circle_centroid = (4.0 * radius) / (3.0 * PI);
    let half_length = length * 0.5;
    let circle_inertia = circle_mass * (0.5 * r2 + half_length * half_length + 2.0 * half_length * half_circle_centroid);
    let box_inertia = box_mass * (4.0 * r2 + l2) / 12.0;

    invert(mass, circle_inertia + box_inertia, center_of_mass)
}

pub fn compute_quad_mass(full_size: Vec2, density: f32) -> MassProps {
    let mass = full_size.x * full_size.y * density;
    let inertia = mass * (full_size.x * full_size.x + full_size.y * full_size.y) / 12.0;
    invert(mass, inertia, vec2(0.0, 0.0))
}

pub fn compute_triangle_mass(a: Vec2, b: Vec2, c: Vec2, density: f32) -> MassProps {
    let edge_a = b - a;
    let edge_b = c - a;
    let determinant = cross(edge_a, edge_b);
    let area = determinant * 0.5;
    let third = 1.0 / 3.0;
    let center_of_mass = (a + b + c) * third;
    let mass = area * density;

    let ca = a - center_of_mass;
    let cb = b - center_of_mass;
    let cc = c - center_of_mass;
    let sixth = 1.0 / 6.0;
    let dot = |u: Vec2, v: Vec2| u.x * v.x + u.y * v.y;
    let inertia = mass
        * sixth
        * (dot(ca, ca) + dot(cb, cb) + dot(cc, cc) + dot(ca, cb) + dot(cb, cc) + dot(cc, ca));

    invert(mass, inertia, center_of_mass)
}

/// General convex polygon (CCW-wound, `points.len() >= 3`), via
/// triangle-fan integration from the first point — `Mass::computeMeshMass`'s
/// general case. 0 and 1 points fall back to circle/capsule per the
/// source's switch on `mesh.count`; `points.len() == 2` likewise falls back
/// to a capsule through its two endpoints.
pub fn compute_mesh_mass(points: &[Vec2], radius: f32, density: f32) -> MassProps {
    match points.len() {
        0 => MassProps::default(),
        1 => compute_circle_mass(radius, density),
        2 => compute_capsule_mass(points[0], points[1], radius, density),
        _ => compute_polygon_mass(points, density),
    }
}

fn compute_polygon_mass(points: &[Vec2], density: f32) -> MassProps {
    let reference = points[0];
    let third = 1.0 / 3.0;

    let mut mass = 0.0f32;
    let mut inertia = 0.0f32;
    let mut center = vec2(0.0, 0.0);

    for i in 1..points.len() - 1 {
        let edge_a = points[i] - reference;
        let edge_b = points[i + 1] - reference;
        let determinant = cross(edge_a, edge_b);

        let triangle_area = determinant * 0.5;
        mass += triangle_area;
        center = center + (edge_a + edge_b) * (triangle_area * third);

        let integral = |a: f32, b: f32| a * a + a * b + b * b;
        let integral_x = integral(edge_a.x, edge_b.x);
        let integral_y = integral(edge_a.y, edge_b.y);
        inertia += (0.25 * third * determinant) * (integral_x + integral_y);
    }

    let inverse_area = inverse_or_zero(mass);
    center = center * inverse_area;
    let center_of_mass = center + reference;

    mass *= density;
    inertia *= density;
    inertia -= mass * (center.x * center.x + center.y * center.y);

    invert(mass, inertia, center_of_mass)
}

/// Dispatches on the shape's tag (spec §9: "replace visitor with a
/// tagged-variant match").
pub fn compute_mass(shape: &ShapeData, density: f32) -> MassProps {
    match shape {
        ShapeData::Circle { radius } => compute_circle_mass(*radius, density),
        ShapeData::Capsule { top, bottom, radius } => compute_capsule_mass(*top, *bottom, *radius, density),
        ShapeData::Rectangle { half_extents } | ShapeData::Aabb { half_extents } => {
            compute_quad_mass(*half_extents * 2.0, density)
        }
        ShapeData::Mesh { points, radius } => compute_mesh_mass(points, *radius, density),
        ShapeData::Raycast { .. } | ShapeData::None => MassProps::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_inverse_mass_matches_closed_form() {
        let m = compute_circle_mass(1.0, 1.0);
        let expected_mass = PI;
        assert!((m.body.inverse_mass - 1.0 / expected_mass).abs() < 1e-5);
    }

    #[test]
    fn unit_square_quad_has_unit_mass() {
        let m = compute_quad_mass(vec2(1.0, 1.0), 1.0);
        assert!((m.body.inverse_mass - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_area_shape_reports_infinite_mass() {
        let m = compute_triangle_mass(vec2(0.0, 0.0), vec2(0.0, 0.0), vec2(0.0, 0.0), 1.0);
        assert_eq!(m.body.inverse_mass, 0.0);
    }

    #[test]
    fn square_mesh_matches_quad_mass() {
        let half = 0.5;
        let points = [vec2(-half, -half), vec2(half, -half), vec2(half, half), vec2(-half, half)];
        let mesh = compute_mesh_mass(&points, 0.0, 1.0);
        let quad = compute_quad_mass(vec2(1.0, 1.0), 1.0);
        assert!((mesh.body.inverse_mass - quad.body.inverse_mass).abs() < 1e-4);
    }
}
