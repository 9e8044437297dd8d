//! Small 2D vector helpers used by narrowphase and mass computation.
//! Grounded on the free functions in the original `Geo` namespace
//! (`Geometric.h`): orthogonal, cross, and the "or a safe default" helpers
//! that keep degenerate geometry from dividing by zero.

pub type Vec2 = cgmath::Vector2<f32>;

pub fn vec2(x: f32, y: f32) -> Vec2 {
    cgmath::Vector2::new(x, y)
}

/// Counterclockwise-winding outward normal of the vector `v` (rotate -90°).
pub fn orthogonal(v: Vec2) -> Vec2 {
    vec2(v.y, -v.x)
}

pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// `v` rotated 90° CCW; used when deriving an edge normal from an edge
/// vector in the mesh-radius expansion step of mass computation.
pub fn cross_z(v: Vec2) -> Vec2 {
    vec2(-v.y, v.x)
}

pub fn normalized_or_zero(v: Vec2) -> Vec2 {
    let len = (v.x * v.x + v.y * v.y).sqrt();
    if len > f32::EPSILON {
        v / len
    } else {
        vec2(0.0, 0.0)
    }
}

pub fn divide_or(v: Vec2, denom: f32, fallback: Vec2) -> Vec2 {
    if denom.abs() > f32::EPSILON {
        v / denom
    } else {
        fallback
    }
}

pub fn inverse_or_zero(v: f32) -> f32 {
    if v.abs() > f32::EPSILON {
        1.0 / v
    } else {
        0.0
    }
}

/// Preserves `magnitude`'s sign onto `value` — used when a recomputed
/// vector length must carry the separating/penetrating sign of the
/// original (possibly negative) scalar distance it replaces.
pub fn make_same_sign(magnitude: f32, sign_of: f32) -> f32 {
    if sign_of < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

#[derive(Copy, Clone, Debug)]
pub struct LineSegment {
    pub start: Vec2,
    pub end: Vec2,
}
