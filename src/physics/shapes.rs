//! Shape registry (spec §3 "Shape registry", §4.6, §9 REDESIGN FLAGS).
//!
//! The source dispatches per-shape behavior through a visitor over a
//! polymorphic `ShapeRegistry` interface. Per spec §9's first REDESIGN
//! FLAG this is replaced with a closed tagged-variant [`ShapeData`] and a
//! match — no virtual dispatch. Every variant reduces to a [`Mesh`] (a
//! convex polygon plus a rounding radius) for narrowphase, the same
//! reduction the original performs for circles/capsules in its mass and
//! contact generation paths (see `dof/test/MeshNarrowphaseTest.cpp`'s
//! `pushCircle`, which approximates a circle as a many-sided polygon
//! before handing it to the identical convex-mesh algorithm).

use crate::math::{vec2, PackedTransform, Vec2};

/// Number of polygon sides used to approximate a circle when it is
/// reduced to its mesh equivalent. High enough that narrowphase against
/// a circle behaves like the source's 100-point test fixture without
/// paying that fixture's cost on every tick.
pub const CIRCLE_SEGMENTS: usize = 24;

/// The closed set of shape kinds named in spec §3.
#[derive(Clone, Debug)]
pub enum ShapeData {
    Circle { radius: f32 },
    Capsule { top: Vec2, bottom: Vec2, radius: f32 },
    Rectangle { half_extents: Vec2 },
    Aabb { half_extents: Vec2 },
    Mesh { points: Vec<Vec2>, radius: f32 },
    Raycast { direction: Vec2 },
    None,
}

impl Default for ShapeData {
    fn default() -> Self {
        ShapeData::None
    }
}

/// A classified shape plus its cached world transform pair, as produced
/// by the shape registry at classification time (spec §3).
#[derive(Clone, Debug, Default)]
pub struct ClassifiedShape {
    pub data: ShapeData,
    pub model_to_world: PackedTransform,
    pub world_to_model: PackedTransform,
}

/// Convex polygon in model space, CCW wound, plus a rounding radius —
/// the common form every shape reduces to before narrowphase runs
/// (spec §4.6: "other shapes are reduced to their mesh equivalent at
/// classification").
#[derive(Clone, Debug)]
pub struct Mesh {
    pub points: Vec<Vec2>,
    pub radius: f32,
    pub model_to_world: PackedTransform,
    pub world_to_model: PackedTransform,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl ClassifiedShape {
    /// Reduces `self` to its mesh equivalent. `Raycast` and `None` have
    /// no area and reduce to an empty mesh, matching the "empty mesh ->
    /// no contacts" edge case in spec §4.6.
    pub fn to_mesh(&self) -> Mesh {
        let points = match &self.data {
            // Circle vertices are placed directly on the true boundary, so
            // the polygon alone fully represents the shape; no additional
            // radius offset is needed (unlike a capsule or generic rounded
            // mesh, where the stored points are a *core* shape).
            ShapeData::Circle { radius } => circle_points(CIRCLE_SEGMENTS, *radius),
            ShapeData::Capsule { top, bottom, .. } => vec![*top, *bottom],
            ShapeData::Rectangle { half_extents } | ShapeData::Aabb { half_extents } => {
                rectangle_points(*half_extents)
            }
            ShapeData::Mesh { points, .. } => points.clone(),
            ShapeData::Raycast { .. } | ShapeData::None => Vec::new(),
        };
        let radius = match &self.data {
            ShapeData::Capsule { radius, .. } => *radius,
            ShapeData::Mesh { radius, .. } => *radius,
            _ => 0.0,
        };
        Mesh { points, radius, model_to_world: self.model_to_world, world_to_model: self.world_to_model }
    }
}

fn circle_points(segments: usize, radius: f32) -> Vec<Vec2> {
    let inc = std::f32::consts::TAU / segments as f32;
    (0..segments).map(|i| { let a = inc * i as f32; vec2(a.cos() * radius, a.sin() * radius) }).collect()
}

fn rectangle_points(half_extents: Vec2) -> Vec<Vec2> {
    vec![
        vec2(-half_extents.x, -half_extents.y),
        vec2(half_extents.x, -half_extents.y),
        vec2(half_extents.x, half_extents.y),
        vec2(-half_extents.x, half_extents.y),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_reduces_to_four_ccw_points() {
        let shape = ClassifiedShape { data: ShapeData::Rectangle { half_extents: vec2(0.5, 0.5) }, ..Default::default() };
        let mesh = shape.to_mesh();
        assert_eq!(mesh.points.len(), 4);
        assert_eq!(mesh.points[0], vec2(-0.5, -0.5));
    }

    #[test]
    fn none_shape_reduces_to_empty_mesh() {
        let shape = ClassifiedShape::default();
        assert!(shape.to_mesh().is_empty());
    }

    #[test]
    fn circle_approximates_with_configured_segment_count() {
        let shape = ClassifiedShape { data: ShapeData::Circle { radius: 1.0 }, ..Default::default() };
        assert_eq!(shape.to_mesh().points.len(), CIRCLE_SEGMENTS);
    }
}
