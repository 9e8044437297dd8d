//! 2.5D packed transform: a 2D rotation+scale+translate matrix plus a
//! scalar Z translation, omitting the unused rotation/scale Z terms.
//!
//! Grounded directly on `dof/transform/include/transform/Transform.h`'s
//! `PackedTransform` — same field layout (`ax,bx,tx / ay,by,ty / tz`), same
//! `build`/`inverse`/`decompose` derivations.

use super::geo::{vec2, Vec2};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Parts {
    /// unit-length rotation basis vector (cos, sin)
    pub rot: Vec2,
    pub scale: Vec2,
    pub translate_z: f32,
    pub translate: Vec2,
}

impl Default for Parts {
    fn default() -> Self {
        Parts {
            rot: vec2(1.0, 0.0),
            scale: vec2(1.0, 1.0),
            translate_z: 0.0,
            translate: vec2(0.0, 0.0),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PackedTransform {
    pub ax: f32,
    pub bx: f32,
    pub tx: f32,
    pub ay: f32,
    pub by: f32,
    pub ty: f32,
    pub tz: f32,
}

impl Default for PackedTransform {
    fn default() -> Self {
        PackedTransform {
            ax: 1.0,
            bx: 0.0,
            tx: 0.0,
            ay: 0.0,
            by: 1.0,
            ty: 0.0,
            tz: 0.0,
        }
    }
}

impl PackedTransform {
    pub fn build(p: Parts) -> Self {
        PackedTransform {
            ax: p.rot.x * p.scale.x,
            bx: -p.rot.y * p.scale.y,
            tx: p.translate.x,
            ay: p.rot.y * p.scale.x,
            by: p.rot.x * p.scale.y,
            ty: p.translate.y,
            tz: p.translate_z,
        }
    }

    pub fn decompose(&self) -> Parts {
        let a_len = (self.ax * self.ax + self.ay * self.ay).sqrt();
        let b_len = (self.bx * self.bx + self.by * self.by).sqrt();
        Parts {
            rot: vec2(self.ax / a_len, self.ay / a_len),
            scale: vec2(a_len, b_len),
            translate: vec2(self.tx, self.ty),
            translate_z: self.tz,
        }
    }

    pub fn transform_point(&self, v: Vec2) -> Vec2 {
        vec2(self.ax * v.x + self.bx * v.y + self.tx, self.ay * v.x + self.by * v.y + self.ty)
    }

    pub fn transform_vector(&self, v: Vec2) -> Vec2 {
        vec2(self.ax * v.x + self.bx * v.y, self.ay * v.x + self.by * v.y)
    }

    pub fn pos2(&self) -> Vec2 {
        vec2(self.tx, self.ty)
    }

    pub fn set_pos(&mut self, p: Vec2) {
        self.tx = p.x;
        self.ty = p.y;
    }

    pub fn inverse_of(p: Parts) -> Self {
        PackedTransform {
            ax: p.rot.x / p.scale.x,
            bx: p.rot.y / p.scale.x,
            tx: (-p.rot.x * p.translate.x - p.rot.y * p.translate.y) / p.scale.x,
            ay: -p.rot.y / p.scale.y,
            by: p.rot.x / p.scale.y,
            ty: (p.rot.y * p.translate.x - p.rot.x * p.translate.y) / p.scale.y,
            tz: -p.translate_z,
        }
    }

    pub fn inverse(&self) -> Self {
        Self::inverse_of(self.decompose())
    }
}

impl std::ops::Mul for PackedTransform {
    type Output = PackedTransform;

    fn mul(self, v: PackedTransform) -> PackedTransform {
        PackedTransform {
            ax: self.ax * v.ax + self.bx * v.ay,
            bx: self.ax * v.bx + self.bx * v.by,
            tx: self.ax * v.tx + self.bx * v.ty + self.tx,
            ay: self.ay * v.ax + self.by * v.ay,
            by: self.ay * v.bx + self.by * v.by,
            ty: self.ay * v.tx + self.by * v.ty + self.ty,
            tz: v.tz + self.tz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2, eps: f32) -> bool {
        (a.x - b.x).abs() < eps && (a.y - b.y).abs() < eps
    }

    #[test]
    fn inverse_round_trips_a_point() {
        let t = PackedTransform::build(Parts {
            rot: vec2(0.6, 0.8),
            scale: vec2(2.0, 3.0),
            translate: vec2(5.0, -1.0),
            translate_z: 0.0,
        });
        let p = vec2(1.5, -2.25);
        let round_tripped = t.inverse().transform_point(t.transform_point(p));
        assert!(approx(round_tripped, p, 1e-4), "{:?} != {:?}", round_tripped, p);
    }

    #[test]
    fn identity_build_matches_default() {
        assert_eq!(PackedTransform::build(Parts::default()), PackedTransform::default());
    }
}
