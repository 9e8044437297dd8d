pub mod geo;
pub mod ratio;
pub mod transform;

pub use geo::{vec2, Vec2};
pub use ratio::Ratio;
pub use transform::{PackedTransform, Parts};
