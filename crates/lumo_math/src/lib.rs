// Re-export glam for convenience
pub use glam::*;

// Lumo math types
mod aabb;
mod interval;
mod ray;
pub mod utils;

pub use aabb::Aabb;
pub use interval::Interval;
pub use ray::Ray;
pub use utils::{
    equal, equal_vec3, fresnel, halton_sequence, incremental_avg, is_valid, is_valid_vec3,
    normalize_color, normalize_uv, round_down_to_multiple_of, EPSILON,
};

/// RGB color with linear components, usually in [0, 1].
pub type Color = Vec3;
