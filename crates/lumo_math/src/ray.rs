use crate::Vec3;

/// A ray in 3D space with origin, unit direction and bounce depth.
///
/// The direction is normalized on construction, so the parameter `t`
/// of a hit is the euclidean distance from the origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Number of bounces that produced this ray (0 for primary rays).
    pub depth: u32,
}

impl Ray {
    /// Create a new ray. The direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3, depth: u32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            depth,
        }
    }

    /// Create a primary ray (depth 0).
    #[inline]
    pub fn primary(origin: Vec3, direction: Vec3) -> Self {
        Self::new(origin, direction, 0)
    }

    /// Spawn a secondary ray one bounce deeper than this one.
    #[inline]
    pub fn bounce(&self, origin: Vec3, direction: Vec3) -> Self {
        Self::new(origin, direction, self.depth + 1)
    }

    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    #[inline]
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}
