//! Camera for primary ray generation.

use lumo_math::{Ray, Vec3};

/// How the image plane maps to rays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Pinhole camera with a vertical field of view in degrees.
    Perspective { vfov: f32 },
    /// Parallel rays over a view window of the given world-space size.
    Orthographic { width: f32, height: f32 },
}

/// Camera placed in the scene. The basis is computed once at construction.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    position: Vec3,
    look_at: Vec3,
    projection: Projection,

    // Orthonormal basis: u right, v up, w backwards
    u: Vec3,
    v: Vec3,
    w: Vec3,
}

impl Camera {
    /// Pinhole camera looking from `position` towards `look_at`.
    pub fn perspective(position: Vec3, look_at: Vec3, up: Vec3, vfov: f32) -> Self {
        Self::new(position, look_at, up, Projection::Perspective { vfov })
    }

    /// Parallel-projection camera with a `width` x `height` view window.
    pub fn orthographic(position: Vec3, look_at: Vec3, up: Vec3, width: f32, height: f32) -> Self {
        Self::new(position, look_at, up, Projection::Orthographic { width, height })
    }

    fn new(position: Vec3, look_at: Vec3, up: Vec3, projection: Projection) -> Self {
        let w = (position - look_at).normalize_or_zero();
        let mut u = up.cross(w).normalize_or_zero();
        if u == Vec3::ZERO {
            // `up` parallel to the view direction
            u = w.any_orthonormal_vector();
        }
        let v = w.cross(u);

        Self {
            position,
            look_at,
            projection,
            u,
            v,
            w,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn look_at(&self) -> Vec3 {
        self.look_at
    }

    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Generate the ray through normalized image coordinates.
    ///
    /// `s` runs left to right and `t` top to bottom, both in [0, 1].
    /// `aspect` is the image width divided by its height.
    pub fn ray(&self, s: f32, t: f32, aspect: f32) -> Ray {
        let sx = s - 0.5;
        let sy = 0.5 - t;

        match self.projection {
            Projection::Perspective { vfov } => {
                let h = (vfov.to_radians() / 2.0).tan();
                let viewport_height = 2.0 * h;
                let viewport_width = viewport_height * aspect;
                let direction =
                    sx * viewport_width * self.u + sy * viewport_height * self.v - self.w;
                Ray::primary(self.position, direction)
            }
            Projection::Orthographic { width, height } => {
                let origin = self.position + sx * width * self.u + sy * height * self.v;
                Ray::primary(origin, -self.w)
            }
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y, 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 45.0);
        let ray = camera.ray(0.5, 0.5, 1.0);

        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 5.0));
        assert!((ray.direction - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_corner_rays_are_oriented() {
        let camera = Camera::default();

        let top_left = camera.ray(0.0, 0.0, 2.0);
        assert!(top_left.direction.x < 0.0);
        assert!(top_left.direction.y > 0.0);

        let bottom_right = camera.ray(1.0, 1.0, 2.0);
        assert!(bottom_right.direction.x > 0.0);
        assert!(bottom_right.direction.y < 0.0);
    }

    #[test]
    fn test_orthographic_rays_are_parallel() {
        let camera = Camera::orthographic(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y, 4.0, 2.0);

        let a = camera.ray(0.0, 0.0, 2.0);
        let b = camera.ray(1.0, 1.0, 2.0);
        assert_eq!(a.direction, b.direction);
        assert!((a.origin - Vec3::new(-2.0, 1.0, 5.0)).length() < 1e-5);
        assert!((b.origin - Vec3::new(2.0, -1.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_up_parallel_to_view_is_handled() {
        let camera = Camera::perspective(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Y, 45.0);
        let ray = camera.ray(0.5, 0.5, 1.0);
        assert!(ray.direction.is_finite());
        assert!((ray.direction - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-5);
    }
}
