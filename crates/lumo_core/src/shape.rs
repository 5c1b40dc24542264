//! Geometric shapes and ray intersection.
//!
//! Sphere intersection follows the half-b quadratic form, triangles use
//! the Möller-Trumbore algorithm.

use lumo_math::{Aabb, Interval, Ray, Vec2, Vec3};
use std::f32::consts::PI;

/// Geometry-only result of a ray/shape test.
#[derive(Debug, Clone, Copy)]
pub struct ShapeHit {
    /// Distance along the ray
    pub t: f32,
    /// Hit point
    pub point: Vec3,
    /// Outward (geometric) unit normal
    pub normal: Vec3,
    /// Texture coordinates
    pub uv: Vec2,
}

/// A sphere.
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// UV coordinates for a point on the unit sphere.
    fn sphere_uv(p: Vec3) -> Vec2 {
        // theta: angle down from +Y, phi: angle around Y from +X
        let theta = (-p.y).clamp(-1.0, 1.0).acos();
        let phi = (-p.z).atan2(p.x) + PI;
        Vec2::new(phi / (2.0 * PI), theta / PI)
    }

    fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<ShapeHit> {
        let oc = self.center - ray.origin;
        let a = ray.direction.length_squared();
        let h = ray.direction.dot(oc);
        let c = oc.length_squared() - self.radius * self.radius;

        let discriminant = h * h - a * c;
        if discriminant < 0.0 || self.radius <= 0.0 {
            return None;
        }
        let sqrtd = discriminant.sqrt();

        // Nearest root in the acceptable range
        let mut root = (h - sqrtd) / a;
        if !ray_t.surrounds(root) {
            root = (h + sqrtd) / a;
            if !ray_t.surrounds(root) {
                return None;
            }
        }

        let point = ray.at(root);
        let normal = (point - self.center) / self.radius;
        Some(ShapeHit {
            t: root,
            point,
            normal,
            uv: Self::sphere_uv(normal),
        })
    }

    fn bounding_box(&self) -> Aabb {
        let rvec = Vec3::splat(self.radius);
        Aabb::from_points(self.center - rvec, self.center + rvec)
    }
}

/// A single triangle with a precomputed face normal.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
    normal: Vec3,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        Self { v0, v1, v2, normal }
    }

    /// Unit face normal following the counter-clockwise winding.
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn area(&self) -> f32 {
        (self.v1 - self.v0).cross(self.v2 - self.v0).length() * 0.5
    }

    /// Map two uniform numbers in [0, 1) to a uniformly distributed point.
    pub fn sample_point(&self, u1: f32, u2: f32) -> Vec3 {
        let su = u1.sqrt();
        let b0 = 1.0 - su;
        let b1 = u2 * su;
        self.v0 * b0 + self.v1 * b1 + self.v2 * (1.0 - b0 - b1)
    }

    /// True when the vertices are (nearly) collinear.
    pub fn is_degenerate(&self) -> bool {
        self.normal == Vec3::ZERO
    }

    fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<ShapeHit> {
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < 1e-8 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * edge2.dot(q);
        if !ray_t.surrounds(t) {
            return None;
        }

        Some(ShapeHit {
            t,
            point: ray.at(t),
            normal: self.normal,
            uv: Vec2::new(u, v),
        })
    }

    fn bounding_box(&self) -> Aabb {
        let min = self.v0.min(self.v1).min(self.v2);
        let max = self.v0.max(self.v1).max(self.v2);
        Aabb::from_points(min, max)
    }
}

/// An infinite plane through `point` with unit `normal`.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub point: Vec3,
    pub normal: Vec3,
}

/// Planes are unbounded; their boxes are clamped to this half-size so the
/// grid and BVH still get finite extents.
const PLANE_EXTENT: f32 = 1.0e4;

impl Plane {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalize_or_zero(),
        }
    }

    fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<ShapeHit> {
        let denom = self.normal.dot(ray.direction);
        if denom.abs() < 1e-8 {
            return None;
        }
        let t = (self.point - ray.origin).dot(self.normal) / denom;
        if !ray_t.surrounds(t) {
            return None;
        }
        let point = ray.at(t);
        if (point - self.point).abs().max_element() > PLANE_EXTENT {
            return None;
        }

        // Planar mapping in an arbitrary tangent frame
        let tangent = self.normal.any_orthonormal_vector();
        let bitangent = self.normal.cross(tangent);
        let local = point - self.point;
        Some(ShapeHit {
            t,
            point,
            normal: self.normal,
            uv: Vec2::new(local.dot(tangent), local.dot(bitangent)),
        })
    }

    fn bounding_box(&self) -> Aabb {
        // Flat along the dominant normal axis, huge along the others.
        let mut half = Vec3::splat(PLANE_EXTENT);
        let n = self.normal.abs();
        let axis = if n.x >= n.y && n.x >= n.z {
            0
        } else if n.y >= n.z {
            1
        } else {
            2
        };
        if n[axis] > 1.0 - 1e-6 {
            half[axis] = 0.0;
        }
        Aabb::from_points(self.point - half, self.point + half)
    }
}

/// The closed set of shapes a primitive can have.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    Sphere(Sphere),
    Triangle(Triangle),
    Plane(Plane),
}

impl Shape {
    /// Nearest intersection strictly inside `ray_t`.
    #[inline]
    pub fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<ShapeHit> {
        match self {
            Shape::Sphere(s) => s.intersect(ray, ray_t),
            Shape::Triangle(t) => t.intersect(ray, ray_t),
            Shape::Plane(p) => p.intersect(ray, ray_t),
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        match self {
            Shape::Sphere(s) => s.bounding_box(),
            Shape::Triangle(t) => t.bounding_box(),
            Shape::Plane(p) => p.bounding_box(),
        }
    }

    pub fn centroid(&self) -> Vec3 {
        match self {
            Shape::Sphere(s) => s.center,
            Shape::Triangle(t) => (t.v0 + t.v1 + t.v2) / 3.0,
            Shape::Plane(p) => p.point,
        }
    }
}
