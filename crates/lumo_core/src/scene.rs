//! Scene description handed to the render engine.
//!
//! A [`Scene`] is built once through [`SceneBuilder`] and is immutable
//! afterwards; the engine shares it read-only between worker threads.

use std::sync::Arc;

use lumo_math::{Aabb, Color, Interval, Ray, Vec2, Vec3};

use crate::camera::Camera;
use crate::shape::{Plane, Shape, Sphere, Triangle};

/// Surface description used by the shaders.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    /// Diffuse reflectance
    pub kd: Color,
    /// Perfect mirror reflectance
    pub ks: Color,
    /// Transmittance for refractive surfaces
    pub kt: Color,
    /// Index of refraction (used when `kt` is non-zero)
    pub ior: f32,
    /// Emitted radiance
    pub le: Color,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            kd: Color::splat(0.5),
            ks: Color::ZERO,
            kt: Color::ZERO,
            ior: 1.0,
            le: Color::ZERO,
        }
    }
}

impl Material {
    /// Pure diffuse material.
    pub fn diffuse(kd: Color) -> Self {
        Self {
            kd,
            ..Self::zero()
        }
    }

    /// Perfect mirror.
    pub fn mirror(ks: Color) -> Self {
        Self {
            ks,
            ..Self::zero()
        }
    }

    /// Clear dielectric such as glass or water.
    pub fn glass(ior: f32) -> Self {
        Self {
            kt: Color::ONE,
            ior,
            ..Self::zero()
        }
    }

    /// Light-emitting surface.
    pub fn emissive(le: Color) -> Self {
        Self {
            le,
            ..Self::zero()
        }
    }

    fn zero() -> Self {
        Self {
            kd: Color::ZERO,
            ks: Color::ZERO,
            kt: Color::ZERO,
            ior: 1.0,
            le: Color::ZERO,
        }
    }

    pub fn is_emissive(&self) -> bool {
        self.le.max_element() > 0.0
    }

    pub fn is_diffuse(&self) -> bool {
        self.kd.max_element() > 0.0
    }

    pub fn is_specular(&self) -> bool {
        self.ks.max_element() > 0.0
    }

    pub fn is_transmissive(&self) -> bool {
        self.kt.max_element() > 0.0
    }
}

/// Index of a material inside its [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub usize);

/// A shape bound to a material.
#[derive(Debug, Clone, Copy)]
pub struct Primitive {
    pub shape: Shape,
    pub material: MaterialId,
}

/// Full record of a ray/primitive intersection.
#[derive(Debug, Clone, Copy)]
pub struct Intersection {
    /// Distance along the ray
    pub t: f32,
    /// Hit point
    pub point: Vec3,
    /// Shading normal, always facing against the ray
    pub normal: Vec3,
    /// Whether the ray hit the outside of the surface
    pub front_face: bool,
    /// Texture coordinates, wrapped to [0, 1)
    pub uv: Vec2,
    /// Index of the primitive in [`Scene::primitives`]
    pub primitive: usize,
    pub material: MaterialId,
}

impl Primitive {
    /// Intersect this primitive; `index` is recorded in the result.
    #[inline]
    pub fn intersect(&self, index: usize, ray: &Ray, ray_t: Interval) -> Option<Intersection> {
        let hit = self.shape.intersect(ray, ray_t)?;
        let front_face = ray.direction.dot(hit.normal) < 0.0;
        Some(Intersection {
            t: hit.t,
            point: hit.point,
            normal: if front_face { hit.normal } else { -hit.normal },
            front_face,
            uv: lumo_math::normalize_uv(hit.uv),
            primitive: index,
            material: self.material,
        })
    }

    pub fn bounding_box(&self) -> Aabb {
        self.shape.bounding_box()
    }
}

/// Light sources used for direct lighting.
#[derive(Debug, Clone, Copy)]
pub enum Light {
    /// Infinitesimal light at a position.
    Point { position: Vec3, radiance: Color },
    /// Emissive triangle, sampled over its surface.
    Area { triangle: Triangle, radiance: Color },
}

impl Light {
    /// Point on the light for the given pair of sample values.
    pub fn sample_position(&self, u1: f32, u2: f32) -> Vec3 {
        match self {
            Light::Point { position, .. } => *position,
            Light::Area { triangle, .. } => triangle.sample_point(u1, u2),
        }
    }

    pub fn radiance(&self) -> Color {
        match self {
            Light::Point { radiance, .. } | Light::Area { radiance, .. } => *radiance,
        }
    }

    /// Cosine of the emission angle towards `direction` (1 for point lights).
    pub fn emission_cosine(&self, direction: Vec3) -> f32 {
        match self {
            Light::Point { .. } => 1.0,
            Light::Area { triangle, .. } => triangle.normal().dot(direction).abs(),
        }
    }
}

/// Immutable scene: geometry, materials, lights and camera.
#[derive(Debug, Clone)]
pub struct Scene {
    primitives: Arc<[Primitive]>,
    materials: Vec<Material>,
    lights: Vec<Light>,
    camera: Camera,
    background: Color,
}

impl Scene {
    pub fn builder() -> SceneBuilder {
        SceneBuilder::default()
    }

    /// Shared primitive list; accelerators keep a clone of this `Arc`.
    pub fn primitives(&self) -> &Arc<[Primitive]> {
        &self.primitives
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn material(&self, id: MaterialId) -> &Material {
        &self.materials[id.0]
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Bounding box of every primitive.
    pub fn bounds(&self) -> Aabb {
        self.primitives
            .iter()
            .fold(Aabb::EMPTY, |acc, p| Aabb::surrounding(&acc, &p.bounding_box()))
    }
}

/// Incrementally assembles a [`Scene`].
#[derive(Debug, Default)]
pub struct SceneBuilder {
    primitives: Vec<Primitive>,
    materials: Vec<Material>,
    lights: Vec<Light>,
    camera: Camera,
    background: Color,
}

impl SceneBuilder {
    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = camera;
        self
    }

    pub fn background(mut self, color: Color) -> Self {
        self.background = color;
        self
    }

    /// Register a material and return its id.
    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn add_sphere(&mut self, center: Vec3, radius: f32, material: MaterialId) -> &mut Self {
        self.push(Shape::Sphere(Sphere::new(center, radius)), material)
    }

    pub fn add_triangle(
        &mut self,
        v0: Vec3,
        v1: Vec3,
        v2: Vec3,
        material: MaterialId,
    ) -> &mut Self {
        self.push(Shape::Triangle(Triangle::new(v0, v1, v2)), material)
    }

    /// Add a quad as two triangles (`a`, `b`, `c`, `d` in winding order).
    pub fn add_quad(
        &mut self,
        a: Vec3,
        b: Vec3,
        c: Vec3,
        d: Vec3,
        material: MaterialId,
    ) -> &mut Self {
        self.add_triangle(a, b, c, material);
        self.add_triangle(a, c, d, material)
    }

    pub fn add_plane(&mut self, point: Vec3, normal: Vec3, material: MaterialId) -> &mut Self {
        self.push(Shape::Plane(Plane::new(point, normal)), material)
    }

    pub fn add_point_light(&mut self, position: Vec3, radiance: Color) -> &mut Self {
        self.lights.push(Light::Point { position, radiance });
        self
    }

    /// Add an emissive triangle that is both visible geometry and a light.
    pub fn add_area_light(&mut self, v0: Vec3, v1: Vec3, v2: Vec3, radiance: Color) -> &mut Self {
        let material = self.add_material(Material::emissive(radiance));
        let triangle = Triangle::new(v0, v1, v2);
        self.lights.push(Light::Area { triangle, radiance });
        self.push(Shape::Triangle(triangle), material)
    }

    fn push(&mut self, shape: Shape, material: MaterialId) -> &mut Self {
        debug_assert!(material.0 < self.materials.len(), "unknown material {:?}", material);
        self.primitives.push(Primitive { shape, material });
        self
    }

    /// Finish the scene. Primitives with unknown materials are dropped.
    pub fn build(self) -> Scene {
        let material_count = self.materials.len();
        let total = self.primitives.len();
        let primitives: Vec<Primitive> = self
            .primitives
            .into_iter()
            .filter(|p| p.material.0 < material_count)
            .collect();
        if primitives.len() != total {
            log::warn!(
                "Dropped {} primitives referencing unknown materials",
                total - primitives.len()
            );
        }

        log::debug!(
            "Built scene: {} primitives, {} materials, {} lights",
            primitives.len(),
            material_count,
            self.lights.len()
        );

        Scene {
            primitives: primitives.into(),
            materials: self.materials,
            lights: self.lights,
            camera: self.camera,
            background: self.background,
        }
    }
}
