//! Light transport policies.
//!
//! A [`Shader`] turns a camera ray into a radiance estimate. Variants range
//! from debug views (depth, flat diffuse color) to a full path tracer.
//! Recursion is bounded by the configured maximum depth and every result is
//! checked for NaN/Inf before it leaves [`Shader::trace`].

use std::f32::consts::PI;

use lumo_core::{Intersection, Light, Material, Scene, Shape, ShaderKind};
use lumo_math::{fresnel, is_valid_vec3, Color, Ray, Vec3};

use crate::accelerator::Accelerator;
use crate::sampler::{dimension, Sampler};

/// Shadow rays stop this far short of the light.
const SHADOW_EPSILON: f32 = 1.0e-3;
/// Offset applied along the normal when spawning secondary rays.
const RAY_OFFSET: f32 = 1.0e-4;
/// Path depth from which Russian roulette may terminate a path.
const ROULETTE_DEPTH: u32 = 3;
/// Whitted branches contributing less than this are not followed.
const MIN_BRANCH_WEIGHT: f32 = 1.0e-3;

/// Everything a shader reads while tracing one sample.
#[derive(Clone, Copy)]
pub struct ShadeContext<'a> {
    pub scene: &'a Scene,
    pub accelerator: &'a Accelerator,
    pub sampler: &'a Sampler,
    /// Linear pixel index, used to decorrelate sample streams
    pub pixel: u32,
    /// Index of the camera sample within the pixel
    pub sample: u32,
    pub samples_light: u32,
    pub max_depth: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shader {
    /// Grey level `1 - t / max_distance` for hits, black for misses.
    DepthMap { max_distance: f32 },
    DiffuseMaterial,
    NoShadows,
    Whitted,
    PathTracer,
}

impl Shader {
    /// Shader for `kind`; the depth map scales against the farthest
    /// bounded geometry seen from the camera.
    pub fn new(kind: ShaderKind, scene: &Scene) -> Self {
        match kind {
            ShaderKind::DepthMap => Shader::DepthMap {
                max_distance: farthest_distance(scene),
            },
            ShaderKind::DiffuseMaterial => Shader::DiffuseMaterial,
            ShaderKind::NoShadows => Shader::NoShadows,
            ShaderKind::Whitted => Shader::Whitted,
            ShaderKind::PathTracer => Shader::PathTracer,
        }
    }

    /// Radiance along `ray`. Invalid results are replaced by black.
    pub fn trace(&self, ctx: &ShadeContext, ray: &Ray) -> Color {
        let hit = ctx.accelerator.intersect(ray);
        let color = self.shade(ctx, ray, hit.as_ref());

        if is_valid_vec3(color) {
            color.max(Color::ZERO)
        } else {
            log::trace!("Discarded invalid sample {:?} at pixel {}", color, ctx.pixel);
            Color::ZERO
        }
    }

    /// Color for a ray whose nearest hit (if any) is already known.
    pub fn shade(&self, ctx: &ShadeContext, ray: &Ray, hit: Option<&Intersection>) -> Color {
        if let Shader::PathTracer = self {
            return self.path_trace(ctx, ray, hit.copied());
        }
        let Some(hit) = hit else {
            return match self {
                Shader::DepthMap { .. } => Color::ZERO,
                _ => ctx.scene.background(),
            };
        };
        let material = ctx.scene.material(hit.material);

        match *self {
            Shader::DepthMap { max_distance } => {
                let gray = (1.0 - hit.t / max_distance).clamp(0.0, 1.0);
                Color::splat(gray)
            }
            Shader::DiffuseMaterial => {
                if material.is_emissive() {
                    material.le
                } else {
                    material.kd
                }
            }
            Shader::NoShadows => {
                material.le + direct_light(ctx, hit, material, ctx.sample, false)
            }
            Shader::Whitted | Shader::PathTracer => self.whitted(ctx, ray, hit),
        }
    }

    /// Whitted-style transport over an explicit work stack.
    ///
    /// Each entry is a ray and the weight its radiance contributes to the
    /// pixel. Glass splits into a reflected and a refracted entry, so
    /// branches whose weight drops below [`MIN_BRANCH_WEIGHT`] are dropped.
    fn whitted(&self, ctx: &ShadeContext, ray: &Ray, hit: &Intersection) -> Color {
        let mut color = Color::ZERO;
        let mut stack = vec![(*ray, Some(*hit), Color::ONE)];

        while let Some((ray, hit, weight)) = stack.pop() {
            let Some(hit) = hit else {
                color += weight * ctx.scene.background();
                continue;
            };
            let material = ctx.scene.material(hit.material);

            color += weight * material.le;
            if material.is_diffuse() {
                color += weight * direct_light(ctx, &hit, material, ctx.sample, true);
            }
            if ray.depth + 1 >= ctx.max_depth {
                continue;
            }

            let mut push = |direction: Vec3, branch: Color| {
                let branch = weight * branch;
                if branch.max_element() >= MIN_BRANCH_WEIGHT {
                    let next = spawn(&ray, &hit, direction);
                    stack.push((next, ctx.accelerator.intersect(&next), branch));
                }
            };

            if material.is_specular() {
                push(reflect(ray.direction, hit.normal), material.ks);
            }
            if material.is_transmissive() {
                let kr = fresnel(ray.direction, outward_normal(&hit), material.ior);
                push(reflect(ray.direction, hit.normal), material.kt * kr);
                if kr < 1.0 {
                    let eta = refraction_ratio(&hit, material);
                    push(
                        refract(ray.direction, hit.normal, eta),
                        material.kt * (1.0 - kr),
                    );
                }
            }
        }

        color
    }

    /// Iterative path tracer with next event estimation on diffuse surfaces.
    fn path_trace(&self, ctx: &ShadeContext, primary: &Ray, first: Option<Intersection>) -> Color {
        let mut radiance = Color::ZERO;
        let mut throughput = Color::ONE;
        let mut ray = *primary;
        let mut next_hit = first;
        // Emission is only counted where the light was not already sampled.
        let mut count_emission = true;

        loop {
            let Some(hit) = next_hit else {
                radiance += throughput * ctx.scene.background();
                break;
            };
            let material = ctx.scene.material(hit.material);

            if material.is_emissive() {
                if count_emission {
                    radiance += throughput * material.le;
                }
                break;
            }

            // Unique sample index for this bounce within the pixel
            let index = ctx
                .sample
                .wrapping_mul(ctx.max_depth)
                .wrapping_add(ray.depth);

            if material.is_diffuse() {
                radiance += throughput * direct_light(ctx, &hit, material, index, true);
            }

            let weights = [
                material.kd.max_element(),
                material.ks.max_element(),
                material.kt.max_element(),
            ];
            let total: f32 = weights.iter().sum();
            if total <= 0.0 {
                break;
            }

            let mut choice = ctx.sampler.sample(ctx.pixel, index, dimension::LOBE) * total;
            let u = ctx.sampler.sample(ctx.pixel, index, dimension::BOUNCE_U);
            let v = ctx.sampler.sample(ctx.pixel, index, dimension::BOUNCE_V);

            let direction = if choice < weights[0] {
                throughput *= material.kd * (total / weights[0]);
                count_emission = false;
                cosine_hemisphere(hit.normal, u, v)
            } else {
                choice -= weights[0];
                count_emission = true;
                if choice < weights[1] || weights[2] <= 0.0 {
                    throughput *= material.ks * (total / weights[1]);
                    reflect(ray.direction, hit.normal)
                } else {
                    throughput *= material.kt * (total / weights[2]);
                    let kr = fresnel(ray.direction, outward_normal(&hit), material.ior);
                    if u < kr {
                        reflect(ray.direction, hit.normal)
                    } else {
                        refract(ray.direction, hit.normal, refraction_ratio(&hit, material))
                    }
                }
            };

            ray = spawn(&ray, &hit, direction);

            if ray.depth >= ROULETTE_DEPTH {
                let survive = throughput.max_element().min(0.95);
                if ctx.sampler.sample(ctx.pixel, index, dimension::ROULETTE) >= survive {
                    break;
                }
                throughput /= survive;
            }
            if ray.depth >= ctx.max_depth {
                break;
            }
            next_hit = ctx.accelerator.intersect(&ray);
        }

        radiance
    }
}

/// Direct illumination of a diffuse surface, averaged over `samples_light`
/// samples per light.
fn direct_light(
    ctx: &ShadeContext,
    hit: &Intersection,
    material: &Material,
    index: u32,
    shadows: bool,
) -> Color {
    let lights = ctx.scene.lights();
    if lights.is_empty() || !material.is_diffuse() {
        return Color::ZERO;
    }

    let spl = ctx.samples_light.max(1);
    let mut total = Color::ZERO;
    for light in lights {
        let mut sum = Color::ZERO;
        for s in 0..spl {
            let li = index.wrapping_mul(spl).wrapping_add(s);
            let u1 = ctx.sampler.sample(ctx.pixel, li, dimension::LIGHT_U);
            let u2 = ctx.sampler.sample(ctx.pixel, li, dimension::LIGHT_V);

            let to_light = light.sample_position(u1, u2) - hit.point;
            let distance_squared = to_light.length_squared();
            if distance_squared <= f32::EPSILON {
                continue;
            }
            let distance = distance_squared.sqrt();
            let direction = to_light / distance;

            let cos_surface = hit.normal.dot(direction);
            if cos_surface <= 0.0 {
                continue;
            }

            if shadows {
                let shadow = Ray::primary(hit.point + hit.normal * RAY_OFFSET, direction);
                if ctx.accelerator.occluded(&shadow, distance - SHADOW_EPSILON) {
                    continue;
                }
            }

            let falloff = match light {
                Light::Point { .. } => 1.0 / distance_squared,
                Light::Area { triangle, .. } => {
                    light.emission_cosine(direction) * triangle.area() / distance_squared
                }
            };
            sum += light.radiance() * cos_surface * falloff;
        }
        total += sum / spl as f32;
    }

    total * material.kd / PI
}

/// Secondary ray leaving `hit`, nudged off the surface on the side it travels to.
fn spawn(ray: &Ray, hit: &Intersection, direction: Vec3) -> Ray {
    let side = if direction.dot(hit.normal) >= 0.0 { 1.0 } else { -1.0 };
    ray.bounce(hit.point + hit.normal * (RAY_OFFSET * side), direction)
}

/// Geometric normal pointing out of the surface, whichever side was hit.
fn outward_normal(hit: &Intersection) -> Vec3 {
    if hit.front_face {
        hit.normal
    } else {
        -hit.normal
    }
}

fn refraction_ratio(hit: &Intersection, material: &Material) -> f32 {
    if hit.front_face {
        1.0 / material.ior
    } else {
        material.ior
    }
}

/// Reflect a vector about a normal.
#[inline]
fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

/// Refract a unit vector through a surface whose normal faces against it.
#[inline]
fn refract(uv: Vec3, n: Vec3, etai_over_etat: f32) -> Vec3 {
    let cos_theta = (-uv).dot(n).min(1.0);
    let r_out_perp = etai_over_etat * (uv + cos_theta * n);
    let r_out_parallel = -(1.0 - r_out_perp.length_squared()).abs().sqrt() * n;
    r_out_perp + r_out_parallel
}

/// Cosine-weighted direction on the hemisphere around `normal`.
fn cosine_hemisphere(normal: Vec3, u: f32, v: f32) -> Vec3 {
    let r = u.sqrt();
    let phi = 2.0 * PI * v;
    let (tangent, bitangent) = normal.any_orthonormal_pair();
    let local = Vec3::new(r * phi.cos(), r * phi.sin(), (1.0 - u).max(0.0).sqrt());
    tangent * local.x + bitangent * local.y + normal * local.z
}

/// Distance from the camera to the farthest corner of the bounded geometry.
fn farthest_distance(scene: &Scene) -> f32 {
    let eye = scene.camera().position();
    let farthest = scene
        .primitives()
        .iter()
        .filter(|p| !matches!(p.shape, Shape::Plane(_)))
        .flat_map(|p| {
            let bbox = p.bounding_box();
            let (lo, hi) = (bbox.min_point(), bbox.max_point());
            (0..8).map(move |i| {
                Vec3::new(
                    if i & 1 == 0 { lo.x } else { hi.x },
                    if i & 2 == 0 { lo.y } else { hi.y },
                    if i & 4 == 0 { lo.z } else { hi.z },
                )
            })
        })
        .map(|corner| corner.distance(eye))
        .fold(0.0_f32, f32::max);

    if farthest > 0.0 {
        farthest * 1.1
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::{demo, AcceleratorKind, Camera, SamplerKind};

    struct Fixture {
        scene: Scene,
        accelerator: Accelerator,
        sampler: Sampler,
    }

    impl Fixture {
        fn new(scene: Scene) -> Self {
            let accelerator =
                Accelerator::build(AcceleratorKind::Bvh, scene.primitives().clone()).unwrap();
            Self {
                scene,
                accelerator,
                sampler: Sampler::new(SamplerKind::Halton, 1),
            }
        }

        fn ctx(&self, sample: u32) -> ShadeContext<'_> {
            ShadeContext {
                scene: &self.scene,
                accelerator: &self.accelerator,
                sampler: &self.sampler,
                pixel: 0,
                sample,
                samples_light: 4,
                max_depth: 6,
            }
        }
    }

    fn towards_origin() -> Ray {
        Ray::primary(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn test_depth_map_hit_differs_from_miss() {
        let fixture = Fixture::new(demo::single_triangle());
        let shader = Shader::new(ShaderKind::DepthMap, &fixture.scene);
        let ctx = fixture.ctx(0);

        let hit = shader.trace(&ctx, &towards_origin());
        let miss = shader.trace(&ctx, &Ray::primary(Vec3::new(0.0, 0.0, 3.0), Vec3::Z));
        assert!(hit.x > 0.0 && hit.x < 1.0);
        assert_eq!(miss, Color::ZERO);
    }

    #[test]
    fn test_diffuse_material_returns_albedo() {
        let fixture = Fixture::new(demo::single_triangle());
        let color = Shader::DiffuseMaterial.trace(&fixture.ctx(0), &towards_origin());
        assert_eq!(color, Color::ONE);
    }

    #[test]
    fn test_point_light_matches_lambert() {
        let fixture = Fixture::new(demo::single_triangle());
        let color = Shader::NoShadows.trace(&fixture.ctx(0), &towards_origin());
        // radiance 4 at distance 2, normal incidence, albedo 1
        let expected = 4.0 / 4.0 / PI;
        assert!((color.x - expected).abs() < 1e-3, "{color:?}");
    }

    #[test]
    fn test_whitted_casts_shadows() {
        let mut builder = Scene::builder().camera(Camera::default());
        let white = builder.add_material(Material::diffuse(Color::ONE));
        builder.add_plane(Vec3::ZERO, Vec3::Y, white);
        builder.add_sphere(Vec3::new(0.0, 2.0, 0.0), 0.5, white);
        builder.add_point_light(Vec3::new(0.0, 4.0, 0.0), Color::splat(10.0));
        let fixture = Fixture::new(builder.build());

        let down = Ray::primary(Vec3::new(0.0, 1.0, 0.5), Vec3::new(0.0, -1.0, -0.5));
        let lit = Shader::NoShadows.trace(&fixture.ctx(0), &down);
        let shadowed = Shader::Whitted.trace(&fixture.ctx(0), &down);
        assert!(lit.x > 0.0);
        assert_eq!(shadowed, Color::ZERO);
    }

    #[test]
    fn test_mirror_reflects_background() {
        let mut builder = Scene::builder().background(Color::new(0.2, 0.4, 0.6));
        let mirror = builder.add_material(Material::mirror(Color::ONE));
        builder.add_sphere(Vec3::ZERO, 1.0, mirror);
        let fixture = Fixture::new(builder.build());

        let color = Shader::Whitted.trace(&fixture.ctx(0), &towards_origin());
        assert!((color - Color::new(0.2, 0.4, 0.6)).length() < 1e-4);
    }

    #[test]
    fn test_glass_conserves_background() {
        let mut builder = Scene::builder().background(Color::ONE);
        let glass = builder.add_material(Material::glass(1.5));
        builder.add_sphere(Vec3::ZERO, 1.0, glass);
        let fixture = Fixture::new(builder.build());

        let color = Shader::Whitted.trace(&fixture.ctx(0), &towards_origin());
        assert!(color.x > 0.5 && color.x <= 1.0 + 1e-3, "{color:?}");
    }

    #[test]
    fn test_whitted_inside_mirror_sphere_at_max_depth() {
        let mut builder = Scene::builder().background(Color::ONE);
        let mirror = builder.add_material(Material::mirror(Color::splat(0.9)));
        builder.add_sphere(Vec3::ZERO, 5.0, mirror);
        let fixture = Fixture::new(builder.build());

        let mut ctx = fixture.ctx(0);
        ctx.max_depth = lumo_core::MAX_RAY_DEPTH;
        let color = Shader::Whitted.trace(&ctx, &Ray::primary(Vec3::ZERO, Vec3::X));
        // Trapped rays never reach the background
        assert_eq!(color, Color::ZERO);
    }

    #[test]
    fn test_whitted_nested_glass_at_max_depth() {
        let mut builder = Scene::builder().background(Color::ONE);
        let glass = builder.add_material(Material::glass(1.5));
        for r in 1..=8 {
            builder.add_sphere(Vec3::ZERO, r as f32 * 0.5, glass);
        }
        let fixture = Fixture::new(builder.build());

        let mut ctx = fixture.ctx(0);
        ctx.max_depth = lumo_core::MAX_RAY_DEPTH;
        let ray = Ray::primary(Vec3::new(0.3, 0.2, 6.0), Vec3::new(0.0, 0.0, -1.0));
        let color = Shader::Whitted.trace(&ctx, &ray);
        assert!(is_valid_vec3(color));
        assert!(color.x > 0.0 && color.x <= 1.0 + 1e-3, "{color:?}");
    }

    #[test]
    fn test_path_tracer_is_finite_and_positive() {
        let fixture = Fixture::new(demo::cornell_box());
        let mut sum = Color::ZERO;
        for sample in 0..64 {
            let ray = fixture.scene.camera().ray(0.5, 0.7, 1.0);
            let c = Shader::PathTracer.trace(&fixture.ctx(sample), &ray);
            assert!(is_valid_vec3(c));
            assert!(c.min_element() >= 0.0);
            sum += c;
        }
        assert!(sum.max_element() > 0.0);
    }

    #[test]
    fn test_path_tracer_handles_wrapping_sample_index() {
        let fixture = Fixture::new(demo::cornell_box());
        let mut ctx = fixture.ctx(u32::MAX);
        ctx.max_depth = lumo_core::MAX_RAY_DEPTH;
        for pixel in [0, 17, u32::MAX] {
            ctx.pixel = pixel;
            let ray = fixture.scene.camera().ray(0.4, 0.6, 1.0);
            assert!(is_valid_vec3(Shader::PathTracer.trace(&ctx, &ray)));
        }
    }

    #[test]
    fn test_path_tracer_sees_light_directly() {
        let fixture = Fixture::new(demo::cornell_box());
        let up = Ray::primary(Vec3::new(0.1, 0.0, -0.05), Vec3::Y);
        let color = Shader::PathTracer.trace(&fixture.ctx(0), &up);
        assert_eq!(color, Color::splat(12.0));
    }

    #[test]
    fn test_invalid_radiance_becomes_black() {
        let mut builder = Scene::builder();
        let white = builder.add_material(Material::diffuse(Color::ONE));
        builder.add_triangle(
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            white,
        );
        builder.add_point_light(Vec3::new(0.0, 0.0, 1.0), Color::splat(f32::NAN));
        let fixture = Fixture::new(builder.build());

        let color = Shader::NoShadows.trace(&fixture.ctx(0), &towards_origin());
        assert_eq!(color, Color::ZERO);
    }
}
