//! Spatial indices answering nearest-hit and any-hit ray queries.
//!
//! Every variant reports the same nearest hit as a linear scan; they only
//! differ in how many primitives a query has to touch.

use std::sync::Arc;
use std::time::Instant;

use lumo_core::{AcceleratorKind, Intersection, Primitive};
use lumo_math::{Interval, Ray};
use thiserror::Error;

use crate::bvh::Bvh;
use crate::grid::RegularGrid;

/// Smallest accepted hit distance, keeps secondary rays off their origin surface.
pub const T_MIN: f32 = 1.0e-4;

/// Failure while building an acceleration structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Could not allocate {bytes} bytes for the acceleration structure")]
    OutOfMemory { bytes: usize },

    #[error("Scene has {0} primitives, more than the structure can index")]
    TooManyPrimitives(usize),
}

/// Linear scan over every primitive.
#[derive(Debug)]
pub struct Naive {
    primitives: Arc<[Primitive]>,
}

impl Naive {
    pub fn new(primitives: Arc<[Primitive]>) -> Self {
        Self { primitives }
    }

    pub fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<Intersection> {
        let mut closest = None;
        let mut max = ray_t.max;
        for (i, p) in self.primitives.iter().enumerate() {
            if let Some(hit) = p.intersect(i, ray, ray_t.with_max(max)) {
                max = hit.t;
                closest = Some(hit);
            }
        }
        closest
    }

    pub fn occluded(&self, ray: &Ray, ray_t: Interval) -> bool {
        self.primitives
            .iter()
            .any(|p| p.shape.intersect(ray, ray_t).is_some())
    }
}

/// Acceleration structure chosen by [`AcceleratorKind`].
///
/// Immutable once built; queries take `&self` and may run from any number
/// of threads.
#[derive(Debug)]
pub enum Accelerator {
    Naive(Naive),
    RegularGrid(RegularGrid),
    Bvh(Bvh),
}

impl Accelerator {
    /// Build the requested structure over `primitives` without copying geometry.
    pub fn build(kind: AcceleratorKind, primitives: Arc<[Primitive]>) -> Result<Self, BuildError> {
        let start = Instant::now();
        let count = primitives.len();

        let accelerator = match kind {
            AcceleratorKind::Naive => Accelerator::Naive(Naive::new(primitives)),
            AcceleratorKind::RegularGrid => Accelerator::RegularGrid(RegularGrid::new(primitives)?),
            AcceleratorKind::Bvh => Accelerator::Bvh(Bvh::new(primitives)),
        };

        log::info!(
            "Built {:?} accelerator over {} primitives in {:.2?}",
            kind,
            count,
            start.elapsed()
        );
        Ok(accelerator)
    }

    pub fn kind(&self) -> AcceleratorKind {
        match self {
            Accelerator::Naive(_) => AcceleratorKind::Naive,
            Accelerator::RegularGrid(_) => AcceleratorKind::RegularGrid,
            Accelerator::Bvh(_) => AcceleratorKind::Bvh,
        }
    }

    /// Nearest hit beyond [`T_MIN`].
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        self.intersect_in(ray, Interval::new(T_MIN, f32::INFINITY))
    }

    /// Nearest hit inside `ray_t`.
    pub fn intersect_in(&self, ray: &Ray, ray_t: Interval) -> Option<Intersection> {
        match self {
            Accelerator::Naive(naive) => naive.intersect(ray, ray_t),
            Accelerator::RegularGrid(grid) => grid.intersect(ray, ray_t),
            Accelerator::Bvh(bvh) => bvh.intersect(ray, ray_t),
        }
    }

    /// True if any primitive lies between [`T_MIN`] and `max_distance`.
    pub fn occluded(&self, ray: &Ray, max_distance: f32) -> bool {
        let ray_t = Interval::new(T_MIN, max_distance);
        if ray_t.size() <= 0.0 {
            return false;
        }
        match self {
            Accelerator::Naive(naive) => naive.occluded(ray, ray_t),
            Accelerator::RegularGrid(grid) => grid.occluded(ray, ray_t),
            Accelerator::Bvh(bvh) => bvh.occluded(ray, ray_t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::demo;
    use lumo_math::Vec3;

    const KINDS: [AcceleratorKind; 3] = [
        AcceleratorKind::Naive,
        AcceleratorKind::RegularGrid,
        AcceleratorKind::Bvh,
    ];

    #[test]
    fn test_build_reports_kind() {
        let scene = demo::cornell_box();
        for kind in KINDS {
            let accel = Accelerator::build(kind, scene.primitives().clone()).unwrap();
            assert_eq!(accel.kind(), kind);
        }
    }

    #[test]
    fn test_variants_agree_on_camera_rays() {
        let scene = demo::cornell_box();
        let built: Vec<Accelerator> = KINDS
            .iter()
            .map(|&k| Accelerator::build(k, scene.primitives().clone()).unwrap())
            .collect();

        for j in 0..16 {
            for i in 0..16 {
                let ray = scene.camera().ray(i as f32 / 15.0, j as f32 / 15.0, 1.0);
                let reference = built[0].intersect(&ray);
                for accel in &built[1..] {
                    let hit = accel.intersect(&ray);
                    match (reference, hit) {
                        (None, None) => {}
                        (Some(a), Some(b)) => {
                            assert!((a.t - b.t).abs() < 1e-4, "{:?}", accel.kind())
                        }
                        _ => panic!("{:?} disagrees with naive at pixel ({i}, {j})", accel.kind()),
                    }
                }
            }
        }
    }

    #[test]
    fn test_occluded_stops_before_max_distance() {
        let scene = demo::single_triangle();
        for kind in KINDS {
            let accel = Accelerator::build(kind, scene.primitives().clone()).unwrap();
            let ray = Ray::primary(Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 0.0, -1.0));
            assert!(accel.occluded(&ray, 3.0));
            assert!(!accel.occluded(&ray, 1.5));
            assert!(!accel.occluded(&ray, 0.0));
        }
    }

    #[test]
    fn test_empty_scene_has_no_hits() {
        for kind in KINDS {
            let accel = Accelerator::build(kind, Vec::<Primitive>::new().into()).unwrap();
            let ray = Ray::primary(Vec3::ZERO, Vec3::Z);
            assert!(accel.intersect(&ray).is_none());
            assert!(!accel.occluded(&ray, f32::INFINITY));
        }
    }
}
