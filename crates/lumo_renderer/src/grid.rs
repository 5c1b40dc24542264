//! Uniform grid acceleration structure.
//!
//! Bounded primitives are binned into voxels by bounding box overlap and
//! rays walk the voxels front to back with a 3D-DDA. Unbounded primitives
//! (planes) are kept aside and tested against every ray.

use std::sync::Arc;

use lumo_core::{Intersection, Primitive, Shape};
use lumo_math::{Aabb, Interval, Ray, Vec3};

use crate::accelerator::BuildError;

/// Target number of primitives per voxel used by the resolution heuristic.
const DENSITY: f32 = 3.0;
/// Upper bound for the number of voxels along one axis.
const MAX_RESOLUTION: usize = 128;

/// Regular voxel grid storing cell contents in a compressed row layout.
#[derive(Debug)]
pub struct RegularGrid {
    primitives: Arc<[Primitive]>,
    bounds: Aabb,
    resolution: [usize; 3],
    cell_size: Vec3,
    /// `cell_start[c]..cell_start[c + 1]` indexes into `cell_items`.
    cell_start: Vec<u32>,
    cell_items: Vec<u32>,
    unbounded: Vec<u32>,
}

impl RegularGrid {
    pub fn new(primitives: Arc<[Primitive]>) -> Result<Self, BuildError> {
        if u32::try_from(primitives.len()).is_err() {
            return Err(BuildError::TooManyPrimitives(primitives.len()));
        }

        let mut unbounded = Vec::new();
        let mut bounds = Aabb::EMPTY;
        let mut bounded = 0usize;
        for (i, p) in primitives.iter().enumerate() {
            if matches!(p.shape, Shape::Plane(_)) {
                unbounded.push(i as u32);
            } else {
                bounds = Aabb::surrounding(&bounds, &p.bounding_box());
                bounded += 1;
            }
        }

        if bounded == 0 {
            return Ok(Self {
                primitives,
                bounds: Aabb::EMPTY,
                resolution: [0; 3],
                cell_size: Vec3::ZERO,
                cell_start: vec![0],
                cell_items: Vec::new(),
                unbounded,
            });
        }

        let resolution = Self::resolution_for(&bounds, bounded);
        let cell_size = bounds.extent() / Vec3::new(
            resolution[0] as f32,
            resolution[1] as f32,
            resolution[2] as f32,
        );
        let cell_count = resolution[0] * resolution[1] * resolution[2];

        let mut grid = Self {
            primitives,
            bounds,
            resolution,
            cell_size,
            cell_start: Vec::new(),
            cell_items: Vec::new(),
            unbounded,
        };

        // Counting pass, then fill pass.
        let mut counts = try_zeroed(cell_count + 1)?;
        grid.for_each_overlap(|cell, _| counts[cell] += 1);

        let mut total = 0u32;
        for count in counts.iter_mut() {
            let c = *count;
            *count = total;
            total += c;
        }
        let mut cursor = counts.clone();
        let mut items = try_zeroed(total as usize)?;
        grid.for_each_overlap(|cell, prim| {
            items[cursor[cell] as usize] = prim;
            cursor[cell] += 1;
        });

        grid.cell_start = counts;
        grid.cell_items = items;

        log::debug!(
            "Built {}x{}x{} grid with {} references ({} unbounded primitives)",
            resolution[0],
            resolution[1],
            resolution[2],
            total,
            grid.unbounded.len()
        );
        Ok(grid)
    }

    /// Cube-root heuristic: about `DENSITY` primitives per voxel.
    fn resolution_for(bounds: &Aabb, count: usize) -> [usize; 3] {
        let extent = bounds.extent();
        let volume = (extent.x * extent.y * extent.z).max(f32::MIN_POSITIVE);
        let per_unit = (DENSITY * count as f32 / volume).cbrt();
        let axis = |e: f32| ((e * per_unit) as usize).clamp(1, MAX_RESOLUTION);
        [axis(extent.x), axis(extent.y), axis(extent.z)]
    }

    pub fn resolution(&self) -> [usize; 3] {
        self.resolution
    }

    fn cell_index(&self, cell: [usize; 3]) -> usize {
        (cell[2] * self.resolution[1] + cell[1]) * self.resolution[0] + cell[0]
    }

    fn cell_of(&self, p: Vec3, axis: usize) -> usize {
        let offset = (p[axis] - self.bounds.axis_interval(axis).min) / self.cell_size[axis];
        (offset.max(0.0) as usize).min(self.resolution[axis] - 1)
    }

    fn for_each_overlap(&self, mut f: impl FnMut(usize, u32)) {
        for (i, p) in self.primitives.iter().enumerate() {
            if matches!(p.shape, Shape::Plane(_)) {
                continue;
            }
            let bbox = p.bounding_box();
            let (lo, hi) = (bbox.min_point(), bbox.max_point());
            let min = [self.cell_of(lo, 0), self.cell_of(lo, 1), self.cell_of(lo, 2)];
            let max = [self.cell_of(hi, 0), self.cell_of(hi, 1), self.cell_of(hi, 2)];
            for z in min[2]..=max[2] {
                for y in min[1]..=max[1] {
                    for x in min[0]..=max[0] {
                        f(self.cell_index([x, y, z]), i as u32);
                    }
                }
            }
        }
    }

    fn cell_items(&self, cell: usize) -> &[u32] {
        let start = self.cell_start[cell] as usize;
        let end = self.cell_start[cell + 1] as usize;
        &self.cell_items[start..end]
    }

    /// Nearest hit inside `ray_t`.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<Intersection> {
        let mut closest: Option<Intersection> = None;
        let mut max = ray_t.max;

        for &i in &self.unbounded {
            let i = i as usize;
            if let Some(hit) = self.primitives[i].intersect(i, ray, ray_t.with_max(max)) {
                max = hit.t;
                closest = Some(hit);
            }
        }

        self.walk(ray, ray_t.with_max(max), |cell, cell_exit| {
            for &i in self.cell_items(cell) {
                let i = i as usize;
                if let Some(hit) = self.primitives[i].intersect(i, ray, ray_t.with_max(max)) {
                    max = hit.t;
                    closest = Some(hit);
                }
            }
            // Hits beyond this voxel may still be beaten by a later voxel.
            max > cell_exit
        });

        closest
    }

    /// True if anything lies inside `ray_t`.
    pub fn occluded(&self, ray: &Ray, ray_t: Interval) -> bool {
        let blocked = self
            .unbounded
            .iter()
            .any(|&i| self.primitives[i as usize].shape.intersect(ray, ray_t).is_some());
        if blocked {
            return true;
        }

        let mut found = false;
        self.walk(ray, ray_t, |cell, _| {
            found = self
                .cell_items(cell)
                .iter()
                .any(|&i| self.primitives[i as usize].shape.intersect(ray, ray_t).is_some());
            !found
        });
        found
    }

    /// Visit the voxels pierced by the ray in front-to-back order.
    ///
    /// `visit` receives the voxel index and the ray parameter where the ray
    /// leaves it, and returns whether to keep walking.
    fn walk(&self, ray: &Ray, ray_t: Interval, mut visit: impl FnMut(usize, f32) -> bool) {
        if self.cell_start.len() <= 1 {
            return;
        }
        let Some(range) = self.bounds.clip(ray, ray_t) else {
            return;
        };

        let entry = ray.at(range.min);
        let mut cell = [self.cell_of(entry, 0), self.cell_of(entry, 1), self.cell_of(entry, 2)];
        let mut step = [0isize; 3];
        let mut t_next = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];

        for axis in 0..3 {
            let dir = ray.direction[axis];
            let origin = ray.origin[axis];
            let min = self.bounds.axis_interval(axis).min;
            let size = self.cell_size[axis];
            if dir > 0.0 {
                step[axis] = 1;
                t_next[axis] = (min + (cell[axis] + 1) as f32 * size - origin) / dir;
                t_delta[axis] = size / dir;
            } else if dir < 0.0 {
                step[axis] = -1;
                t_next[axis] = (min + cell[axis] as f32 * size - origin) / dir;
                t_delta[axis] = -size / dir;
            }
        }

        loop {
            let axis = if t_next[0] < t_next[1] && t_next[0] < t_next[2] {
                0
            } else if t_next[1] < t_next[2] {
                1
            } else {
                2
            };
            let cell_exit = t_next[axis].min(range.max);

            if !visit(self.cell_index(cell), cell_exit) {
                return;
            }
            if t_next[axis] > range.max {
                return;
            }

            let next = cell[axis] as isize + step[axis];
            if next < 0 || next >= self.resolution[axis] as isize {
                return;
            }
            cell[axis] = next as usize;
            t_next[axis] += t_delta[axis];
        }
    }
}

/// Zero-filled vector whose allocation failure is reported instead of aborting.
fn try_zeroed(len: usize) -> Result<Vec<u32>, BuildError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| BuildError::OutOfMemory {
            bytes: len.saturating_mul(std::mem::size_of::<u32>()),
        })?;
    v.resize(len, 0);
    Ok(v)
}
