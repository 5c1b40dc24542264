//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! Uses a binary tree over primitive indices for efficient ray-scene
//! intersection testing. Geometry stays in the scene's shared slice.

use std::sync::Arc;

use lumo_core::{Intersection, Primitive};
use lumo_math::{Aabb, Interval, Ray};

/// Maximum primitives per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

/// BVH node - either a branch with two children or a leaf with primitives.
///
/// Using an enum allows for more cache-efficient traversal since
/// we avoid dynamic dispatch overhead.
#[derive(Debug)]
enum BvhNode {
    /// Internal node with two children.
    Branch {
        left: Box<BvhNode>,
        right: Box<BvhNode>,
        bbox: Aabb,
    },
    /// Leaf node with a small number of primitive indices.
    Leaf { indices: Vec<usize>, bbox: Aabb },
    /// Empty node (for edge cases).
    Empty,
}

/// Median-split BVH over a shared primitive list.
#[derive(Debug)]
pub struct Bvh {
    primitives: Arc<[Primitive]>,
    root: BvhNode,
    node_count: usize,
}

impl Bvh {
    /// Create a BVH over all `primitives`.
    pub fn new(primitives: Arc<[Primitive]>) -> Self {
        let entries: Vec<(usize, Aabb)> = primitives
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.bounding_box()))
            .collect();

        let mut node_count = 0;
        let root = if entries.is_empty() {
            BvhNode::Empty
        } else {
            Self::build(entries, &mut node_count)
        };

        Self {
            primitives,
            root,
            node_count,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Recursive BVH construction.
    ///
    /// Simple median-split approach: sort entries by centroid on the axis
    /// of largest centroid spread, split in half, recurse.
    fn build(mut entries: Vec<(usize, Aabb)>, node_count: &mut usize) -> BvhNode {
        *node_count += 1;
        let n = entries.len();

        let bounds = entries
            .iter()
            .fold(Aabb::EMPTY, |acc, (_, b)| Aabb::surrounding(&acc, b));

        if n <= LEAF_MAX_SIZE {
            return BvhNode::Leaf {
                indices: entries.into_iter().map(|(i, _)| i).collect(),
                bbox: bounds,
            };
        }

        let centroid_bounds = entries.iter().fold(Aabb::EMPTY, |acc, (_, b)| {
            let c = b.centroid();
            Aabb::surrounding(&acc, &Aabb::from_points(c, c))
        });
        let axis = centroid_bounds.longest_axis();

        entries.sort_unstable_by(|(_, a), (_, b)| {
            a.centroid()[axis]
                .partial_cmp(&b.centroid()[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mid = n / 2;
        let right_entries = entries.split_off(mid);
        let left = Self::build(entries, node_count);
        let right = Self::build(right_entries, node_count);

        BvhNode::Branch {
            left: Box::new(left),
            right: Box::new(right),
            bbox: bounds,
        }
    }

    /// Nearest hit inside `ray_t`.
    pub fn intersect(&self, ray: &Ray, ray_t: Interval) -> Option<Intersection> {
        let mut closest = None;
        self.hit_node(&self.root, ray, ray_t, &mut closest);
        closest
    }

    fn hit_node(
        &self,
        node: &BvhNode,
        ray: &Ray,
        ray_t: Interval,
        closest: &mut Option<Intersection>,
    ) {
        match node {
            BvhNode::Empty => {}

            BvhNode::Leaf { indices, bbox } => {
                if !bbox.hit(ray, ray_t) {
                    return;
                }
                let mut max = ray_t.max;
                for &i in indices {
                    if let Some(hit) = self.primitives[i].intersect(i, ray, ray_t.with_max(max)) {
                        max = hit.t;
                        *closest = Some(hit);
                    }
                }
            }

            BvhNode::Branch { left, right, bbox } => {
                if !bbox.hit(ray, ray_t) {
                    return;
                }
                self.hit_node(left, ray, ray_t, closest);

                // Only check right up to closest hit
                let right_max = closest.map_or(ray_t.max, |hit| hit.t);
                self.hit_node(right, ray, ray_t.with_max(right_max), closest);
            }
        }
    }

    /// True if anything lies inside `ray_t`.
    pub fn occluded(&self, ray: &Ray, ray_t: Interval) -> bool {
        self.any_hit(&self.root, ray, ray_t)
    }

    fn any_hit(&self, node: &BvhNode, ray: &Ray, ray_t: Interval) -> bool {
        match node {
            BvhNode::Empty => false,
            BvhNode::Leaf { indices, bbox } => {
                bbox.hit(ray, ray_t)
                    && indices
                        .iter()
                        .any(|&i| self.primitives[i].shape.intersect(ray, ray_t).is_some())
            }
            BvhNode::Branch { left, right, bbox } => {
                bbox.hit(ray, ray_t)
                    && (self.any_hit(left, ray, ray_t) || self.any_hit(right, ray, ray_t))
            }
        }
    }
}
