//! Bucket-based tile rendering.
//!
//! Divides the image into tiles (buckets) that workers render
//! independently. Buckets never overlap, so each pixel has one writer.

use std::sync::atomic::{AtomicBool, Ordering};

use lumo_core::{RenderConfig, Scene};
use lumo_math::{normalize_color, round_down_to_multiple_of};

use crate::accelerator::Accelerator;
use crate::frame_buffer::FrameBuffer;
use crate::sampler::{dimension, Sampler};
use crate::shader::{ShadeContext, Shader};

/// Buckets per worker along each image axis.
pub const TILES_PER_THREAD: u32 = 2;

/// A rectangular region of the image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// X coordinate of bucket's top-left corner
    pub x: u32,
    /// Y coordinate of bucket's top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Position of this bucket in the render order
    pub index: usize,
}

impl Bucket {
    pub fn new(x: u32, y: u32, width: u32, height: u32, index: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
            index,
        }
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }
}

/// Tile edge along an axis of `extent` pixels split into about `divisions`.
///
/// The extent is first aligned with [`round_down_to_multiple_of`] so most
/// tiles share one size; leftover pixels form clipped tiles on the far edge.
fn tile_size(extent: u32, divisions: u32) -> u32 {
    let divisions = divisions.clamp(1, extent.max(1));
    (round_down_to_multiple_of(extent, divisions) / divisions).max(1)
}

/// Generate buckets covering a `width` x `height` image for `threads` workers,
/// sorted in spiral order from the center.
///
/// Production renderers such as V-Ray and RenderMan render from the center
/// outward so the most important part of the frame shows up first.
pub fn generate_buckets(width: u32, height: u32, threads: u32) -> Vec<Bucket> {
    let per_axis = threads.max(1).saturating_mul(TILES_PER_THREAD);
    let tile_w = tile_size(width, per_axis);
    let tile_h = tile_size(height, per_axis);

    let mut buckets = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let bw = tile_w.min(width - x);
            let bh = tile_h.min(height - y);
            buckets.push(Bucket::new(x, y, bw, bh, buckets.len()));
            x += tile_w;
        }
        y += tile_h;
    }

    sort_spiral(&mut buckets, width, height);
    for (i, bucket) in buckets.iter_mut().enumerate() {
        bucket.index = i;
    }

    buckets
}

/// Sort buckets by distance from the image center.
fn sort_spiral(buckets: &mut [Bucket], width: u32, height: u32) {
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;
    let distance = |b: &Bucket| {
        let dx = b.x as f32 + b.width as f32 / 2.0 - center_x;
        let dy = b.y as f32 + b.height as f32 / 2.0 - center_y;
        dx * dx + dy * dy
    };

    buckets.sort_by(|a, b| {
        distance(a)
            .partial_cmp(&distance(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Read-only state shared by every worker of one render.
pub struct TileRenderer<'a> {
    pub scene: &'a Scene,
    pub accelerator: &'a Accelerator,
    pub shader: Shader,
    pub sampler: Sampler,
    pub config: &'a RenderConfig,
}

impl TileRenderer<'_> {
    /// Render every pixel of `bucket` into `frame`, `samples_pixel` samples
    /// each.
    ///
    /// `cancel` is polled before every pixel. Returns `false` if the bucket
    /// was abandoned; pixels already written keep their samples.
    pub fn render_bucket(
        &self,
        bucket: &Bucket,
        frame: &FrameBuffer,
        cancel: &AtomicBool,
    ) -> bool {
        let aspect = self.config.aspect_ratio();
        let width = self.config.width as f32;
        let height = self.config.height as f32;

        for y in bucket.y..bucket.y + bucket.height {
            for x in bucket.x..bucket.x + bucket.width {
                if cancel.load(Ordering::Relaxed) {
                    return false;
                }
                // Validated configs keep width * height within u32
                let pixel = y * self.config.width + x;

                for sample in 0..self.config.samples_pixel {
                    let jx = self.sampler.sample(pixel, sample, dimension::PIXEL_X);
                    let jy = self.sampler.sample(pixel, sample, dimension::PIXEL_Y);
                    let ray = self.scene.camera().ray(
                        (x as f32 + jx) / width,
                        (y as f32 + jy) / height,
                        aspect,
                    );

                    let ctx = ShadeContext {
                        scene: self.scene,
                        accelerator: self.accelerator,
                        sampler: &self.sampler,
                        pixel,
                        sample,
                        samples_light: self.config.samples_light,
                        max_depth: self.config.max_depth,
                    };
                    let color = self.shader.trace(&ctx, &ray);
                    frame.accumulate(x, y, normalize_color(color));
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::{demo, AcceleratorKind, ShaderKind};
    use std::collections::HashSet;

    fn covered_pixels(buckets: &[Bucket]) -> HashSet<(u32, u32)> {
        let mut seen = HashSet::new();
        for b in buckets {
            for y in b.y..b.y + b.height {
                for x in b.x..b.x + b.width {
                    assert!(seen.insert((x, y)), "pixel ({x}, {y}) is in two buckets");
                }
            }
        }
        seen
    }

    #[test]
    fn test_generate_buckets_exact_fit() {
        let buckets = generate_buckets(128, 128, 2);
        assert_eq!(buckets.len(), 16); // 4x4 grid

        let total_pixels: u32 = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total_pixels, 128 * 128);
    }

    #[test]
    fn test_generate_buckets_partial_fit() {
        let buckets = generate_buckets(101, 37, 3);
        let total_pixels: u32 = buckets.iter().map(|b| b.pixel_count()).sum();
        assert_eq!(total_pixels, 101 * 37);
        assert_eq!(covered_pixels(&buckets).len(), 101 * 37);
    }

    #[test]
    fn test_more_threads_than_pixels() {
        let buckets = generate_buckets(3, 2, 64);
        assert_eq!(covered_pixels(&buckets).len(), 6);
        assert!(buckets.iter().all(|b| b.pixel_count() >= 1));
    }

    #[test]
    fn test_spiral_order() {
        // 62 pixel tiles plus a 2 pixel edge column and row
        let buckets = generate_buckets(250, 250, 2);
        assert_eq!(buckets.len(), 25);

        let first = &buckets[0];
        assert_eq!((first.x, first.y), (124, 124));
        let order: Vec<usize> = buckets.iter().map(|b| b.index).collect();
        assert_eq!(order, (0..buckets.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_render_bucket_respects_cancel() {
        let scene = demo::single_triangle();
        let config = RenderConfig::default().with_resolution(8, 8);
        let accelerator =
            Accelerator::build(AcceleratorKind::Naive, scene.primitives().clone()).unwrap();
        let renderer = TileRenderer {
            scene: &scene,
            accelerator: &accelerator,
            shader: Shader::new(ShaderKind::DepthMap, &scene),
            sampler: Sampler::new(config.sampler, config.samples_pixel),
            config: &config,
        };
        let frame = FrameBuffer::new(8, 8).unwrap();
        let bucket = Bucket::new(0, 0, 8, 8, 0);

        assert!(!renderer.render_bucket(&bucket, &frame, &AtomicBool::new(true)));
        assert_eq!(frame.total_samples(), 0);

        assert!(renderer.render_bucket(&bucket, &frame, &AtomicBool::new(false)));
        assert_eq!(frame.total_samples(), 64);
    }
}
