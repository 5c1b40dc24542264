//! Progressive frame buffer shared between the workers and the host.
//!
//! Each pixel stores its running average packed as `0xAABBGGRR` plus the
//! number of samples folded into it. Workers write through atomics so the
//! host can read a consistent-per-pixel snapshot while a render is running.

use std::collections::TryReserveError;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use lumo_math::{incremental_avg, Color};

/// Packed value of a pixel that has not received any sample yet.
pub const OPAQUE_BLACK: u32 = 0xFF00_0000;

#[derive(Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<AtomicU32>,
    counts: Vec<AtomicU32>,
    total_samples: AtomicU64,
}

impl FrameBuffer {
    /// Allocate a `width` x `height` buffer of opaque black pixels.
    ///
    /// Fails instead of aborting when the pixels cannot be allocated.
    pub fn new(width: u32, height: u32) -> Result<Self, TryReserveError> {
        let len = (width as usize).saturating_mul(height as usize);
        Ok(Self {
            width,
            height,
            pixels: try_filled(len, OPAQUE_BLACK)?,
            counts: try_filled(len, 0)?,
            total_samples: AtomicU64::new(0),
        })
    }

    /// Size of the pixel storage in bytes.
    pub fn byte_size(width: u32, height: u32) -> u64 {
        u64::from(width) * u64::from(height) * 2 * std::mem::size_of::<AtomicU32>() as u64
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Fold one sample into the running average of pixel `(x, y)`.
    ///
    /// A pixel must only be written by one thread at a time; tiles are
    /// disjoint so the render workers satisfy this.
    pub fn accumulate(&self, x: u32, y: u32, sample: Color) {
        let i = self.index(x, y);
        let n = self.counts[i].load(Ordering::Relaxed) + 1;
        let avg = incremental_avg(sample, self.pixels[i].load(Ordering::Relaxed), n);
        self.pixels[i].store(avg, Ordering::Release);
        self.counts[i].store(n, Ordering::Release);
        self.total_samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Packed `0xAABBGGRR` value of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[self.index(x, y)].load(Ordering::Acquire)
    }

    /// Number of samples accumulated into pixel `(x, y)`.
    pub fn sample_count(&self, x: u32, y: u32) -> u32 {
        self.counts[self.index(x, y)].load(Ordering::Acquire)
    }

    /// Samples accumulated over the whole image.
    pub fn total_samples(&self) -> u64 {
        self.total_samples.load(Ordering::Relaxed)
    }

    /// Copy of every packed pixel in row-major order.
    pub fn snapshot(&self) -> Vec<u32> {
        self.pixels.iter().map(|p| p.load(Ordering::Acquire)).collect()
    }

    /// RGBA8 bytes in row-major order, ready for an image encoder.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        let words: Vec<u32> = self.snapshot().into_iter().map(u32::to_le).collect();
        bytemuck::cast_slice(&words).to_vec()
    }
}

fn try_filled(len: usize, value: u32) -> Result<Vec<AtomicU32>, TryReserveError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.extend((0..len).map(|_| AtomicU32::new(value)));
    Ok(v)
}
