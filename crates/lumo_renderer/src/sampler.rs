//! Per-sample offsets for pixel jitter, light sampling and bounce directions.
//!
//! A sampler is a pure function of `(pixel, sample, base)`: it keeps no
//! mutable state, so workers share one instance without synchronization and
//! a render is reproducible run to run.

use lumo_core::SamplerKind;
use lumo_math::halton_sequence;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dimension bases. Distinct primes keep the sample streams decorrelated.
pub mod dimension {
    pub const PIXEL_X: u32 = 2;
    pub const PIXEL_Y: u32 = 3;
    pub const LIGHT_U: u32 = 5;
    pub const LIGHT_V: u32 = 7;
    pub const BOUNCE_U: u32 = 11;
    pub const BOUNCE_V: u32 = 13;
    pub const ROULETTE: u32 = 17;
    pub const LOBE: u32 = 19;
}

/// Largest f32 strictly below 1.
const ONE_MINUS_EPSILON: f32 = 1.0 - f32::EPSILON / 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampler {
    /// Always returns the same value.
    Constant(f32),
    /// Halton sequence with a per-pixel rotation.
    Halton,
    /// One jittered stratum per sample index.
    Stratified { strata: u32 },
    /// Pseudo-random values seeded from the arguments.
    Random,
}

impl Sampler {
    /// Sampler for `kind` rendering `samples_pixel` samples per pixel.
    pub fn new(kind: SamplerKind, samples_pixel: u32) -> Self {
        match kind {
            SamplerKind::Constant => Sampler::Constant(0.5),
            SamplerKind::Halton => Sampler::Halton,
            SamplerKind::Stratified => Sampler::Stratified {
                strata: samples_pixel.max(1),
            },
            SamplerKind::Random => Sampler::Random,
        }
    }

    /// Value in [0, 1) for the `sample`-th sample of `pixel` in dimension `base`.
    pub fn sample(&self, pixel: u32, sample: u32, base: u32) -> f32 {
        let value = match *self {
            Sampler::Constant(value) => value,
            Sampler::Halton => {
                // Cranley-Patterson rotation so neighbouring pixels do not
                // share the exact same point set.
                let shift = unit(mix(pixel, base, 0));
                let x = halton_sequence(sample.wrapping_add(1), base) + shift;
                x - x.floor()
            }
            Sampler::Stratified { strata } => {
                let jitter = unit(mix(pixel, sample, base));
                let stratum = (sample % strata) as f32;
                // Scramble the stratum order per dimension.
                let offset = (mix(pixel, base, 1) % u64::from(strata)) as f32;
                (((stratum + offset) % strata as f32) + jitter) / strata as f32
            }
            Sampler::Random => {
                let mut rng = StdRng::seed_from_u64(mix(pixel, sample, base));
                rng.gen::<f32>()
            }
        };
        value.clamp(0.0, ONE_MINUS_EPSILON)
    }
}

/// 64-bit finalizer (splitmix64) over the packed arguments.
fn mix(a: u32, b: u32, c: u32) -> u64 {
    let packed = (u64::from(a) << 32) | u64::from(b);
    let mut z = packed ^ u64::from(c).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Map the top 24 bits of a hash into [0, 1).
fn unit(hash: u64) -> f32 {
    (hash >> 40) as f32 / (1u64 << 24) as f32
}
