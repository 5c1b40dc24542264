//! Numeric helpers shared by the sampler, shaders and render engine.

use crate::{Vec2, Vec3};

/// Tolerance used by [`equal`] and [`equal_vec3`].
pub const EPSILON: f32 = 1.0e-6;

/// Largest `f32` strictly below 1.0.
const ONE_MINUS_EPSILON: f32 = 1.0 - f32::EPSILON / 2.0;

/// Highest multiple of `multiple` that is not greater than `value`.
///
/// A remainder of 0 or 1 leaves `value` untouched, so a value one past a
/// multiple is kept as is instead of being snapped down. Tile sizing relies
/// on this threshold.
pub fn round_down_to_multiple_of(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    let rest = value % multiple;
    if rest > 1 {
        value - rest
    } else {
        value
    }
}

/// The `index`-th term of the Halton sequence in the given `base`.
///
/// Computed by reversing the digits of `index` in `base` around the radix
/// point. The result lies in [0, 1). `base` must be at least 2.
pub fn halton_sequence(mut index: u32, base: u32) -> f32 {
    debug_assert!(base >= 2, "halton base must be >= 2, got {base}");
    let base = base.max(2);
    let inv_base = 1.0 / f64::from(base);

    let mut fraction = 1.0_f64;
    let mut value = 0.0_f64;
    while index > 0 {
        fraction *= inv_base;
        value += fraction * f64::from(index % base);
        index /= base;
    }
    (value as f32).min(ONE_MINUS_EPSILON)
}

/// Fold a new sample into a packed running average.
///
/// `avg` is packed as `0xFF_BB_GG_RR` and `num_sample` counts the samples
/// including the new one. Each channel becomes
/// `((n - 1) * old + new) / n` clamped to 255. A `num_sample` of 0 is
/// treated as 1.
pub fn incremental_avg(sample: Vec3, avg: u32, num_sample: u32) -> u32 {
    let n = u64::from(num_sample.max(1));

    let channel = |shift: u32, value: f32| -> u32 {
        let last = u64::from((avg >> shift) & 0xFF);
        // `as` saturates: NaN and negatives become 0.
        let new = (value * 255.0) as u64;
        let current = ((n - 1) * last + new) / n;
        current.min(255) as u32
    };

    let r = channel(0, sample.x);
    let g = channel(8, sample.y);
    let b = channel(16, sample.z);

    0xFF00_0000 | (b << 16) | (g << 8) | r
}

/// Approximate float equality within [`EPSILON`].
#[inline]
pub fn equal(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// Component-wise approximate equality within [`EPSILON`].
#[inline]
pub fn equal_vec3(a: Vec3, b: Vec3) -> bool {
    equal(a.x, b.x) && equal(a.y, b.y) && equal(a.z, b.z)
}

/// False for NaN and infinities.
#[inline]
pub fn is_valid(value: f32) -> bool {
    value.is_finite()
}

#[inline]
pub fn is_valid_vec3(v: Vec3) -> bool {
    v.is_finite()
}

/// Wrap texture coordinates into [0, 1).
pub fn normalize_uv(uv: Vec2) -> Vec2 {
    uv - uv.floor()
}

/// Scale a color down by its brightest channel if that channel exceeds 1.
///
/// Keeps the hue; colors already inside [0, 1] are returned unchanged.
pub fn normalize_color(color: Vec3) -> Vec3 {
    let max = color.max_element();
    if max > 1.0 {
        color / max
    } else {
        color
    }
}

/// Fresnel reflectance for incident direction `i`, surface normal `n` and
/// index of refraction `ior`.
///
/// Returns 1.0 on total internal reflection. Transmittance is `1 - kr`.
pub fn fresnel(i: Vec3, n: Vec3, ior: f32) -> f32 {
    let mut cosi = i.dot(n).clamp(-1.0, 1.0);
    let (mut etai, mut etat) = (1.0_f32, ior);
    if cosi > 0.0 {
        std::mem::swap(&mut etai, &mut etat);
    }

    // Snell's law
    let sint = etai / etat * (1.0 - cosi * cosi).max(0.0).sqrt();
    if sint >= 1.0 {
        return 1.0;
    }

    let cost = (1.0 - sint * sint).max(0.0).sqrt();
    cosi = cosi.abs();
    let rs = (etat * cosi - etai * cost) / (etat * cosi + etai * cost);
    let rp = (etai * cosi - etat * cost) / (etai * cosi + etat * cost);
    ((rs * rs + rp * rp) / 2.0).clamp(0.0, 1.0)
}
