//! Render configuration chosen by the host before a render starts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Spatial index used to answer ray queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceleratorKind {
    /// Test every primitive.
    Naive,
    /// Uniform voxel grid traversed with a 3D-DDA.
    RegularGrid,
    /// Bounding volume hierarchy.
    #[default]
    Bvh,
}

/// Light transport policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderKind {
    /// Grey level from the hit distance.
    DepthMap,
    /// Diffuse color of the hit material, no lighting.
    DiffuseMaterial,
    /// Direct lighting without shadow rays.
    NoShadows,
    /// Direct lighting with shadows plus mirror and glass recursion.
    #[default]
    Whitted,
    /// Monte Carlo path tracing.
    PathTracer,
}

/// Source of the per-sample offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerKind {
    /// Always the center of the domain.
    Constant,
    /// Halton low-discrepancy sequence.
    #[default]
    Halton,
    /// Jittered strata.
    Stratified,
    /// Hash-seeded pseudo-random numbers.
    Random,
}

/// Deepest bounce chain a shader may follow.
pub const MAX_RAY_DEPTH: u32 = 64;

/// Largest image the engine accepts; pixel indices are `u32`.
pub const MAX_PIXELS: u64 = u32::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Image resolution must be non-zero, got {width}x{height}")]
    Resolution { width: u32, height: u32 },

    #[error("Samples per pixel must be at least 1")]
    SamplesPixel,

    #[error("Samples per light must be at least 1")]
    SamplesLight,

    #[error("Thread count must be at least 1")]
    Threads,

    #[error("Maximum ray depth must be between 1 and {}, got {0}", MAX_RAY_DEPTH)]
    MaxDepth(u32),

    #[error("Image of {width}x{height} exceeds {} pixels", MAX_PIXELS)]
    TooManyPixels { width: u32, height: u32 },
}

/// Everything the engine needs besides the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Camera samples per pixel (spp)
    pub samples_pixel: u32,
    /// Light samples per camera sample (spl)
    pub samples_light: u32,
    /// Size of the worker pool
    pub threads: u32,
    /// Maximum number of bounces a shader may follow, at most
    /// [`MAX_RAY_DEPTH`]
    pub max_depth: u32,
    pub accelerator: AcceleratorKind,
    pub shader: ShaderKind,
    pub sampler: SamplerKind,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            samples_pixel: 1,
            samples_light: 1,
            threads: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1),
            max_depth: 6,
            accelerator: AcceleratorKind::default(),
            shader: ShaderKind::default(),
            sampler: SamplerKind::default(),
        }
    }
}

impl RenderConfig {
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_samples(mut self, samples_pixel: u32, samples_light: u32) -> Self {
        self.samples_pixel = samples_pixel;
        self.samples_light = samples_light;
        self
    }

    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_variants(
        mut self,
        accelerator: AcceleratorKind,
        shader: ShaderKind,
        sampler: SamplerKind,
    ) -> Self {
        self.accelerator = accelerator;
        self.shader = shader;
        self.sampler = sampler;
        self
    }

    /// Check every numeric bound the engine depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Resolution {
                width: self.width,
                height: self.height,
            });
        }
        if u64::from(self.width) * u64::from(self.height) > MAX_PIXELS {
            return Err(ConfigError::TooManyPixels {
                width: self.width,
                height: self.height,
            });
        }
        if self.samples_pixel == 0 {
            return Err(ConfigError::SamplesPixel);
        }
        if self.samples_light == 0 {
            return Err(ConfigError::SamplesLight);
        }
        if self.threads == 0 {
            return Err(ConfigError::Threads);
        }
        if self.max_depth == 0 || self.max_depth > MAX_RAY_DEPTH {
            return Err(ConfigError::MaxDepth(self.max_depth));
        }
        Ok(())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}
