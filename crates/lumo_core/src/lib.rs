//! Lumo Core - scene and configuration value objects.
//!
//! This crate provides:
//!
//! - **Scene types**: `Scene`, `Primitive`, `Material`, `Light`, `Camera`
//! - **Render configuration**: `RenderConfig` and the accelerator, shader
//!   and sampler variant selectors
//! - **Demo scenes** that can be rendered without a file loader
//!
//! # Example
//!
//! ```
//! use lumo_core::{demo, RenderConfig};
//!
//! let scene = demo::cornell_box();
//! let config = RenderConfig::default().with_resolution(64, 64);
//! assert!(config.validate().is_ok());
//! assert!(scene.primitive_count() > 0);
//! ```

pub mod camera;
pub mod config;
pub mod demo;
pub mod scene;
pub mod shape;

// Re-export commonly used types
pub use camera::{Camera, Projection};
pub use config::{
    AcceleratorKind, ConfigError, RenderConfig, SamplerKind, ShaderKind, MAX_PIXELS, MAX_RAY_DEPTH,
};
pub use scene::{Intersection, Light, Material, MaterialId, Primitive, Scene, SceneBuilder};
pub use shape::{Plane, Shape, ShapeHit, Sphere, Triangle};
