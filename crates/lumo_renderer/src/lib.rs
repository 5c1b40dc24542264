//! Lumo Renderer - progressive CPU ray tracing.
//!
//! The [`RenderEngine`] takes a [`Scene`](lumo_core::Scene) and a
//! [`RenderConfig`](lumo_core::RenderConfig), builds the chosen
//! [`Accelerator`], and renders buckets of the image on a worker pool into
//! a shared [`FrameBuffer`] that the host can display while samples arrive.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lumo_core::{demo, RenderConfig};
//! use lumo_renderer::{NullObserver, RenderEngine, RenderState};
//!
//! let engine = RenderEngine::new();
//! let config = RenderConfig::default().with_resolution(128, 128);
//! engine.start(demo::cornell_box(), config, Arc::new(NullObserver)).unwrap();
//! assert_eq!(engine.wait(), RenderState::Finished);
//! let frame = engine.acknowledge().unwrap().unwrap();
//! let rgba = frame.to_rgba_bytes();
//! ```

mod accelerator;
mod bucket;
mod bvh;
mod engine;
mod error;
mod frame_buffer;
mod grid;
mod sampler;
mod shader;

pub use accelerator::{Accelerator, BuildError, Naive, T_MIN};
pub use bucket::{generate_buckets, Bucket, TileRenderer, TILES_PER_THREAD};
pub use bvh::Bvh;
pub use engine::{
    NullObserver, RenderEngine, RenderObserver, RenderOutcome, RenderState, TileProgress,
};
pub use error::{MemoryInfo, RenderError};
pub use frame_buffer::{FrameBuffer, OPAQUE_BLACK};
pub use grid::RegularGrid;
pub use sampler::{dimension, Sampler};
pub use shader::{ShadeContext, Shader};
