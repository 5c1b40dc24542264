//! End-to-end tests driving the render engine through its public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lumo_core::{
    demo, AcceleratorKind, Camera, ConfigError, Material, RenderConfig, SamplerKind, Scene,
    ShaderKind, MAX_RAY_DEPTH,
};
use lumo_math::{Color, Vec3};
use lumo_renderer::{
    FrameBuffer, NullObserver, RenderEngine, RenderError, RenderObserver, RenderOutcome,
    RenderState, TileProgress, OPAQUE_BLACK,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn depth_config(width: u32, height: u32) -> RenderConfig {
    RenderConfig::default()
        .with_resolution(width, height)
        .with_samples(1, 1)
        .with_threads(2)
        .with_variants(AcceleratorKind::Bvh, ShaderKind::DepthMap, SamplerKind::Constant)
}

/// Enough work that no render finishes before a stop request arrives.
fn heavy_config(threads: u32) -> RenderConfig {
    RenderConfig::default()
        .with_resolution(256, 256)
        .with_samples(64, 4)
        .with_threads(threads)
        .with_variants(AcceleratorKind::RegularGrid, ShaderKind::PathTracer, SamplerKind::Halton)
}

#[test]
fn test_depth_render_separates_hits_from_background() {
    init_logging();
    let engine = RenderEngine::new();
    let frame = engine
        .start(demo::single_triangle(), depth_config(32, 32), Arc::new(NullObserver))
        .unwrap();

    assert_eq!(engine.wait(), RenderState::Finished);

    let hit = frame.pixel(16, 16);
    let miss = frame.pixel(0, 0);
    assert_ne!(hit, miss);
    assert_eq!(miss, OPAQUE_BLACK);
    assert_eq!(frame.sample_count(0, 0), 1);
    assert_eq!(frame.total_samples(), 32 * 32);
}

#[test]
fn test_stop_right_after_start_always_stops() {
    init_logging();
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);

    let engine = RenderEngine::new();
    for threads in 1..=cores {
        let frame = engine
            .start(demo::cornell_box(), heavy_config(threads), Arc::new(NullObserver))
            .unwrap();
        engine.stop();

        assert_eq!(engine.wait(), RenderState::Stopped, "threads = {threads}");
        assert!(frame.total_samples() < 256 * 256 * 64);
        assert!(matches!(engine.last_outcome(), Some(RenderOutcome::Stopped { .. })));
        assert!(engine.acknowledge().unwrap().is_some());
    }
}

#[test]
fn test_start_while_busy_is_rejected() {
    init_logging();
    let engine = RenderEngine::new();
    let frame = engine
        .start(demo::cornell_box(), heavy_config(2), Arc::new(NullObserver))
        .unwrap();

    let err = engine
        .start(demo::single_triangle(), depth_config(8, 8), Arc::new(NullObserver))
        .unwrap_err();
    assert!(err.is_configuration_error());
    assert!(matches!(err, RenderError::InvalidState { state: RenderState::Busy, .. }));

    let current = engine.frame_buffer().unwrap();
    assert!(Arc::ptr_eq(&current, &frame));
    assert_eq!((current.width(), current.height()), (256, 256));

    engine.stop();
    assert_eq!(engine.wait(), RenderState::Stopped);
}

#[test]
fn test_acknowledge_twice_is_noop() {
    init_logging();
    let engine = RenderEngine::new();
    engine
        .start(demo::single_triangle(), depth_config(8, 8), Arc::new(NullObserver))
        .unwrap();
    engine.wait();

    assert!(engine.acknowledge().unwrap().is_some());
    assert!(engine.acknowledge().unwrap().is_none());
    assert_eq!(engine.current_state(), RenderState::Idle);
    // Outcome stays readable after acknowledging
    assert!(matches!(engine.last_outcome(), Some(RenderOutcome::Finished { .. })));
}

#[test]
fn test_acknowledge_while_busy_fails() {
    init_logging();
    let engine = RenderEngine::new();
    engine
        .start(demo::cornell_box(), heavy_config(1), Arc::new(NullObserver))
        .unwrap();

    let err = engine.acknowledge().unwrap_err();
    assert!(matches!(err, RenderError::InvalidState { action: "acknowledge", .. }));

    engine.stop();
    engine.wait();
    assert!(engine.acknowledge().is_ok());
}

#[test]
fn test_config_errors_are_synchronous() {
    init_logging();
    let engine = RenderEngine::new();
    let cases = [
        (depth_config(0, 8), ConfigError::Resolution { width: 0, height: 8 }),
        (depth_config(8, 8).with_samples(0, 1), ConfigError::SamplesPixel),
        (depth_config(8, 8).with_samples(1, 0), ConfigError::SamplesLight),
        (depth_config(8, 8).with_threads(0), ConfigError::Threads),
        (
            depth_config(65536, 65536),
            ConfigError::TooManyPixels {
                width: 65536,
                height: 65536,
            },
        ),
    ];

    for (config, expected) in cases {
        let err = engine
            .start(demo::single_triangle(), config, Arc::new(NullObserver))
            .unwrap_err();
        assert_eq!(err, RenderError::InvalidConfig(expected));
        assert_eq!(engine.current_state(), RenderState::Idle);
    }
}

#[test]
fn test_deep_mirror_render_stays_bounded() {
    init_logging();
    let mut builder = Scene::builder().camera(Camera::perspective(
        Vec3::ZERO,
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::Y,
        60.0,
    ));
    let mirror = builder.add_material(Material::mirror(Color::ONE));
    builder.add_sphere(Vec3::ZERO, 5.0, mirror);

    let mut config = depth_config(4, 4).with_threads(1).with_variants(
        AcceleratorKind::Bvh,
        ShaderKind::Whitted,
        SamplerKind::Constant,
    );
    config.max_depth = MAX_RAY_DEPTH;

    let engine = RenderEngine::new();
    let frame = engine
        .start(builder.build(), config, Arc::new(NullObserver))
        .unwrap();
    assert_eq!(engine.wait(), RenderState::Finished);
    assert_eq!(frame.total_samples(), 16);
}

#[derive(Default)]
struct Recorder {
    tiles: AtomicUsize,
    total: AtomicUsize,
    outcomes: Mutex<Vec<RenderState>>,
}

impl RenderObserver for Recorder {
    fn on_tile_complete(&self, progress: &TileProgress, frame: &FrameBuffer) {
        self.tiles.fetch_add(1, Ordering::SeqCst);
        self.total.store(progress.total, Ordering::SeqCst);
        // Every pixel of a reported bucket is already accumulated
        let b = progress.bucket;
        assert!(frame.sample_count(b.x, b.y) >= 1);
        assert!(frame.sample_count(b.x + b.width - 1, b.y + b.height - 1) >= 1);
    }

    fn on_render_end(&self, outcome: &RenderOutcome) {
        self.outcomes.lock().unwrap().push(outcome.state());
    }
}

#[test]
fn test_observer_sees_every_tile_and_one_end() {
    init_logging();
    let engine = RenderEngine::new();
    let recorder = Arc::new(Recorder::default());
    engine
        .start(demo::spheres(), depth_config(40, 30).with_threads(3), recorder.clone())
        .unwrap();
    assert_eq!(engine.wait(), RenderState::Finished);
    engine.acknowledge().unwrap();

    let tiles = recorder.tiles.load(Ordering::SeqCst);
    assert!(tiles > 0);
    assert_eq!(tiles, recorder.total.load(Ordering::SeqCst));
    assert_eq!(*recorder.outcomes.lock().unwrap(), vec![RenderState::Finished]);
}

#[test]
fn test_every_variant_renders() {
    init_logging();
    let engine = RenderEngine::new();
    let accelerators = [
        AcceleratorKind::Naive,
        AcceleratorKind::RegularGrid,
        AcceleratorKind::Bvh,
    ];
    let shaders = [
        ShaderKind::DepthMap,
        ShaderKind::DiffuseMaterial,
        ShaderKind::NoShadows,
        ShaderKind::Whitted,
        ShaderKind::PathTracer,
    ];
    let samplers = [
        SamplerKind::Constant,
        SamplerKind::Halton,
        SamplerKind::Stratified,
        SamplerKind::Random,
    ];

    for (i, shader) in shaders.into_iter().enumerate() {
        let config = RenderConfig::default()
            .with_resolution(12, 12)
            .with_samples(2, 1)
            .with_threads(2)
            .with_variants(accelerators[i % 3], shader, samplers[i % 4]);
        let frame = engine
            .start(demo::cornell_box(), config, Arc::new(NullObserver))
            .unwrap();
        assert_eq!(engine.wait(), RenderState::Finished, "{shader:?}");
        assert_eq!(frame.total_samples(), 12 * 12 * 2);
        assert!(
            frame.snapshot().iter().any(|&p| p != OPAQUE_BLACK),
            "{shader:?} rendered nothing"
        );
        engine.acknowledge().unwrap();
    }
}
