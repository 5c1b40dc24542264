//! Progressive render engine and its state machine.
//!
//! ```text
//! Idle --start--> Busy --all tiles done--> Finished --acknowledge--> Idle
//!                  |----stop-------------> Stopped  --acknowledge--> Idle
//!                  '----error/panic------> Failed   --acknowledge--> Idle
//! ```
//!
//! A render runs on a coordinator thread that builds the accelerator and
//! drives a fixed pool of workers. Workers pull buckets from a shared
//! counter until none are left or the cancel flag is raised.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lumo_core::{RenderConfig, Scene};

use crate::accelerator::Accelerator;
use crate::bucket::{generate_buckets, Bucket, TileRenderer};
use crate::error::RenderError;
use crate::frame_buffer::FrameBuffer;
use crate::sampler::Sampler;
use crate::shader::Shader;

/// Lifecycle state of a [`RenderEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderState {
    Idle,
    Busy,
    Finished,
    Stopped,
    Failed,
}

impl RenderState {
    /// Finished, Stopped or Failed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RenderState::Finished | RenderState::Stopped | RenderState::Failed
        )
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderState::Idle => "idle",
            RenderState::Busy => "busy",
            RenderState::Finished => "finished",
            RenderState::Stopped => "stopped",
            RenderState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a render ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Finished { samples: u64, elapsed: Duration },
    Stopped { samples: u64, elapsed: Duration },
    Failed(RenderError),
}

impl RenderOutcome {
    pub fn state(&self) -> RenderState {
        match self {
            RenderOutcome::Finished { .. } => RenderState::Finished,
            RenderOutcome::Stopped { .. } => RenderState::Stopped,
            RenderOutcome::Failed(_) => RenderState::Failed,
        }
    }
}

/// Progress reported after every completed bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileProgress {
    pub bucket: Bucket,
    /// Buckets finished so far, including this one
    pub completed: usize,
    pub total: usize,
}

/// Callbacks from a running render.
///
/// `on_tile_complete` runs on worker threads, `on_render_end` on the
/// coordinator thread once the terminal state is visible to
/// [`RenderEngine::current_state`].
pub trait RenderObserver: Send + Sync {
    fn on_tile_complete(&self, _progress: &TileProgress, _frame: &FrameBuffer) {}

    fn on_render_end(&self, _outcome: &RenderOutcome) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RenderObserver for NullObserver {}

struct Control {
    state: RenderState,
    /// Set by `stop` while busy; decides Stopped over Finished.
    stop_requested: bool,
    frame: Option<Arc<FrameBuffer>>,
    outcome: Option<RenderOutcome>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    control: Mutex<Control>,
    state_changed: Condvar,
    cancel: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one render at a time and exposes start/stop/acknowledge control.
pub struct RenderEngine {
    shared: Arc<Shared>,
}

impl Default for RenderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    state: RenderState::Idle,
                    stop_requested: false,
                    frame: None,
                    outcome: None,
                    handle: None,
                }),
                state_changed: Condvar::new(),
                cancel: AtomicBool::new(false),
            }),
        }
    }

    /// Start rendering `scene` in the background.
    ///
    /// Fails synchronously on an invalid configuration or when the engine
    /// is not idle. Returns the frame buffer the render writes into.
    pub fn start(
        &self,
        scene: impl Into<Arc<Scene>>,
        config: RenderConfig,
        observer: Arc<dyn RenderObserver>,
    ) -> Result<Arc<FrameBuffer>, RenderError> {
        config.validate()?;

        let mut control = self.shared.lock();
        if control.state != RenderState::Idle {
            return Err(RenderError::InvalidState {
                action: "start",
                state: control.state,
            });
        }

        let frame = FrameBuffer::new(config.width, config.height).map_err(|e| {
            RenderError::resource(format!(
                "Could not allocate {} bytes for a {}x{} frame buffer: {e}",
                FrameBuffer::byte_size(config.width, config.height),
                config.width,
                config.height
            ))
        })?;
        let frame = Arc::new(frame);
        let job = RenderJob {
            scene: scene.into(),
            config,
            observer,
            frame: Arc::clone(&frame),
        };

        self.shared.cancel.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("lumo-render".to_string())
            .spawn(move || job.run(&shared))
            .map_err(|e| RenderError::resource(format!("Could not spawn render thread: {e}")))?;

        control.state = RenderState::Busy;
        control.stop_requested = false;
        control.frame = Some(Arc::clone(&frame));
        control.outcome = None;
        control.handle = Some(handle);

        log::info!("Render started");
        Ok(frame)
    }

    /// Request cancellation. Workers finish their current pixel and exit.
    ///
    /// Has no effect unless the engine is busy.
    pub fn stop(&self) {
        let mut control = self.shared.lock();
        if control.state == RenderState::Busy && !control.stop_requested {
            control.stop_requested = true;
            self.shared.cancel.store(true, Ordering::SeqCst);
            log::info!("Render stop requested");
        }
    }

    /// Block until the engine is no longer busy and return its state.
    pub fn wait(&self) -> RenderState {
        let mut control = self.shared.lock();
        while control.state == RenderState::Busy {
            control = self
                .shared
                .state_changed
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
        control.state
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> RenderState {
        let deadline = Instant::now() + timeout;
        let mut control = self.shared.lock();
        while control.state == RenderState::Busy {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            control = self
                .shared
                .state_changed
                .wait_timeout(control, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        control.state
    }

    /// Return a finished, stopped or failed engine to idle and hand back
    /// the frame buffer.
    ///
    /// Acknowledging an idle engine is a no-op returning `Ok(None)`.
    pub fn acknowledge(&self) -> Result<Option<Arc<FrameBuffer>>, RenderError> {
        let (frame, handle) = {
            let mut control = self.shared.lock();
            match control.state {
                RenderState::Idle => return Ok(None),
                RenderState::Busy => {
                    return Err(RenderError::InvalidState {
                        action: "acknowledge",
                        state: RenderState::Busy,
                    })
                }
                _ => {}
            }
            control.state = RenderState::Idle;
            control.stop_requested = false;
            (control.frame.take(), control.handle.take())
        };

        // The coordinator may acknowledge from its own end callback.
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::warn!("Render thread panicked after publishing its outcome");
            }
        }
        Ok(frame)
    }

    pub fn current_state(&self) -> RenderState {
        self.shared.lock().state
    }

    /// Frame buffer of the current or last unacknowledged render.
    pub fn frame_buffer(&self) -> Option<Arc<FrameBuffer>> {
        self.shared.lock().frame.clone()
    }

    /// Outcome of the most recent render that ended.
    pub fn last_outcome(&self) -> Option<RenderOutcome> {
        self.shared.lock().outcome.clone()
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.stop();
        self.wait();
        let handle = self.shared.lock().handle.take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Everything the coordinator thread owns for one render.
struct RenderJob {
    scene: Arc<Scene>,
    config: RenderConfig,
    observer: Arc<dyn RenderObserver>,
    frame: Arc<FrameBuffer>,
}

impl RenderJob {
    fn run(self, shared: &Shared) {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.render(shared)))
            .unwrap_or_else(|payload| {
                Err(RenderError::WorkerPanic(panic_message(payload.as_ref())))
            });

        let outcome = {
            let mut control = shared.lock();
            let samples = self.frame.total_samples();
            let elapsed = started.elapsed();
            let outcome = match result {
                Ok(()) if control.stop_requested => RenderOutcome::Stopped { samples, elapsed },
                Ok(()) => RenderOutcome::Finished { samples, elapsed },
                Err(err) => RenderOutcome::Failed(err),
            };
            control.state = outcome.state();
            control.outcome = Some(outcome.clone());
            shared.state_changed.notify_all();
            outcome
        };

        match &outcome {
            RenderOutcome::Failed(err) => log::error!("Render failed: {err}"),
            RenderOutcome::Finished { samples, elapsed }
            | RenderOutcome::Stopped { samples, elapsed } => {
                log::info!(
                    "Render {} after {:.2?} with {} samples",
                    outcome.state(),
                    elapsed,
                    samples
                );
            }
        }
        self.observer.on_render_end(&outcome);
    }

    fn render(&self, shared: &Shared) -> Result<(), RenderError> {
        let config = &self.config;
        let accelerator = Accelerator::build(config.accelerator, self.scene.primitives().clone())
            .map_err(|e| {
                RenderError::resource(format!("Acceleration structure build failed: {e}"))
            })?;

        let buckets = generate_buckets(config.width, config.height, config.threads);
        let total = buckets.len();
        log::debug!(
            "Rendering {}x{} in {} buckets on {} threads ({:?}, {:?}, {:?})",
            config.width,
            config.height,
            total,
            config.threads,
            config.accelerator,
            config.shader,
            config.sampler
        );

        let tiles = TileRenderer {
            scene: &self.scene,
            accelerator: &accelerator,
            shader: Shader::new(config.shader, &self.scene),
            sampler: Sampler::new(config.sampler, config.samples_pixel),
            config,
        };
        let next = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let cancel = &shared.cancel;

        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads as usize)
            .thread_name(|i| format!("lumo-worker-{i}"))
            .build_scoped(
                |worker| worker.run(),
                |pool| {
                    pool.broadcast(|_| loop {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(bucket) = buckets.get(i) else {
                            break;
                        };
                        if !tiles.render_bucket(bucket, &self.frame, cancel) {
                            break;
                        }
                        let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
                        let progress = TileProgress {
                            bucket: *bucket,
                            completed: done,
                            total,
                        };
                        log::trace!("Bucket {} done ({}/{})", bucket.index, done, total);
                        self.observer.on_tile_complete(&progress, &self.frame);
                    });
                },
            )
            .map_err(|e| {
                RenderError::resource(format!(
                    "Could not start {} render workers: {e}",
                    config.threads
                ))
            })?;

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumo_core::{demo, ShaderKind};

    fn small_config() -> RenderConfig {
        RenderConfig::default()
            .with_resolution(16, 16)
            .with_threads(2)
    }

    #[test]
    fn test_new_engine_is_idle() {
        let engine = RenderEngine::new();
        assert_eq!(engine.current_state(), RenderState::Idle);
        assert!(engine.frame_buffer().is_none());
        assert!(engine.last_outcome().is_none());
        assert!(matches!(engine.acknowledge(), Ok(None)));
    }

    #[test]
    fn test_render_finishes_and_counts_samples() {
        let engine = RenderEngine::new();
        let config = small_config().with_samples(2, 1);
        let frame = engine
            .start(demo::single_triangle(), config, Arc::new(NullObserver))
            .unwrap();

        assert_eq!(engine.wait(), RenderState::Finished);
        assert_eq!(frame.total_samples(), 16 * 16 * 2);
        match engine.last_outcome() {
            Some(RenderOutcome::Finished { samples, .. }) => assert_eq!(samples, 512),
            other => panic!("unexpected outcome {other:?}"),
        }

        let returned = engine.acknowledge().unwrap().unwrap();
        assert!(Arc::ptr_eq(&returned, &frame));
        assert_eq!(engine.current_state(), RenderState::Idle);
    }

    #[test]
    fn test_invalid_config_is_rejected_synchronously() {
        let engine = RenderEngine::new();
        let err = engine
            .start(demo::single_triangle(), small_config().with_threads(0), Arc::new(NullObserver))
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(engine.current_state(), RenderState::Idle);
    }

    struct PanickingObserver;

    impl RenderObserver for PanickingObserver {
        fn on_tile_complete(&self, _progress: &TileProgress, _frame: &FrameBuffer) {
            panic!("observer exploded");
        }
    }

    #[test]
    fn test_worker_panic_fails_render() {
        let engine = RenderEngine::new();
        let config = small_config().with_variants(
            Default::default(),
            ShaderKind::DepthMap,
            Default::default(),
        );
        engine
            .start(demo::single_triangle(), config, Arc::new(PanickingObserver))
            .unwrap();

        assert_eq!(engine.wait(), RenderState::Failed);
        match engine.last_outcome() {
            Some(RenderOutcome::Failed(RenderError::WorkerPanic(msg))) => {
                assert!(msg.contains("observer exploded"))
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        // Failure is cleared by acknowledging, after which a new render runs.
        engine.acknowledge().unwrap();
        engine
            .start(demo::single_triangle(), small_config(), Arc::new(NullObserver))
            .unwrap();
        assert_eq!(engine.wait(), RenderState::Finished);
    }

    #[test]
    fn test_unbounded_depth_is_rejected_before_rendering() {
        let engine = RenderEngine::new();
        let mut config = small_config().with_variants(
            Default::default(),
            ShaderKind::Whitted,
            Default::default(),
        );
        config.max_depth = 1_000_000;

        let err = engine
            .start(demo::spheres(), config, Arc::new(NullObserver))
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::InvalidConfig(lumo_core::ConfigError::MaxDepth(1_000_000))
        );
        assert_eq!(engine.current_state(), RenderState::Idle);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RenderState::Busy.to_string(), "busy");
        assert!(RenderState::Stopped.is_terminal());
        assert!(!RenderState::Idle.is_terminal());
    }
}
