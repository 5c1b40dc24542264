//! Render a built-in scene to a PNG file.
//!
//! Usage: `lumo <scene> <output.png> [--config render.json] [--budget-ms N]
//! [--threads N] [--spp N] [--spl N]`

use anyhow::{bail, Context, Result};
use lumo_core::{demo, RenderConfig};
use lumo_renderer::{
    FrameBuffer, RenderEngine, RenderObserver, RenderOutcome, RenderState, TileProgress,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct Args {
    scene: String,
    output: PathBuf,
    config: Option<PathBuf>,
    budget: Option<Duration>,
    threads: Option<u32>,
    samples_pixel: Option<u32>,
    samples_light: Option<u32>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{flag} expects a value"))
            };
            match arg.as_str() {
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--budget-ms" => {
                    let ms = parse_number(&value("--budget-ms")?, "--budget-ms")?;
                    parsed.budget = Some(Duration::from_millis(u64::from(ms)));
                }
                "--threads" => {
                    parsed.threads = Some(parse_number(&value("--threads")?, "--threads")?)
                }
                "--spp" => parsed.samples_pixel = Some(parse_number(&value("--spp")?, "--spp")?),
                "--spl" => parsed.samples_light = Some(parse_number(&value("--spl")?, "--spl")?),
                flag if flag.starts_with("--") => bail!("Unknown option {flag}"),
                _ => positional.push(arg),
            }
        }

        let [scene, output]: [String; 2] = positional.try_into().map_err(|_| {
            anyhow::anyhow!(
                "Usage: lumo <scene> <output.png> [--config FILE] [--budget-ms N] \
                 [--threads N] [--spp N] [--spl N]\nScenes: {}",
                demo::SCENE_NAMES.join(", ")
            )
        })?;
        parsed.scene = scene;
        parsed.output = PathBuf::from(output);
        Ok(parsed)
    }

    /// Config file (or defaults) with the command line overrides applied.
    fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => RenderConfig::default(),
        };

        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(spp) = self.samples_pixel {
            config.samples_pixel = spp;
        }
        if let Some(spl) = self.samples_light {
            config.samples_light = spl;
        }
        Ok(config)
    }
}

fn parse_number(text: &str, flag: &str) -> Result<u32> {
    text.parse()
        .with_context(|| format!("{flag} expects a non-negative integer, got '{text}'"))
}

/// Logs render progress at every tenth of the buckets.
#[derive(Default)]
struct ProgressLogger {
    last_decile: AtomicUsize,
}

impl RenderObserver for ProgressLogger {
    fn on_tile_complete(&self, progress: &TileProgress, frame: &FrameBuffer) {
        let decile = progress.completed * 10 / progress.total.max(1);
        if self.last_decile.fetch_max(decile, Ordering::Relaxed) < decile {
            log::info!(
                "{:>3}% ({} of {} buckets, {} samples)",
                decile * 10,
                progress.completed,
                progress.total,
                frame.total_samples()
            );
        }
    }
}

fn save_png(frame: &FrameBuffer, path: &Path) -> Result<()> {
    let image = image::RgbaImage::from_raw(frame.width(), frame.height(), frame.to_rgba_bytes())
        .context("Frame buffer size does not match its resolution")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse(std::env::args().skip(1))?;
    let scene = demo::by_name(&args.scene).with_context(|| {
        format!(
            "Unknown scene '{}', expected one of: {}",
            args.scene,
            demo::SCENE_NAMES.join(", ")
        )
    })?;
    let config = args.render_config()?;

    log::info!(
        "Rendering '{}' at {}x{}, {} spp, {} spl, {} threads",
        args.scene,
        config.width,
        config.height,
        config.samples_pixel,
        config.samples_light,
        config.threads
    );

    let engine = RenderEngine::new();
    engine.start(scene, config, Arc::new(ProgressLogger::default()))?;

    let state = match args.budget {
        Some(budget) => {
            if engine.wait_timeout(budget) == RenderState::Busy {
                log::warn!("Time budget of {:?} exhausted, stopping", budget);
                engine.stop();
            }
            engine.wait()
        }
        None => engine.wait(),
    };

    let outcome = engine.last_outcome();
    let frame = engine
        .acknowledge()?
        .context("Render ended without a frame buffer")?;

    if let Some(RenderOutcome::Failed(err)) = outcome {
        return Err(err).context("Render failed");
    }
    if state == RenderState::Stopped {
        log::warn!("Saving partially rendered image");
    }

    save_png(&frame, &args.output)?;
    log::info!("Saved {}", args.output.display());
    Ok(())
}
