//! treasure_probe - run the selection core against images from the command line
//!
//! Subcommands:
//! - `detect`: analyse an image, print JSON, optionally write an overlay PNG
//! - `tap`: resolve a client tap on a displayed image
//! - `compare`: fingerprint similarity of two image files
//! - `live`: synthetic live-detection loop until Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use treasure_lens::embedding::{fingerprint, Verdict};
use treasure_lens::live::{DetectionLoop, RunFlag, SyntheticFrameSource};
use treasure_lens::overlay::{RasterSurface, RenderStatus};
use treasure_lens::{
    BackendRegistry, BoundingBox, ClientRect, ClientTap, Detection, Frame, FrameAnalysis,
    PipelineConfig, SelectionPipeline, StubBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Pipeline config file (JSON, or TOML by extension).
    #[arg(long, env = "TREASURE_LENS_CONFIG")]
    config: Option<PathBuf>,
    /// ONNX detector model (requires the backend-tract feature).
    #[arg(long, env = "TREASURE_LENS_MODEL")]
    model: Option<PathBuf>,
    /// Square input size the ONNX detector was exported with.
    #[arg(long, default_value_t = 640)]
    model_input: u32,
    /// JSON list of detections served by the stub backend.
    #[arg(long)]
    stub_detections: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect objects in an image.
    Detect {
        image: PathBuf,
        /// Use the live threshold instead of the initial one.
        #[arg(long)]
        live: bool,
        /// Write the overlay over the image to this PNG.
        #[arg(long)]
        overlay: Option<PathBuf>,
        /// Font for overlay labels.
        #[arg(long)]
        font: Option<PathBuf>,
    },
    /// Resolve a tap given the client rect the image is displayed in.
    Tap {
        image: PathBuf,
        /// left,top,width,height of the displayed image in client pixels.
        #[arg(long, value_parser = parse_rect)]
        view: ClientRect,
        #[arg(long, allow_hyphen_values = true)]
        x: f32,
        #[arg(long, allow_hyphen_values = true)]
        y: f32,
        /// Class the player is looking for.
        #[arg(long)]
        target: Option<String>,
    },
    /// Fingerprint similarity between two images.
    Compare { first: PathBuf, second: PathBuf },
    /// Live detection on synthetic frames until Ctrl-C.
    Live {
        #[arg(long, default_value_t = 5)]
        fps: u32,
        #[arg(long)]
        frames: Option<u64>,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisReport<'a> {
    source_width: u32,
    source_height: u32,
    detections: &'a [Detection],
    masks: Vec<BoundingBox>,
    matches: Vec<(usize, usize)>,
}

impl<'a> AnalysisReport<'a> {
    fn new(analysis: &'a FrameAnalysis) -> Self {
        Self {
            source_width: analysis.source_width,
            source_height: analysis.source_height,
            detections: &analysis.detections,
            masks: analysis.instances.iter().map(|i| i.derived_box).collect(),
            matches: analysis.matches.iter().map(|(&d, &m)| (d, m)).collect(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = PipelineConfig::load_from(args.config.as_deref())?;
    let registry = build_registry(
        args.model.as_deref(),
        args.model_input,
        args.stub_detections.as_deref(),
    )?;
    log::info!("registered backends: {:?}", registry.list());
    let pipeline = SelectionPipeline::new(Arc::new(registry), config);
    log::info!(
        "detector available: {}, segmenter available: {}, embedding model available: {}",
        pipeline.detector().is_available(),
        pipeline.segmenter().is_available(),
        pipeline.disambiguator().is_model_available()
    );

    match args.command {
        Command::Detect {
            image,
            live,
            overlay,
            font,
        } => run_detect(&pipeline, &image, live, overlay.as_deref(), font.as_deref()),
        Command::Tap {
            image,
            view,
            x,
            y,
            target,
        } => run_tap(&pipeline, &image, view, x, y, target.as_deref()),
        Command::Compare { first, second } => run_compare(&pipeline, &first, &second),
        Command::Live {
            fps,
            frames,
            width,
            height,
        } => run_live(&pipeline, fps, frames, width, height),
    }
}

fn build_registry(
    model: Option<&Path>,
    model_input: u32,
    stub_detections: Option<&Path>,
) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    if let Some(path) = model {
        register_model(&mut registry, path, model_input)?;
    }
    let detections = match stub_detections {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid detections in {}", path.display()))?
        }
        None => Vec::new(),
    };
    registry.register(StubBackend::new().with_detections(detections));
    Ok(registry)
}

#[cfg(feature = "backend-tract")]
fn register_model(registry: &mut BackendRegistry, path: &Path, input_size: u32) -> Result<()> {
    registry.register(
        treasure_lens::detect::backends::TractBackend::new(path).with_input_size(input_size),
    );
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn register_model(_registry: &mut BackendRegistry, path: &Path, _input_size: u32) -> Result<()> {
    Err(anyhow!(
        "cannot load {}: built without the backend-tract feature",
        path.display()
    ))
}

fn run_detect(
    pipeline: &SelectionPipeline,
    image: &Path,
    live: bool,
    overlay: Option<&Path>,
    font: Option<&Path>,
) -> Result<()> {
    let frame = Frame::open(image)?;
    let analysis = if live {
        pipeline.live_detections(&frame)
    } else {
        pipeline.initial_detections(&frame)
    };
    println!("{}", serde_json::to_string_pretty(&AnalysisReport::new(&analysis))?);

    if let Some(out) = overlay {
        let mut surface = RasterSurface::new(frame.width(), frame.height());
        if let Some(font) = font {
            surface = surface.with_font_file(font)?;
        }
        let mut renderer = pipeline.overlay_renderer(surface)?;
        renderer.set_source_size(frame.width(), frame.height());
        let status = renderer.set_detections(analysis.detections, analysis.instances);
        if !matches!(status, RenderStatus::Drawn { .. }) {
            return Err(anyhow!("overlay not drawn: {:?}", status));
        }
        let mut composed = frame.into_image();
        image::imageops::overlay(&mut composed, renderer.into_surface().image(), 0, 0);
        composed
            .save(out)
            .with_context(|| format!("failed to write overlay {}", out.display()))?;
        log::info!("overlay written to {}", out.display());
    }
    Ok(())
}

fn run_tap(
    pipeline: &SelectionPipeline,
    image: &Path,
    view: ClientRect,
    x: f32,
    y: f32,
    target: Option<&str>,
) -> Result<()> {
    let frame = Frame::open(image)?;
    let analysis = pipeline.live_detections(&frame);
    let tap = ClientTap::new(view, x, y);
    let source_point = tap.to_source(frame.width(), frame.height());
    let resolved = pipeline.resolver().resolve_tap(
        &frame,
        &tap,
        frame.width(),
        frame.height(),
        &analysis.detections,
        target,
    );
    let report = serde_json::json!({
        "sourcePoint": source_point,
        "detection": resolved,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_compare(pipeline: &SelectionPipeline, first: &Path, second: &Path) -> Result<()> {
    let size = pipeline.config().embedding.fingerprint_size;
    let a = fingerprint(Frame::open(first)?.image(), size)?;
    let b = fingerprint(Frame::open(second)?.image(), size)?;
    let similarity = a
        .similarity(&b)
        .ok_or_else(|| anyhow!("fingerprints are not comparable"))?;
    let threshold = pipeline.disambiguator().threshold();
    let verdict = if similarity >= threshold {
        Verdict::Accepted { similarity }
    } else {
        Verdict::Rejected { similarity }
    };
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn run_live(
    pipeline: &SelectionPipeline,
    fps: u32,
    frames: Option<u64>,
    width: u32,
    height: u32,
) -> Result<()> {
    if fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    let flag = RunFlag::running();
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || handler_flag.stop())
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut source = SyntheticFrameSource::new(width, height);
    if let Some(frames) = frames {
        source = source.limit(frames);
    }
    log::info!("live detection running at up to {} fps (Ctrl-C to stop)", fps);
    let mut detection_loop = DetectionLoop::new(pipeline, source, flag)
        .with_pause(Duration::from_millis(1000 / fps as u64));
    let stats = detection_loop.run(|_, analysis| {
        log::info!(
            "{} detections, {} masks",
            analysis.detections.len(),
            analysis.instances.len()
        );
    });
    log::info!(
        "live detection stopped: {} iterations, {} delivered, {} frame errors",
        stats.iterations,
        stats.delivered,
        stats.frame_errors
    );
    Ok(())
}

fn parse_rect(value: &str) -> Result<ClientRect> {
    let parts: Vec<f32> = value
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| anyhow!("expected left,top,width,height"))?;
    match parts.as_slice() {
        [left, top, width, height] => Ok(ClientRect::new(*left, *top, *width, *height)),
        _ => Err(anyhow!("expected four comma-separated numbers")),
    }
}
