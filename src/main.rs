//! Hair Recolor - command line entry point
//!
//! Recolors a still photo through the synchronous pipeline, or (with the
//! `camera` feature) runs a live session and saves the last frame.

use std::path::PathBuf;
use std::process::ExitCode;

use hair_recolor::color::palette;
use hair_recolor::telemetry::init_logging;
use hair_recolor::{BlendMode, Frame, FrameBufferPool, FramePipeline, PipelineConfig, ProcessingSettings};

const USAGE: &str = "\
Usage:
  hair-recolor <input> <output> [--preset ID] [--blend MODE] [--smoothing S] [--config PATH]
  hair-recolor --camera INDEX <output> [--seconds N] [--preset ID] [--blend MODE] [--config PATH]
  hair-recolor --list-presets";

const DEFAULT_PRESET: &str = "fashion-red";

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Default)]
struct Args {
    positional: Vec<String>,
    preset: Option<String>,
    blend: Option<String>,
    smoothing: Option<f32>,
    config: Option<PathBuf>,
    camera: Option<u32>,
    seconds: Option<u64>,
    list_presets: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> CliResult<Args> {
    let mut parsed = Args::default();
    let mut args = args;
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{} needs a value", flag));
        match arg.as_str() {
            "--preset" => parsed.preset = Some(value("--preset")?),
            "--blend" => parsed.blend = Some(value("--blend")?),
            "--smoothing" => parsed.smoothing = Some(value("--smoothing")?.parse()?),
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--camera" => parsed.camera = Some(value("--camera")?.parse()?),
            "--seconds" => parsed.seconds = Some(value("--seconds")?.parse()?),
            "--list-presets" => parsed.list_presets = true,
            "-h" | "--help" => return Err(USAGE.into()),
            flag if flag.starts_with("--") => return Err(format!("Unknown option {}\n{}", flag, USAGE).into()),
            _ => parsed.positional.push(arg),
        }
    }
    Ok(parsed)
}

fn settings_from(args: &Args) -> CliResult<ProcessingSettings> {
    let blend = match &args.blend {
        Some(name) => BlendMode::from_name(name).ok_or_else(|| format!("Unknown blend mode '{}'", name))?,
        None => BlendMode::default(),
    };
    Ok(ProcessingSettings::new(blend).with_smoothing(args.smoothing.unwrap_or(0.0)))
}

fn load_config(args: &Args) -> CliResult<PipelineConfig> {
    match &args.config {
        Some(path) => Ok(PipelineConfig::load(path)?),
        None => Ok(PipelineConfig::load_or_default()),
    }
}

fn list_presets() {
    for spec in palette::presets() {
        println!(
            "{:<20} {:<9} h={:.2} s={:.2} b={:.2}",
            spec.id(),
            spec.category().name(),
            spec.hue(),
            spec.saturation(),
            spec.brightness()
        );
    }
}

fn recolor_still(args: &Args, config: &PipelineConfig) -> CliResult<()> {
    let [input, output] = args.positional.as_slice() else {
        return Err(USAGE.into());
    };
    let preset_id = args.preset.as_deref().unwrap_or(DEFAULT_PRESET);
    let color = palette::preset(preset_id).ok_or_else(|| format!("Unknown preset '{}'", preset_id))?;

    let image = image::open(input)?.to_rgba8();
    let pool = FrameBufferPool::for_resolution(image.width(), image.height(), 4);
    let frame = Frame::from_rgba_image(&pool, &image, 0)?;

    let (detector, model) = hair_recolor::ml::load_capabilities(&config.models);
    let mut pipeline = FramePipeline::new(config, pool, detector, model);
    pipeline.apply_color(color, settings_from(args)?);

    let processed = pipeline.process(frame, None);
    if let Some(guidance) = processed.guidance {
        tracing::warn!("{}", guidance.message());
    }
    if let Some(e) = processed.error() {
        tracing::warn!("Frame not recolored: {}", e);
    }
    let frame = processed.output.as_ref().ok_or("Input image could not be processed")?;
    frame.to_rgba_image()?.save(output)?;

    tracing::info!(
        output = %output,
        preset = preset_id,
        recolored = !processed.passthrough,
        total_ms = format!("{:.2}", processed.timings.processing_total().as_secs_f64() * 1000.0),
        "Saved"
    );
    Ok(())
}

#[cfg(feature = "camera")]
fn run_camera(args: &Args, config: &PipelineConfig, index: u32) -> CliResult<()> {
    use hair_recolor::camera::CameraSource;
    use hair_recolor::pipeline::{DiagnosticsSink, LogSink};
    use hair_recolor::Session;

    let [output] = args.positional.as_slice() else {
        return Err(USAGE.into());
    };
    let preset_id = args.preset.as_deref().unwrap_or(DEFAULT_PRESET);
    let color = palette::preset(preset_id).ok_or_else(|| format!("Unknown preset '{}'", preset_id))?;

    let source = CameraSource::open(index)?;
    let (width, height) = source.resolution();
    let pool = FrameBufferPool::for_resolution(width, height, config.pool.max_buffers);
    let (detector, model) = hair_recolor::ml::load_capabilities(&config.models);
    let sinks: Vec<Box<dyn DiagnosticsSink>> = vec![Box::new(LogSink::new(config.target_fps as u64 * 4))];

    let mut session = Session::start(config, pool, detector, model, sinks)?;
    session.apply_color(color, settings_from(args)?);
    session.attach_source(Box::new(source))?;

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(args.seconds.unwrap_or(10));
    while session.is_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    session.stop();

    if let Some(e) = session.fatal_error() {
        return Err(e.into());
    }
    let latest = session.latest_processed().ok_or("No frame was processed")?;
    let frame = latest.output.as_ref().ok_or("Last frame could not be processed")?;
    frame.to_rgba_image()?.save(output)?;
    tracing::info!(
        output = %output,
        tier = %session.quality_tier(),
        dropped = session.dropped_frames(),
        "Saved latest frame"
    );
    Ok(())
}

#[cfg(not(feature = "camera"))]
fn run_camera(_args: &Args, _config: &PipelineConfig, _index: u32) -> CliResult<()> {
    Err("Camera capture needs the `camera` feature".into())
}

fn run(args: Args, config: PipelineConfig) -> CliResult<()> {
    if args.list_presets {
        list_presets();
        return Ok(());
    }

    match args.camera {
        Some(index) => run_camera(&args, &config, index),
        None => recolor_still(&args, &config),
    }
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    tracing::info!("Hair Recolor v{}", env!("CARGO_PKG_VERSION"));

    match run(args, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
