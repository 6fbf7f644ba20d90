use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use longshot::capture::simulated::SimulatedViewport;
use longshot::capture::{CaptureRateLimiter, CaptureTarget, ScrollCoordinator, SimulatedPage, WindowId};
use longshot::config::config::clamp_max_height;
use longshot::config::{CaptureConfig, UiLanguage};
use longshot::error::classify;
use longshot::layout::geometry::CropBounds;
use longshot::layout::presets::{FooterScope, OutputMode, OutputQuality};
use longshot::{CaptureError, CaptureOutcome, HasRecoverySuggestion};
use tracing_subscriber::EnvFilter;

/// Long screenshots: scroll, snapshot, stitch and split.
#[derive(Parser, Debug)]
#[command(name = "longshot")]
#[command(about = "📜 Capture a page taller than the screen as one image, or as ordered parts")]
#[command(long_about = "Capture a page taller than its viewport by scrolling and stitching overlapping snapshots.
Multi-part captures are kept as sessions so split boundaries can be adjusted and exported later.")]
struct Cli {
    /// JSON settings file; flags override its values
    #[arg(long, global = true, help = "Path to a JSON settings file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a rendered page image through the simulated browser viewport
    Capture(CaptureArgs),
    /// Inspect, export or clean up split sessions
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Full-page rendering in device pixels (PNG, JPEG, ...)
    page_image: PathBuf,

    #[arg(long, default_value = "1280x800", value_parser = parse_viewport,
          help = "Viewport size in CSS px, e.g. 1280x800")]
    viewport: (u32, u32),

    #[arg(long, default_value_t = 1.0, help = "Device pixel ratio of the page image")]
    dpr: f64,

    #[arg(long, default_value_t = 0, help = "Scroll root offset inside the window (CSS px)")]
    offset_x: u32,

    #[arg(long, default_value_t = 0)]
    offset_y: u32,

    #[arg(long, default_value = "http://localhost/", help = "URL reported for the page")]
    page_url: String,

    #[arg(short, long, value_enum)]
    mode: Option<OutputMode>,

    #[arg(short, long, value_enum)]
    quality: Option<OutputQuality>,

    #[arg(long, help = "Height cap in CSS px; 0, negative or non-numeric means unlimited")]
    max_height: Option<String>,

    #[arg(long)]
    crop_left: Option<f64>,
    #[arg(long)]
    crop_right: Option<f64>,
    #[arg(long)]
    crop_top: Option<f64>,
    #[arg(long)]
    crop_bottom: Option<f64>,

    #[arg(long, help = "Link encoded into the footer code")]
    footer_url: Option<String>,

    #[arg(long, value_enum)]
    footer_scope: Option<FooterScope>,

    #[arg(long, value_enum)]
    lang: Option<UiLanguage>,

    #[arg(long, default_value_t = 0, help = "CSS px hidden at the bottom until scrolled to (lazy loading)")]
    hidden: u32,

    #[arg(long, default_value_t = 400, help = "CSS px revealed per lazy-load step")]
    grow_by: u32,

    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    #[arg(long)]
    session_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Print session metadata
    Show { id: String },
    /// Write the session's parts
    Export {
        id: String,
        /// Comma-separated CSS px boundaries; defaults to the stored ones
        #[arg(long, value_delimiter = ',')]
        boundaries: Vec<f64>,
    },
    /// Delete one session
    Delete { id: String },
    /// Delete every expired session
    Sweep,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("longshot=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => CaptureConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CaptureConfig::default(),
    };

    match cli.command {
        Command::Capture(args) => capture(&mut config, args).await,
        Command::Session(command) => session(&config, command).await,
    }
}

async fn capture(config: &mut CaptureConfig, args: CaptureArgs) -> Result<()> {
    apply_overrides(config, &args);
    config.validate().map_err(anyhow::Error::msg)?;

    let bytes = std::fs::read(&args.page_image)
        .with_context(|| format!("reading {}", args.page_image.display()))?;
    let (width, height) = args.viewport;
    let page = SimulatedPage::from_encoded(
        &bytes,
        SimulatedViewport {
            width,
            height,
            device_pixel_ratio: args.dpr,
            offset_x: args.offset_x,
            offset_y: args.offset_y,
        },
    )?;
    let page = Arc::new(if args.hidden > 0 {
        page.with_lazy_growth(args.hidden, args.grow_by)
    } else {
        page
    });

    let coordinator = ScrollCoordinator::new(
        page.clone(),
        page,
        Arc::new(CaptureRateLimiter::default()),
    );
    let pipeline = longshot::build_pipeline(config)?.with_coordinator(coordinator);
    let request = config.to_capture_request(CaptureTarget {
        tab_id: Some(1),
        window_id: Some(WindowId(1)),
        page_url: Some(args.page_url.clone()),
    });

    match pipeline.run_capture(request).await? {
        CaptureOutcome::Saved {
            path,
            pixel_width,
            pixel_height,
        } => println!("Saved {} ({pixel_width}x{pixel_height})", path.display()),
        CaptureOutcome::NeedsSplit {
            session_id,
            part_count,
        } => {
            println!("Session {session_id} ready for a {part_count}-part split");
            println!("Export with: longshot session export {session_id} [--boundaries a,b,...]");
        }
    }
    Ok(())
}

fn apply_overrides(config: &mut CaptureConfig, args: &CaptureArgs) {
    if let Some(mode) = args.mode {
        config.output_mode = mode;
    }
    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if let Some(raw) = &args.max_height {
        config.max_height = clamp_max_height(raw);
    }
    let flags = CropBounds::from_raw(args.crop_left, args.crop_right, args.crop_top, args.crop_bottom);
    if !flags.is_empty() {
        config.crop = CropBounds {
            left: flags.left.or(config.crop.left),
            right: flags.right.or(config.crop.right),
            top: flags.top.or(config.crop.top),
            bottom: flags.bottom.or(config.crop.bottom),
        }
        .normalized();
    }
    if let Some(url) = &args.footer_url {
        config.footer_url = url.clone();
    }
    if let Some(scope) = args.footer_scope {
        config.footer_scope = scope;
    }
    if let Some(lang) = args.lang {
        config.language = lang;
    }
    if let Some(dir) = &args.out_dir {
        config.out_dir = dir.clone();
    }
    if let Some(dir) = &args.session_dir {
        config.session_dir = dir.clone();
    }
}

async fn session(config: &CaptureConfig, command: SessionCommand) -> Result<()> {
    let pipeline = longshot::build_pipeline(config)?;
    match command {
        SessionCommand::Show { id } => {
            let view = pipeline.get_session(&id).await?;
            println!("{}", serde_json::to_string_pretty(&view.session)?);
            println!("image: {} bytes as data URL", view.data_url.len());
        }
        SessionCommand::Export { id, boundaries } => {
            let summary = pipeline.export_session(&id, &boundaries).await?;
            println!("Exported {} part(s)", summary.part_count);
            for path in summary.paths {
                println!("  {}", path.display());
            }
        }
        SessionCommand::Delete { id } => {
            pipeline.delete_session(&id).await?;
            println!("Deleted {id}");
        }
        SessionCommand::Sweep => {
            let removed = pipeline.sweep_sessions().await?;
            println!("Removed {removed} expired session(s)");
        }
    }
    Ok(())
}

fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {err:#}");
    let Some(capture) = err.downcast_ref::<CaptureError>() else {
        return ExitCode::FAILURE;
    };
    if let Some(hint) = capture.recovery_suggestion() {
        eprintln!("Hint: {hint}");
    }
    ExitCode::from(u8::try_from(classify::exit_code(capture)).unwrap_or(1))
}

/// Parse a viewport like "1280x800"
fn parse_viewport(raw: &str) -> Result<(u32, u32)> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow::anyhow!("Invalid viewport: {raw}. Use WIDTHxHEIGHT, e.g. 1280x800"))?;
    let width: u32 = w.trim().parse().with_context(|| format!("Invalid viewport width: {w}"))?;
    let height: u32 = h.trim().parse().with_context(|| format!("Invalid viewport height: {h}"))?;
    if width == 0 || height == 0 {
        anyhow::bail!("Viewport must be at least 1x1");
    }
    Ok((width, height))
}
