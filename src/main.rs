use anyhow::{bail, Context, Result};
use camctl::{
    CameraEngine, CameraEvent, EngineConfig, EngineState, Facing, Location, PreviewSurface,
    SessionType, SimulatedDriver, Size, SurfaceKind,
};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "camctl")]
#[command(about = "Camera control engine running against a simulated two-camera device")]
#[command(version)]
#[command(long_about = "Opens a camera through the camera control engine, negotiates preview and \
picture sizes for a portrait surface, and optionally captures a picture, a preview snapshot or a \
short video into an output directory. The device is simulated, so every run is reproducible.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camctl.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without opening the camera")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Print the capabilities of the opened camera as JSON
    #[arg(long, help = "Print camera options as JSON once the camera is open")]
    dump_options: bool,

    /// What to capture once the preview runs
    #[arg(long, value_enum, value_name = "KIND")]
    capture: Option<CaptureKind>,

    /// Directory receiving captured files
    #[arg(long, default_value = ".", value_name = "DIR")]
    output_dir: PathBuf,

    /// Camera to open, overriding the configuration
    #[arg(long, value_enum)]
    facing: Option<FacingArg>,

    /// Geotag as "latitude,longitude"
    #[arg(long, value_parser = parse_location, value_name = "LAT,LON")]
    location: Option<Location>,

    /// Length of a captured video in milliseconds
    #[arg(long, default_value_t = 1000, value_name = "MS")]
    video_length_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CaptureKind {
    Picture,
    Snapshot,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FacingArg {
    Back,
    Front,
}

impl From<FacingArg> for Facing {
    fn from(facing: FacingArg) -> Self {
        match facing {
            FacingArg::Back => Facing::Back,
            FacingArg::Front => Facing::Front,
        }
    }
}

fn parse_location(value: &str) -> std::result::Result<Location, String> {
    let (latitude, longitude) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", value))?;
    let latitude: f64 = latitude
        .trim()
        .parse()
        .map_err(|e| format!("invalid latitude: {}", e))?;
    let longitude: f64 = longitude
        .trim()
        .parse()
        .map_err(|e| format!("invalid longitude: {}", e))?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(format!("location out of range: {}", value));
    }
    Ok(Location::new(latitude, longitude))
}

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting camctl v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match EngineConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(facing) = args.facing {
        config.camera.facing = facing.into();
    }
    if args.capture == Some(CaptureKind::Video) {
        config.camera.session_type = SessionType::Video;
    }

    let driver = SimulatedDriver::new();
    let engine = CameraEngine::builder()
        .config(config)
        .driver(driver)
        .build()
        .context("Failed to build the camera engine")?;
    spawn_event_logger(engine.subscribe());

    let result = run(&engine, &args).await;
    engine.shutdown().wait().await;
    info!("Camera engine shut down");
    result
}

async fn run(engine: &CameraEngine, args: &Args) -> Result<()> {
    if let Some(location) = args.location.clone() {
        engine.set_location(Some(location)).wait().await;
    }

    let mut events = engine.subscribe();
    engine
        .surface_available(PreviewSurface::new(
            SurfaceKind::Texture,
            Size::new(1080, 1920),
        ))
        .wait()
        .await;
    engine.start()?.wait().await;
    if engine.state() != EngineState::Started {
        if let Some(CameraEvent::Error(e)) = drain_errors(&mut events).into_iter().next() {
            bail!("Camera failed to start: {}", e);
        }
        bail!("Camera failed to start");
    }

    if let Some(preview) = engine.preview_size() {
        info!("Preview running at {}", preview);
    }

    if args.dump_options {
        let options = engine
            .options()
            .context("Camera options are not available")?;
        println!("{}", serde_json::to_string_pretty(&*options)?);
    }

    match args.capture {
        Some(CaptureKind::Picture) => capture_picture(engine, &mut events, &args.output_dir).await,
        Some(CaptureKind::Snapshot) => capture_snapshot(engine, &mut events, &args.output_dir).await,
        Some(CaptureKind::Video) => {
            capture_video(
                engine,
                &mut events,
                &args.output_dir,
                Duration::from_millis(args.video_length_ms),
            )
            .await
        }
        None => Ok(()),
    }
}

async fn capture_picture(
    engine: &CameraEngine,
    events: &mut broadcast::Receiver<CameraEvent>,
    dir: &Path,
) -> Result<()> {
    engine.capture_picture().wait().await;
    let CameraEvent::PictureReady { data, .. } =
        next_outcome(events, |e| matches!(e, CameraEvent::PictureReady { .. })).await?
    else {
        bail!("Unexpected capture outcome");
    };

    let path = dir.join(format!("picture-{}.jpg", Uuid::new_v4()));
    tokio::fs::write(&path, data.as_slice())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

async fn capture_snapshot(
    engine: &CameraEngine,
    events: &mut broadcast::Receiver<CameraEvent>,
    dir: &Path,
) -> Result<()> {
    engine.capture_snapshot().wait().await;
    let CameraEvent::SnapshotReady { image, .. } =
        next_outcome(events, |e| matches!(e, CameraEvent::SnapshotReady { .. })).await?
    else {
        bail!("Unexpected capture outcome");
    };

    let extension = format!("{:?}", image.format).to_lowercase();
    let path = dir.join(format!(
        "snapshot-{}-{}.{}",
        image.size,
        Uuid::new_v4(),
        extension
    ));
    tokio::fs::write(&path, &image.data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

async fn capture_video(
    engine: &CameraEngine,
    events: &mut broadcast::Receiver<CameraEvent>,
    dir: &Path,
    length: Duration,
) -> Result<()> {
    let path = dir.join(format!("video-{}.mp4", Uuid::new_v4()));
    engine.start_video(&path).wait().await;
    if !engine.is_capturing_video() {
        if let Some(CameraEvent::Error(e)) = drain_errors(events).into_iter().next() {
            bail!("Recording did not start: {}", e);
        }
        debug!("Recording already finished");
    } else {
        tokio::time::sleep(length).await;
        engine.end_video().wait().await;
    }

    let CameraEvent::VideoReady { path } =
        next_outcome(events, |e| matches!(e, CameraEvent::VideoReady { .. })).await?
    else {
        bail!("Unexpected capture outcome");
    };
    println!("{}", path.display());
    Ok(())
}

/// Wait for the first event matching `wanted`, failing on an engine error
async fn next_outcome<F>(
    events: &mut broadcast::Receiver<CameraEvent>,
    wanted: F,
) -> Result<CameraEvent>
where
    F: Fn(&CameraEvent) -> bool,
{
    let outcome = tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(CameraEvent::Error(e)) => bail!(e),
                Ok(event) if wanted(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} camera events", n);
                }
                Err(broadcast::error::RecvError::Closed) => bail!("Event bus closed"),
            }
        }
    })
    .await
    .context("Timed out waiting for the camera")?;
    outcome
}

fn drain_errors(events: &mut broadcast::Receiver<CameraEvent>) -> Vec<CameraEvent> {
    let mut errors = Vec::new();
    while let Ok(event) = events.try_recv() {
        if matches!(event, CameraEvent::Error(_)) {
            errors.push(event);
        }
    }
    errors
}

fn spawn_event_logger(mut events: broadcast::Receiver<CameraEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CameraEvent::Error(e)) => warn!("Camera error: {}", e),
                Ok(event) => info!("{}", event.description()),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event logger missed {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camctl={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# camctl configuration file");
    println!("# Every key can be overridden with CAMCTL_<SECTION>_<KEY>, e.g. CAMCTL_CAMERA_FACING=front");
    println!();
    println!("{}", toml::to_string_pretty(&EngineConfig::default())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let location = parse_location("48.8566, 2.3522").unwrap();
        assert_eq!(location.latitude, 48.8566);
        assert_eq!(location.longitude, 2.3522);

        assert!(parse_location("48.8566").is_err());
        assert!(parse_location("north,east").is_err());
        assert!(parse_location("91,0").is_err());
    }

    #[test]
    fn test_cli_arguments() {
        let args = Args::try_parse_from([
            "camctl",
            "--capture",
            "video",
            "--facing",
            "front",
            "--location",
            "1.5,2.5",
        ])
        .unwrap();
        assert_eq!(args.capture, Some(CaptureKind::Video));
        assert_eq!(args.facing, Some(FacingArg::Front));
        assert_eq!(args.video_length_ms, 1000);
        assert_eq!(args.config, "camctl.toml");
    }
}
