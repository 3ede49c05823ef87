// pigeon_cam - exposure-sweep capture daemon
// Captures a sweep of exposures, enriches each frame with weather and brightness, archives under data/<date>/

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pigeon_cam::config::DELAY_KEY;
use pigeon_cam::validation::{config_schema, validate_config};
use pigeon_cam::{
    AcquisitionConfig, AcquisitionPipeline, CameraDevice, CameraHandle, CaptureMode,
    ConfigProvider, ExposureMode, ExposureSweep, FailurePolicy, JsonFileConfig, StillCamera,
    StopReason, SweepScheduler, SyntheticCamera, SystemClock, WeatherClient, WhiteBalance,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CameraBackend {
    /// Raspberry Pi camera through rpicam-still
    Still,
    /// Generated grey frames, no hardware needed
    Synthetic,
}

#[derive(Parser)]
#[command(name = "pigeon_cam", version, about = "Take all the images!")]
struct Args {
    /// Exposure time in ms (used as-is in single mode)
    #[arg(short, long)]
    exposure: u32,

    /// ISO
    #[arg(short, long)]
    iso: u32,

    /// Delay between sweeps in seconds; read from config when absent
    #[arg(short, long)]
    delay: Option<u64>,

    /// Single picture or continuous capture
    #[arg(long, value_enum)]
    mode: CaptureMode,

    /// JSON config file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Archive root; captures land in <data-dir>/<YYYYMMDD>/
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// First exposure of the sweep in ms
    #[arg(long, default_value_t = 100)]
    sweep_start: u32,

    /// Last exposure of the sweep in ms (inclusive)
    #[arg(long, default_value_t = 2000)]
    sweep_end: u32,

    /// Exposure increment in ms
    #[arg(long, default_value_t = 100)]
    sweep_step: u32,

    /// Stop continuous mode after this many sweeps
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    sweeps: Option<u64>,

    /// Skip a failed exposure instead of stopping the run
    #[arg(long, default_value_t = false)]
    keep_going: bool,

    /// White balance mode
    #[arg(long, value_enum, default_value = "auto")]
    awb: WhiteBalance,

    /// Exposure program
    #[arg(long, value_enum, default_value = "auto")]
    exposure_mode: ExposureMode,

    /// Camera backend
    #[arg(long, value_enum, default_value = "still")]
    camera: CameraBackend,

    /// Capture command for the still backend
    #[arg(long, default_value = "rpicam-still")]
    camera_command: String,

    /// Sensor settle time before each capture in ms
    #[arg(long, default_value_t = 1000)]
    settle_ms: u64,

    /// Timeout for the weather request in seconds
    #[arg(long, default_value_t = 10)]
    weather_timeout_secs: u64,

    /// Write the log to this file (truncated) instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref())?;

    info!("📷 Starting pigeon_cam");
    info!("   Mode: {:?}", args.mode);
    info!("   Archive: {}", args.data_dir.display());

    let config = Arc::new(JsonFileConfig::new(&args.config));
    let document = config
        .document()
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let require_delay = matches!(args.mode, CaptureMode::Continuous) && args.delay.is_none();
    validate_config(&document, &config_schema(require_delay)).context("Invalid config")?;

    let delay_secs = match args.delay {
        Some(delay) => delay,
        None if require_delay => config.read_u64(DELAY_KEY).context("Failed to read delay")?,
        None => 0,
    };

    let sweep = ExposureSweep::range(args.sweep_start, args.sweep_end, args.sweep_step)
        .context("Invalid exposure sweep")?;

    let device: Box<dyn CameraDevice> = match args.camera {
        CameraBackend::Still => Box::new(StillCamera::new(&args.camera_command)),
        CameraBackend::Synthetic => Box::new(SyntheticCamera::new()),
    };
    let camera = Arc::new(CameraHandle::with_settle(
        device,
        Duration::from_millis(args.settle_ms),
    ));
    info!("   ✓ Camera: {}", camera.device_name());

    let weather = WeatherClient::with_timeout(
        config.clone(),
        Duration::from_secs(args.weather_timeout_secs),
    )
    .context("Failed to build weather client")?;

    let pipeline = AcquisitionPipeline::new(
        camera,
        Arc::new(weather),
        Arc::new(SystemClock),
        &args.data_dir,
    );

    let base = AcquisitionConfig {
        awb_mode: args.awb,
        exposure_mode: args.exposure_mode,
        ..AcquisitionConfig::new(args.exposure, args.iso)
    };

    let mut scheduler = SweepScheduler::new(pipeline, base, sweep, Duration::from_secs(delay_secs))
        .with_policy(if args.keep_going {
            FailurePolicy::SkipExposure
        } else {
            FailurePolicy::FailFast
        });
    if let Some(sweeps) = args.sweeps {
        scheduler = scheduler.with_max_sweeps(sweeps);
    }

    let listener = scheduler.stop_signal().listen_for_ctrl_c();

    let outcome = scheduler.run(args.mode).await;
    listener.abort();

    match outcome {
        Ok(summary) => {
            match summary.reason {
                StopReason::Interrupted => info!("🛑 Stopped by operator"),
                StopReason::Completed => info!("✅ Done"),
            }
            info!(
                "   {} captures archived, {} skipped, {} full sweeps",
                summary.captures_archived, summary.captures_failed, summary.sweeps_completed
            );
            Ok(())
        }
        Err(e) => {
            error!("Capture run failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [&str; 7] = ["pigeon_cam", "-e", "100", "-i", "100", "--mode", "continuous"];

    #[test]
    fn test_zero_sweeps_rejected() {
        let argv = BASE.iter().copied().chain(["--sweeps", "0"]);
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_sweep_limit_parses() {
        let argv = BASE.iter().copied().chain(["--sweeps", "1"]);
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.sweeps, Some(1));

        let args = Args::try_parse_from(BASE).unwrap();
        assert_eq!(args.sweeps, None);
    }
}
