use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use spinwatch_app::config::AppConfig;
use spinwatch_app::journal::RecognitionJournal;
use spinwatch_app::state::{RecognitionPolicy, RecognitionState};
use spinwatch_app::trigger::{
    DisplaySink, NullDisplay, TriggerConfig, TriggerLoop, TriggerLoopHandle,
};
use spinwatch_audio::{CaptureConfig, CaptureSession, DeviceManager};
use spinwatch_display::{DisplayConfig, LaMetricClient};
use spinwatch_foundation::{real_clock, AppState, ShutdownHandler, StateManager};
use spinwatch_recognize::{AcrCloudClient, AcrCloudConfig};

#[derive(Parser, Debug)]
#[command(
    name = "spinwatch",
    about = "Automatic music recognition for analog playback",
    version
)]
struct Cli {
    /// Path to the YAML config file (default: config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Recognize but do not push notifications to the display device
    #[arg(long)]
    dry_run: bool,

    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn init_logging() -> std::io::Result<()> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "spinwatch.log");
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    // The guard must outlive main for the file writer to keep flushing.
    std::mem::forget(guard);
    Ok(())
}

fn list_devices() {
    let manager = DeviceManager::new();
    let devices = manager.enumerate_inputs();
    if devices.is_empty() {
        println!("No audio input devices found");
        return;
    }
    println!("Available audio input devices:");
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!(
            "  {} [{} ch, {} Hz]{}",
            device.name, device.channels, device.default_sample_rate, marker
        );
    }
}

/// Build every component and start the trigger loop thread. Runs off the
/// async runtime: device startup blocks, and the HTTP clients are blocking
/// reqwest clients that must not be created on runtime threads.
fn start_pipeline(
    config: AppConfig,
    dry_run: bool,
    stop_flag: Arc<std::sync::atomic::AtomicBool>,
) -> anyhow::Result<TriggerLoopHandle> {
    // Audio first: a missing input device must fail startup before anything
    // else spins up.
    let capture = CaptureSession::start(CaptureConfig {
        device: config.audio.input_device.clone(),
        preferred_sample_rate: config.audio.sample_rate,
    })?;

    let recognizer = AcrCloudClient::new(AcrCloudConfig {
        access_key: config.acrcloud.access_key.clone(),
        access_secret: config.acrcloud.access_secret.clone(),
        host: config.acrcloud.host.clone(),
    })?;
    tracing::info!(host = %config.acrcloud.host, "Recognition client ready");

    let display: Box<dyn DisplaySink> = if dry_run {
        tracing::info!("Dry-run mode, display notifications disabled");
        Box::new(NullDisplay)
    } else if let Some(ip) = config.lametric.ip.clone() {
        tracing::info!(%ip, "Display client ready");
        Box::new(LaMetricClient::new(DisplayConfig {
            ip,
            api_key: config.lametric.api_key.clone(),
            icon: config.lametric.icon.clone(),
            cycles: config.lametric.cycles,
            lifetime_ms: config.lametric.lifetime,
        })?)
    } else {
        tracing::warn!("No display device configured, running without notifications");
        Box::new(NullDisplay)
    };

    let journal = RecognitionJournal::create(&config.logging.log_file_path)?;
    tracing::info!(path = %journal.path().display(), "Recognition journal ready");

    let clock = real_clock();
    let state = RecognitionState::new(
        RecognitionPolicy {
            cooldown: Duration::from_secs(config.recognition.cooldown_sec),
            silence_duration: Duration::from_secs_f64(config.audio.silence_duration_sec),
            max_failed_attempts: config.recognition.max_failed_attempts,
            pause_duration: Duration::from_secs(config.recognition.pause_duration_sec),
        },
        Arc::clone(&clock),
    );

    tracing::info!(
        volume_threshold_db = config.audio.volume_threshold_db,
        silence_threshold_db = config.audio.silence_threshold_db,
        clip_secs = config.audio.recognition_duration_sec,
        cooldown_secs = config.recognition.cooldown_sec,
        "SpinWatch configured"
    );

    let trigger = TriggerLoop::new(
        TriggerConfig {
            tick_interval: Duration::from_millis(100),
            volume_threshold_db: config.audio.volume_threshold_db,
            silence_threshold_db: config.audio.silence_threshold_db,
            clip_duration: Duration::from_secs_f64(config.audio.recognition_duration_sec),
        },
        state,
        capture,
        recognizer,
        display,
        journal,
        clock,
    );
    Ok(TriggerLoopHandle::spawn(trigger, stop_flag)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        list_devices();
        return Ok(());
    }

    init_logging()?;
    tracing::info!("Starting SpinWatch");

    let config = AppConfig::load(cli.config.as_deref())?;

    let state_manager = StateManager::new();
    let shutdown = ShutdownHandler::new().install().await;

    let stop_flag = shutdown.stop_flag();
    let dry_run = cli.dry_run;
    let loop_handle =
        tokio::task::spawn_blocking(move || start_pipeline(config, dry_run, stop_flag)).await??;

    state_manager.transition(AppState::Running)?;

    shutdown.wait().await;

    tracing::info!("Beginning graceful shutdown");
    state_manager.transition(AppState::Stopping)?;

    // The shutdown guard already set the shared stop flag; wait for the loop
    // to reach its next tick boundary and exit.
    tokio::task::spawn_blocking(move || loop_handle.join()).await?;

    state_manager.transition(AppState::Stopped)?;
    tracing::info!("Shutdown complete");

    Ok(())
}
