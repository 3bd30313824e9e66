mod handler;
mod sink;

use anyhow::Context;
use clap::Parser;
use handler::LogNowPlaying;
use pmoconfig::{get_config, Config};
use pmostation::{ChannelPlayer, RadioConfig, SessionRegistry, StationRecord};
use sink::FileTransport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Channel name used for the file sink
const CHANNEL: &str = "radiyo";

/// Period of the "currently playing" status line
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "pmoradiyo")]
#[command(about = "Stream an internet radio station to disk and log what is on air")]
#[command(version)]
struct Args {
    /// Stream URL of the station
    url: String,

    /// Display name of the station
    #[arg(short, long)]
    name: Option<String>,

    /// Directory receiving the recorded audio
    #[arg(short, long, default_value = "recordings")]
    output: PathBuf,

    /// Configuration directory (defaults to PMORADIYO_CONFIG, ./.pmoradiyo, ~/.pmoradiyo)
    #[arg(short, long)]
    config_dir: Option<String>,
}

fn init_logging(config: &Config) {
    // RUST_LOG a priorité sur la configuration
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let level = config
                .get_log_min_level()
                .unwrap_or_else(|_| "INFO".to_string());
            EnvFilter::try_new(level.to_lowercase())
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let enable_console = config.get_log_enable_console().unwrap_or(true);
    let console = enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // ========== PHASE 1 : Configuration ==========
    let config = match &args.config_dir {
        Some(dir) => Arc::new(Config::load_config(dir)?),
        None => get_config(),
    };
    init_logging(&config);
    info!("⚙️ Using config directory {}", config.config_dir());

    let radio = RadioConfig::from_config(&config)?;

    // ========== PHASE 2 : Moteur de sessions ==========
    info!("📻 Starting session registry...");
    let registry = Arc::new(SessionRegistry::with_http(&radio).context("Failed to build HTTP client")?);

    let stop = CancellationToken::new();
    let sweeper = registry.spawn_zombie_sweeper(radio.zombie_sweep_interval, stop.clone());

    let player = ChannelPlayer::new(
        CHANNEL,
        registry.clone(),
        Arc::new(FileTransport::new(&args.output)),
        Arc::new(LogNowPlaying),
    );

    let mut station = StationRecord::from_url(&args.url);
    if let Some(name) = args.name {
        station.name = name;
    }

    // ========== PHASE 3 : Lecture ==========
    player
        .play(&station)
        .await
        .with_context(|| format!("Could not play {}", station.stream_url))?;
    info!("✅ PMORadiYo is ready!");
    info!("Press Ctrl+C to stop...");

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("🛑 Stopping...");
                break;
            }
            _ = status.tick() => {
                if player.now_playing().await.is_none() {
                    info!("Station stopped, exiting");
                    break;
                }
                for playing in registry.currently_playing() {
                    info!(
                        station = %playing.station_id,
                        listeners = playing.listener_count,
                        "📡 Currently playing"
                    );
                }
            }
        }
    }

    player.stop().await;
    stop.cancel();
    let _ = sweeper.await;
    registry.shutdown();

    Ok(())
}
