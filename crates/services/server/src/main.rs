//! VidAnalyze service binary: loads configuration, builds the Track
//! Manager and WebRTC transport, subscribes the configured tracks, and
//! runs until signalled to stop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vidanalyze_pipeline::TrackManager;
use vidanalyze_webrtc::WebRtcTransport;

mod config;

use config::ServerConfig;

/// Real-time video analysis service: ingest, inference, re-encode, WebRTC publish.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml", env = "VIDANALYZE_CONFIG")]
    config: PathBuf,

    /// Seconds a track may sit with zero subscribers before it's reaped.
    #[arg(long, default_value_t = 30, env = "VIDANALYZE_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);
    ctrlc::set_handler(move || {
        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }
        std::thread::spawn(|| {
            std::thread::sleep(Duration::from_secs(3));
            eprintln!("graceful shutdown timed out after 3s, forcing exit");
            std::process::exit(0);
        });
    })
    .context("failed to install Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("vidanalyze-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(args: Args, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), config = ?args.config, "vidanalyze starting");

    let config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    let transport = Arc::new(
        WebRtcTransport::new(&config.bind_addr, config.signaling_port, config.ice_port_range)
            .context("failed to initialize WebRTC transport")?,
    );

    let track_manager = Arc::new(TrackManager::new());

    for pipeline_config in config.into_pipeline_configs() {
        let key = track_manager
            .subscribe(transport.as_ref(), pipeline_config)
            .context("failed to subscribe configured track")?;
        info!(key = %key, "subscribed track from configuration");
    }

    let idle_timeout = Duration::from_secs(args.idle_timeout_secs);
    let reaper_manager = Arc::clone(&track_manager);
    let reaper_shutdown = Arc::clone(&shutdown_flag);
    let reaper = tokio::spawn(async move {
        while !reaper_shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
            reaper_manager.reap_idle(idle_timeout);
        }
    });

    info!("vidanalyze running, press Ctrl+C to stop");
    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("shutdown signal received, stopping all tracks");
    track_manager.shutdown_all();
    reaper.abort();

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
