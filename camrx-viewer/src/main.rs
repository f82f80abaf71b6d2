//! camrx viewer: entry point.
//!
//! ```text
//! camrx-viewer                        Listen with defaults
//! camrx-viewer --config <path>        Use custom config TOML
//! camrx-viewer --port 7500            Override the listen port
//! camrx-viewer --demo                 Also stream a loopback test pattern
//! camrx-viewer --gen-config           Dump default config and exit
//! camrx-viewer --write-config <path>  Write default config to a file and exit
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use camrx_core::{Consumer, Receiver};

use camrx_viewer::config::ViewerConfig;
use camrx_viewer::demo;
use camrx_viewer::sinks::{FrameWriter, PoseLogger};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "camrx-viewer", about = "camrx camera stream receiver")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "camrx-viewer.toml")]
    config: PathBuf,

    /// UDP listen port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Stream a synthetic test pattern to the local receiver.
    #[arg(long)]
    demo: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to this path and exit.
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if let Some(path) = &cli.write_config {
        ViewerConfig::write_default(path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.listen_port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("camrx-viewer v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Start the receiver ───────────────────────────────────

    let mut receiver = Receiver::start(config.to_receiver_config()).await?;
    let shutdown = CancellationToken::new();

    // ── 2. Consumer ─────────────────────────────────────────────

    let frames = FrameWriter::new(config.frame_output());
    if let Some(path) = config.frame_output() {
        info!("writing frames to {}", path.display());
    }
    let poses = PoseLogger::new(config.consumer.log_pose);
    let consumer = Consumer::new(receiver.reader(), frames, poses);
    let consumer_handle = tokio::spawn(consumer.run(config.poll_interval(), shutdown.clone()));

    // ── 3. Optional loopback demo ───────────────────────────────

    let demo_handle = match (cli.demo, receiver.local_addr()) {
        (true, Some(addr)) => {
            let target = SocketAddr::from(([127, 0, 0, 1], addr.port()));
            let token = shutdown.clone();
            let variant = config.network.protocol;
            Some(tokio::spawn(async move {
                if let Err(e) = demo::run(target, variant, Duration::from_millis(33), token).await {
                    error!("demo stream failed: {e}");
                }
            }))
        }
        _ => None,
    };

    // ── 4. Wait for Ctrl-C ──────────────────────────────────────

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // ── 5. Shutdown ─────────────────────────────────────────────

    shutdown.cancel();
    receiver.stop().await;
    let _ = consumer_handle.await;
    if let Some(handle) = demo_handle {
        let _ = handle.await;
    }

    let stats = receiver.stats();
    info!(
        datagrams = stats.datagrams,
        frames = stats.frames_completed,
        abandoned = stats.frames_abandoned,
        superseded = stats.frames_superseded,
        poses = stats.pose_updates,
        dropped = stats.dropped,
        "receiver stats"
    );

    Ok(())
}
