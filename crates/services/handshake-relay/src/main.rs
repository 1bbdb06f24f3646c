//! Handshake relay binary entry point
//!
//! Runs the WebSocket relay that forwards signaling frames between peers.
//!
//! # Usage
//!
//! ```bash
//! # Default address used by handshake-peer
//! cargo run -p handshake-relay
//!
//! # Listen on every interface
//! cargo run -p handshake-relay -- --listen 0.0.0.0:8891
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use handshake_signaling::RelayServer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// WebSocket relay for the signaling handshake
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8891", env = "HANDSHAKE_RELAY_LISTEN")]
    listen: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);
    ctrlc::set_handler(move || {
        if shutdown_flag_handler.swap(true, Ordering::SeqCst) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(130);
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("relay-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(args: Args, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %args.listen,
        "Handshake relay starting"
    );

    let server = RelayServer::bind(args.listen.as_str())
        .await
        .with_context(|| format!("Failed to bind relay to {}", args.listen))?;
    let handle = server.start();

    info!("Relay listening on {}. Press Ctrl+C to shutdown.", handle.url());

    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("Shutdown signal received, stopping relay...");
    handle.shutdown().await;
    info!("Relay shut down gracefully");

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
