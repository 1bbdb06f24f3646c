//! Handshake peer binary entry point
//!
//! Dials the relay, runs one signaling handshake in the selected role and
//! reports the negotiated descriptions.
//!
//! # Usage
//!
//! ```bash
//! # Start the relay first
//! cargo run -p handshake-relay
//!
//! # Then one peer per terminal
//! cargo run -p handshake-peer -- --receiver
//! cargo run -p handshake-peer -- --initiator
//!
//! # Full ICE (no trickled candidates), keep applying remote candidates
//! cargo run -p handshake-peer -- --initiator --gathering complete --linger
//!
//! # Configure STUN/TURN servers
//! cargo run -p handshake-peer -- --receiver \
//!   --stun-servers stun:stun.l.google.com:19302 \
//!   --turn-servers turn:turn.example.com:3478:user:secret
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use handshake_signaling::{
    GatheringPolicy, HandshakeConfig, NegotiationOptions, Negotiator, Role, SignalingChannel,
    TurnServerConfig, WebRtcEngine, WebSocketDialer, DEFAULT_RELAY_URL,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// WebRTC signaling handshake peer
///
/// Exchanges an offer, an answer and ICE candidates with one remote peer
/// through a WebSocket relay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).multiple(false).args(["initiator", "receiver"])))]
struct Args {
    /// Create and send the offer
    #[arg(long)]
    initiator: bool,

    /// Wait for the offer and send the answer
    #[arg(long)]
    receiver: bool,

    /// WebSocket relay URL
    #[arg(long, default_value = DEFAULT_RELAY_URL, env = "HANDSHAKE_RELAY_URL")]
    relay_url: String,

    /// STUN servers (comma-separated, empty for host candidates only)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302",
        env = "HANDSHAKE_STUN_SERVERS"
    )]
    stun_servers: Vec<String>,

    /// TURN servers (format: turn:host:port:username:password, comma-separated)
    #[arg(long, value_delimiter = ',', env = "HANDSHAKE_TURN_SERVERS")]
    turn_servers: Vec<String>,

    /// Candidate gathering: trickle, complete
    #[arg(long, default_value = "trickle", env = "HANDSHAKE_GATHERING")]
    gathering: GatheringArg,

    /// Seconds to wait for the remote description (0 = wait forever)
    #[arg(long, default_value_t = 30, env = "HANDSHAKE_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Label of the negotiated data channel
    #[arg(long, default_value = "handshake", env = "HANDSHAKE_DATA_CHANNEL")]
    data_channel: String,

    /// Do not negotiate a data channel
    #[arg(long)]
    no_data_channel: bool,

    /// After the handshake, keep applying remote candidates until Ctrl+C or
    /// the relay closes
    #[arg(long)]
    linger: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum GatheringArg {
    /// Send the description at once and trickle candidates
    Trickle,
    /// Wait for gathering and send a description with every candidate
    Complete,
}

impl From<GatheringArg> for GatheringPolicy {
    fn from(arg: GatheringArg) -> Self {
        match arg {
            GatheringArg::Trickle => GatheringPolicy::Trickle,
            GatheringArg::Complete => GatheringPolicy::Complete,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    // Role and configuration are settled before any network activity
    let role = Role::from_flags(args.initiator, args.receiver)?;
    let config = build_config_from_args(&args)?;
    config.validate()?;

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
        .thread_name("handshake-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(role, config, args.linger, shutdown_flag))
}

async fn async_main(
    role: Role,
    config: HandshakeConfig,
    linger: bool,
    shutdown_flag: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        %role,
        relay_url = %config.relay_url,
        gathering = ?config.gathering,
        stun_servers = config.stun_servers.len(),
        turn_servers = config.turn_servers.len(),
        "Handshake peer starting"
    );

    let channel = Arc::new(SignalingChannel::connect(&WebSocketDialer, &config.relay_url).await?);
    let engine = Arc::new(WebRtcEngine::new(&config).await?);

    let mut negotiator = Negotiator::new(
        role,
        Arc::clone(&engine),
        Arc::clone(&channel),
        NegotiationOptions::from(&config),
    );

    let outcome = negotiator.run().await?;
    info!(
        handshake_id = %negotiator.id(),
        offer_bytes = outcome.offer().sdp.len(),
        answer_bytes = outcome.answer().sdp.len(),
        "Descriptions exchanged"
    );
    debug!("Local description:\n{}", outcome.local().sdp);
    debug!("Remote description:\n{}", outcome.remote().sdp);

    if linger {
        info!("Applying remote candidates. Press Ctrl+C to exit.");
        tokio::select! {
            result = negotiator.accept_remote_candidates() => {
                let applied = result?;
                info!(applied, "Relay closed");
            }
            _ = wait_for_shutdown(&shutdown_flag) => {
                info!("Shutdown signal received");
            }
        }

        match tokio::time::timeout(Duration::from_secs(1), negotiator.relay_stats()).await {
            Ok(Some(stats)) => info!(
                forwarded = stats.forwarded,
                failed = stats.failed,
                "Local candidates relayed"
            ),
            Ok(None) => {}
            Err(_) => debug!("Local candidate gathering still running"),
        }
    }

    if let Err(e) = channel.close().await {
        warn!("Failed to close relay connection: {}", e);
    }
    engine.close().await?;

    info!("Handshake peer finished");
    Ok(())
}

async fn wait_for_shutdown(shutdown_flag: &AtomicBool) {
    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Parse TURN server from string format
///
/// Format: turn:host:port:username:password
/// Example: turn:turn.example.com:3478:user:pass
fn parse_turn_server(s: &str) -> Result<TurnServerConfig, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() < 5 {
        return Err(format!(
            "Invalid TURN server format: '{}'. Expected: turn:host:port:username:password",
            s
        ));
    }

    let protocol = parts[0];
    if protocol != "turn" && protocol != "turns" {
        return Err(format!(
            "Invalid TURN protocol: '{}'. Expected 'turn' or 'turns'",
            protocol
        ));
    }

    // Password may contain colons
    Ok(TurnServerConfig {
        url: format!("{}:{}:{}", protocol, parts[1], parts[2]),
        username: parts[3].to_string(),
        credential: parts[4..].join(":"),
    })
}

/// Build HandshakeConfig from CLI arguments
fn build_config_from_args(args: &Args) -> anyhow::Result<HandshakeConfig> {
    let turn_servers = args
        .turn_servers
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| parse_turn_server(s).map_err(anyhow::Error::msg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    for turn in &turn_servers {
        info!("Adding TURN server: {} (user: {})", turn.url, turn.username);
    }

    let mut config = HandshakeConfig::default()
        .with_relay_url(&args.relay_url)
        .with_turn_servers(turn_servers)
        .with_gathering(args.gathering.into())
        .with_timeout_secs(args.timeout_secs);

    config.stun_servers = args
        .stun_servers
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect();
    config.data_channel_label = if args.no_data_channel {
        None
    } else {
        Some(args.data_channel.clone())
    };

    Ok(config)
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
