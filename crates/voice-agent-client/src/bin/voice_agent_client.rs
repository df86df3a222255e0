//! Voice agent client binary entry point
//!
//! Connects to a voice agent server, streams the microphone to it and plays
//! the agent's audio on the speaker until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local server and stay connected until Ctrl+C
//! cargo run --bin voice-agent-client -- --server-url http://localhost:8000
//!
//! # Use a public STUN server and hang up after one minute
//! cargo run --bin voice-agent-client -- \
//!   --stun-servers stun:stun.l.google.com:19302 \
//!   --duration-secs 60
//!
//! # No audio devices (CI, containers): send silence, count received audio
//! cargo run --bin voice-agent-client -- --headless
//! ```

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voice_agent_client::{
    ClientConfig, CpalMicSource, CpalSpeakerSink, ErrorKind, MediaSource, PlaybackSink,
    RtpPlaybackSink, SessionController, SignalingClient, SilenceSource, WebRtcPeerLinkFactory,
};

/// Voice agent client
///
/// Opens a WebRTC audio session with a voice agent server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Voice agent server base URL
    #[arg(long, default_value = "http://localhost:8000", env = "VOICE_AGENT_SERVER_URL")]
    server_url: String,

    /// STUN servers (comma-separated)
    #[arg(long, value_delimiter = ',', env = "VOICE_AGENT_STUN_SERVERS")]
    stun_servers: Vec<String>,

    /// ICE gathering timeout in milliseconds (0 waits indefinitely)
    #[arg(
        long,
        default_value_t = 10_000,
        env = "VOICE_AGENT_ICE_GATHERING_TIMEOUT_MS"
    )]
    ice_gathering_timeout_ms: u64,

    /// Signaling request timeout in milliseconds (0 waits indefinitely)
    #[arg(long, default_value_t = 30_000, env = "VOICE_AGENT_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: u64,

    /// Hang up after this many seconds (default: run until Ctrl+C)
    #[arg(long, env = "VOICE_AGENT_DURATION_SECS")]
    duration_secs: Option<u64>,

    /// Send comfort silence and only count the agent's audio instead of
    /// using the microphone and speaker
    #[arg(long, env = "VOICE_AGENT_HEADLESS")]
    headless: bool,

    /// Playback statistics logging interval in seconds
    #[arg(long, default_value_t = 5, env = "VOICE_AGENT_STATS_INTERVAL_SECS")]
    stats_interval_secs: u64,
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            stun_servers: self.stun_servers.clone(),
            ice_gathering_timeout_ms: (self.ice_gathering_timeout_ms > 0)
                .then_some(self.ice_gathering_timeout_ms),
            request_timeout_ms: (self.request_timeout_ms > 0).then_some(self.request_timeout_ms),
            ..ClientConfig::new(self.server_url.clone())
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    let shutdown = Arc::new(Notify::new());
    let shutdown_handler = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        eprintln!("\nCtrl+C received, hanging up...");
        shutdown_handler.notify_one();
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("voice-agent-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown))
}

async fn async_main(
    args: Args,
    shutdown: Arc<Notify>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.client_config();
    info!("Voice agent client v{}", voice_agent_client::version());
    info!("Server: {}", config.offer_url());

    let (media, playback): (Arc<dyn MediaSource>, Arc<dyn PlaybackSink>) = if args.headless {
        info!("Headless mode: sending silence");
        (Arc::new(SilenceSource::new()), Arc::new(RtpPlaybackSink::new()))
    } else {
        (Arc::new(CpalMicSource::new()), Arc::new(CpalSpeakerSink::new()))
    };
    let controller = SessionController::new(
        config.clone(),
        Arc::new(WebRtcPeerLinkFactory::new(&config)),
        media,
        Arc::new(SignalingClient::new(&config)?),
        Arc::clone(&playback),
    )?;

    let mut state = controller.subscribe();
    let transitions = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();
            info!(
                state = %snapshot.connection_state,
                listening = snapshot.is_listening,
                "Session state changed"
            );
        }
    });

    if let Err(e) = controller.connect().await {
        error!("Connect failed: {}", e);
        if e.kind() == ErrorKind::MediaAcquisition {
            info!("Run with --headless on hosts without a microphone");
        }
        transitions.abort();
        return Err(e.into());
    }
    info!("Connected. Press Ctrl+C to hang up.");

    let mut state = controller.subscribe();
    let mut stats_ticker =
        tokio::time::interval(Duration::from_secs(args.stats_interval_secs.max(1)));
    let deadline = async {
        match args.duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = &mut deadline => {
                info!("Session duration reached");
                break;
            }
            changed = state.changed() => {
                if changed.is_err() || !state.borrow_and_update().is_connected() {
                    warn!("Remote side ended the session");
                    break;
                }
            }
            _ = stats_ticker.tick() => {
                let stats = playback.stats();
                info!(
                    packets = stats.packets,
                    bytes = stats.bytes,
                    source = stats.attached.as_deref().unwrap_or("none"),
                    "Playback statistics"
                );
            }
        }
    }

    controller.disconnect().await;
    transitions.abort();
    info!("Session closed");

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,voice_agent_client=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
