//! WebRTC client for real-time voice agent sessions
//!
//! Establishes a two-way audio call with a voice agent server: local audio is
//! captured, a peer connection is negotiated through a single HTTP
//! offer/answer exchange, and the agent's audio is attached to a playback sink.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Presentation layer (UI, CLI)                            │
//! │  ↓ connect() / disconnect() / subscribe()                │
//! │  SessionController                                       │
//! │  ├─ MediaSource      → LocalMediaStream (microphone)     │
//! │  ├─ PeerLinkFactory  → PeerLink (webrtc peer connection) │
//! │  │   └─ PeerLinkEvent channel → event pump               │
//! │  ├─ Signaling        → POST {server}/webrtc/offer        │
//! │  └─ PlaybackSink     ← inbound agent audio (speaker)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use voice_agent_client::ClientConfig;
//!
//! let config = ClientConfig {
//!     stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
//!     ..ClientConfig::new("http://localhost:8000")
//! };
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.offer_url(), "http://localhost:8000/webrtc/offer");
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use voice_agent_client::{ClientConfig, SessionController};
//!
//! # tokio_test::block_on(async {
//! let controller = SessionController::with_defaults(ClientConfig::default())?;
//!
//! controller.connect().await?;
//! assert!(controller.snapshot().is_listening);
//!
//! controller.disconnect().await;
//! # Ok::<(), voice_agent_client::Error>(())
//! # }).unwrap();
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::{ClientConfig, TurnServerConfig};
pub use error::{Error, ErrorKind, Result};
pub use media::{
    CpalMicSource, CpalSpeakerSink, MediaSource, PlaybackSink, PlaybackStats, RtpPlaybackSink,
    SilenceSource,
};
pub use peer::{PeerLink, PeerLinkFactory, WebRtcPeerLinkFactory};
pub use session::{ConnectionState, ResourceSummary, SessionController, SessionSnapshot};
pub use signaling::{Signaling, SignalingAnswer, SignalingClient, SignalingOffer};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
