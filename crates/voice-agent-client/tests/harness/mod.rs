//! Voice agent client integration test harness
//!
//! Provides:
//! - An embedded axum signaling server on a random port that answers offers
//!   with a real `webrtc` peer connection, or with a scripted failure
//! - A scripted peer link factory whose events tests inject by hand
//! - Media sources that record acquisitions or refuse them
//! - A signaling stub that counts exchanges

#![allow(dead_code)]

pub mod links;
pub mod media;
pub mod server;

pub use links::{MockPeerLinkFactory, ScriptedTrack};
pub use media::{DeniedSource, RecordingSource};
pub use server::{CountingSignaling, MockMode, MockSignalingServer, RecordedOffer};

use std::time::Duration;
use tokio::sync::watch;
use voice_agent_client::{ConnectionState, SessionSnapshot};

/// Initialize test logging (call once per test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,voice_agent_client=debug")
        .with_test_writer()
        .try_init();
}

/// Wait until the published state is `target`
pub async fn wait_for_state(
    state: &mut watch::Receiver<SessionSnapshot>,
    target: ConnectionState,
    timeout: Duration,
) -> SessionSnapshot {
    let snapshot = tokio::time::timeout(timeout, state.wait_for(|s| s.connection_state == target))
        .await
        .unwrap_or_else(|_| panic!("state {} not reached within {:?}", target, timeout))
        .expect("controller dropped");
    snapshot.clone()
}
