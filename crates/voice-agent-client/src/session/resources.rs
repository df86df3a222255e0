//! Per-session owned resources

use super::state::ResourceSummary;
use crate::media::{LocalMediaStream, PlaybackSink};
use crate::peer::PeerLink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Everything one session acquires, released exactly once
///
/// Each field is taken on release, so a second [`SessionResources::release`]
/// finds nothing to do.
pub(crate) struct SessionResources {
    pub(crate) generation: u64,
    pub(crate) link: Option<Arc<dyn PeerLink>>,
    pub(crate) media: Option<LocalMediaStream>,
    pub(crate) event_pump: Option<JoinHandle<()>>,
}

/// How the event pump is handled on release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpRelease {
    /// Abort the pump task
    Abort,
    /// Detach it; the pump itself is the caller
    Detach,
}

impl SessionResources {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            link: None,
            media: None,
            event_pump: None,
        }
    }

    pub(crate) fn summary(&self) -> ResourceSummary {
        ResourceSummary {
            peer_link: self.link.is_some(),
            local_tracks: self
                .media
                .as_ref()
                .map(LocalMediaStream::live_track_count)
                .unwrap_or(0),
        }
    }

    /// Release every resource, best-effort
    ///
    /// Failures are logged and never stop the remaining steps.
    pub(crate) async fn release(&mut self, playback: &dyn PlaybackSink, pump: PumpRelease) {
        if let Some(media) = self.media.take() {
            let stopped = media.stop();
            debug!("Stopped {} local track(s) of stream {}", stopped, media.id());
        }

        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                warn!("Failed to close peer link {}: {}", link.link_id(), e);
            }
        }

        playback.detach();

        if let Some(handle) = self.event_pump.take() {
            match pump {
                PumpRelease::Abort => handle.abort(),
                PumpRelease::Detach => drop(handle),
            }
        }
    }
}
