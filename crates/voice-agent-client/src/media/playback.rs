//! Remote audio playback
//!
//! The agent's audio arrives as an inbound track on the peer connection. The
//! session controller attaches the first inbound stream to a [`PlaybackSink`],
//! which starts consuming it immediately, and detaches it on teardown.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use webrtc::track::track_remote::TrackRemote;

/// Media received from the remote party
#[async_trait]
pub trait InboundTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> String;

    /// Identifier of the stream the track belongs to
    fn stream_id(&self) -> String;

    /// Next media payload, or `None` once the track has ended
    async fn read_payload(&self) -> Result<Option<Bytes>>;
}

/// Inbound RTP track from a `webrtc` peer connection
pub struct RemoteRtpTrack {
    track: Arc<TrackRemote>,
}

impl RemoteRtpTrack {
    /// Wrap a remote track
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl InboundTrack for RemoteRtpTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn stream_id(&self) -> String {
        self.track.stream_id()
    }

    async fn read_payload(&self) -> Result<Option<Bytes>> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => Ok(Some(packet.payload)),
            Err(e) if is_end_of_track(&e) => Ok(None),
            Err(e) => Err(Error::Other(anyhow::anyhow!(
                "Failed to read RTP from {}: {}",
                self.track.id(),
                e
            ))),
        }
    }
}

/// Errors `TrackRemote::read_rtp` reports once the receiver has shut down
fn is_end_of_track(err: &webrtc::Error) -> bool {
    matches!(
        err,
        webrtc::Error::ErrClosedPipe
            | webrtc::Error::ErrConnectionClosed
            | webrtc::Error::ErrRTPReceiverNil
            | webrtc::Error::Interceptor(webrtc::interceptor::Error::ErrIoEOF)
            | webrtc::Error::Util(webrtc::util::Error::ErrBufferClosed)
    )
}

/// Audio output the inbound stream is attached to
pub trait PlaybackSink: Send + Sync {
    /// Start playing `track`, replacing any current source
    fn attach(&self, track: Arc<dyn InboundTrack>);

    /// Stop playing and clear the source. No-op when nothing is attached.
    fn detach(&self);

    /// Receive counters; sinks that keep none report zeros
    fn stats(&self) -> PlaybackStats {
        PlaybackStats::default()
    }
}

/// Snapshot of a sink's receive counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Id of the currently attached track
    pub attached: Option<String>,
    /// Payloads received over the sink's lifetime
    pub packets: u64,
    /// Payload bytes received over the sink's lifetime
    pub bytes: u64,
    /// Number of times a source was attached
    pub attachments: u64,
}

struct Attached {
    track_id: String,
    reader: JoinHandle<()>,
}

#[derive(Default)]
struct Counters {
    packets: AtomicU64,
    bytes: AtomicU64,
}

/// The attached inbound source and the task reading it
///
/// Shared by the sinks in this crate: each attach spawns a reader that counts
/// every payload and hands it to the sink's consumer.
#[derive(Default)]
pub(crate) struct SourceSlot {
    current: Mutex<Option<Attached>>,
    counters: Arc<Counters>,
    attachments: AtomicU64,
}

impl SourceSlot {
    /// Read `track` until it ends, the slot is detached, or `consume` returns `false`
    pub(crate) fn attach<F>(&self, track: Arc<dyn InboundTrack>, mut consume: F)
    where
        F: FnMut(Bytes) -> bool + Send + 'static,
    {
        let track_id = track.id();
        info!(
            "Attaching inbound stream {} (track {}) to playback",
            track.stream_id(),
            track_id
        );

        let counters = Arc::clone(&self.counters);
        let reader_track_id = track_id.clone();
        let reader = tokio::spawn(async move {
            loop {
                match track.read_payload().await {
                    Ok(Some(payload)) => {
                        counters.packets.fetch_add(1, Ordering::Relaxed);
                        counters
                            .bytes
                            .fetch_add(payload.len() as u64, Ordering::Relaxed);
                        if !consume(payload) {
                            debug!("Playback of {} stopped consuming", reader_track_id);
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Inbound track {} ended", reader_track_id);
                        break;
                    }
                    Err(e) => {
                        debug!("Inbound track {} stopped: {}", reader_track_id, e);
                        break;
                    }
                }
            }
        });

        self.attachments.fetch_add(1, Ordering::Relaxed);
        let previous = self.current.lock().replace(Attached { track_id, reader });
        if let Some(previous) = previous {
            debug!("Replacing playback source {}", previous.track_id);
            previous.reader.abort();
        }
    }

    pub(crate) fn detach(&self) {
        if let Some(previous) = self.current.lock().take() {
            debug!("Detaching playback source {}", previous.track_id);
            previous.reader.abort();
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.current.lock().is_some()
    }

    pub(crate) fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            attached: self.current.lock().as_ref().map(|a| a.track_id.clone()),
            packets: self.counters.packets.load(Ordering::Relaxed),
            bytes: self.counters.bytes.load(Ordering::Relaxed),
            attachments: self.attachments.load(Ordering::Relaxed),
        }
    }
}

/// Playback sink that drains inbound RTP and keeps receive counters
///
/// Starts reading as soon as a source is attached, the way an autoplay audio
/// element does. Nothing is decoded; used where no output device exists.
#[derive(Default)]
pub struct RtpPlaybackSink {
    source: SourceSlot,
}

impl RtpPlaybackSink {
    /// Create an idle sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a source is attached
    pub fn is_attached(&self) -> bool {
        self.source.is_attached()
    }
}

impl PlaybackSink for RtpPlaybackSink {
    fn attach(&self, track: Arc<dyn InboundTrack>) {
        self.source.attach(track, |_| true);
    }

    fn detach(&self) {
        self.source.detach();
    }

    fn stats(&self) -> PlaybackStats {
        self.source.stats()
    }
}
