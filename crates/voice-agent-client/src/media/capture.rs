//! Local audio capture
//!
//! A [`MediaSource`] plays the role of the platform capture API: asked for an
//! audio-only stream, it either hands back a [`LocalMediaStream`] or fails with
//! [`Error::MediaAcquisition`]. The stream owns its tracks and stops all of them
//! on [`LocalMediaStream::stop`], which is safe to call any number of times.
//!
//! [`SilenceSource`] is the headless stand-in; the microphone lives in
//! [`CpalMicSource`](super::CpalMicSource).

use super::codec::{FRAME_DURATION, SAMPLE_RATE};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Opus TOC byte plus a zero-length frame: 20 ms of comfort silence
const OPUS_SILENCE_FRAME: [u8; 3] = [0xf8, 0xff, 0xfe];

/// What the caller asks the capture layer for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Capture audio
    pub audio: bool,
    /// Capture video (never requested by the session controller)
    pub video: bool,
}

impl MediaConstraints {
    /// A single audio-only input stream
    pub const AUDIO_ONLY: Self = Self {
        audio: true,
        video: false,
    };
}

/// Platform capture facility
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire a local stream satisfying `constraints`
    ///
    /// # Errors
    ///
    /// [`Error::MediaAcquisition`] on permission denial or missing device.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalMediaStream>;
}

struct TrackInner {
    id: String,
    track: Arc<dyn TrackLocal + Send + Sync>,
    stopped: AtomicBool,
    pacer: Mutex<Option<JoinHandle<()>>>,
}

/// One captured audio track
///
/// Cloning yields another handle to the same track; stopping through any
/// handle stops it for all of them.
#[derive(Clone)]
pub struct LocalAudioTrack {
    inner: Arc<TrackInner>,
}

impl LocalAudioTrack {
    /// Wrap a local track that has no feeding task
    pub fn new(id: impl Into<String>, track: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                track,
                stopped: AtomicBool::new(false),
                pacer: Mutex::new(None),
            }),
        }
    }

    /// Wrap a local track fed by `pacer`; the task is aborted on stop
    pub fn with_pacer(
        id: impl Into<String>,
        track: Arc<dyn TrackLocal + Send + Sync>,
        pacer: JoinHandle<()>,
    ) -> Self {
        let track = Self::new(id, track);
        *track.inner.pacer.lock() = Some(pacer);
        track
    }

    /// Track identifier
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The underlying track, for attaching to a peer connection
    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.inner.track)
    }

    /// Whether the track has been stopped
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Stop the track. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(pacer) = self.inner.pacer.lock().take() {
            pacer.abort();
        }
        debug!("Stopped local track {}", self.inner.id);
        true
    }
}

impl std::fmt::Debug for LocalAudioTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAudioTrack")
            .field("id", &self.inner.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The set of audio tracks captured for one session
#[derive(Debug)]
pub struct LocalMediaStream {
    id: String,
    tracks: Vec<LocalAudioTrack>,
}

impl LocalMediaStream {
    /// Create a stream from captured tracks
    pub fn new(id: impl Into<String>, tracks: Vec<LocalAudioTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Stream identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All tracks, stopped or not
    pub fn tracks(&self) -> &[LocalAudioTrack] {
        &self.tracks
    }

    /// Number of tracks not yet stopped
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| !t.is_stopped()).count()
    }

    /// Stop every track. Returns how many were still live.
    pub fn stop(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

/// Capture source producing a single Opus track of comfort silence
///
/// Stands in for a microphone on headless hosts and in integration tests.
/// Frames are paced in real time so the remote side sees a live RTP flow.
#[derive(Debug, Clone, Default)]
pub struct SilenceSource;

impl SilenceSource {
    /// Create a silence source
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for SilenceSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalMediaStream> {
        if !constraints.audio {
            return Err(Error::MediaAcquisition(
                "silence source only provides audio".to_string(),
            ));
        }

        let stream_id = format!("local-{}", uuid::Uuid::new_v4());
        let track_id = format!("audio-{}", uuid::Uuid::new_v4());
        let track = opus_track(&track_id, &stream_id);

        let pacer = tokio::spawn(pace_silence(Arc::clone(&track)));

        info!("Acquired silence audio stream {}", stream_id);

        Ok(LocalMediaStream::new(
            stream_id,
            vec![LocalAudioTrack::with_pacer(
                track_id,
                track as Arc<dyn TrackLocal + Send + Sync>,
                pacer,
            )],
        ))
    }
}

/// Outbound Opus track as negotiated by default WebRTC codecs
pub(crate) fn opus_track(track_id: &str, stream_id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: SAMPLE_RATE,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
            rtcp_feedback: vec![],
        },
        track_id.to_string(),
        stream_id.to_string(),
    ))
}

async fn pace_silence(track: Arc<TrackLocalStaticSample>) {
    let sample = Sample {
        data: Bytes::from_static(&OPUS_SILENCE_FRAME),
        duration: FRAME_DURATION,
        ..Default::default()
    };

    let mut ticker = tokio::time::interval(FRAME_DURATION);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        // Unbound tracks drop the sample; that is expected before negotiation
        if let Err(e) = track.write_sample(&sample).await {
            trace!("Silence frame not written: {}", e);
        }
    }
}
