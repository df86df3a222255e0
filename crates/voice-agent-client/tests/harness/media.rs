//! Capture sources for integration testing

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use voice_agent_client::media::{LocalAudioTrack, LocalMediaStream, MediaConstraints};
use voice_agent_client::{Error, MediaSource, Result, SilenceSource};

/// Silence source that keeps a handle on every track it hands out
#[derive(Default)]
pub struct RecordingSource {
    inner: SilenceSource,
    acquisitions: AtomicUsize,
    tracks: Mutex<Vec<LocalAudioTrack>>,
    constraints: Mutex<Vec<MediaConstraints>>,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Tracks handed out and not yet stopped
    pub fn live_tracks(&self) -> usize {
        self.tracks.lock().iter().filter(|t| !t.is_stopped()).count()
    }

    /// Constraints of every request
    pub fn requested(&self) -> Vec<MediaConstraints> {
        self.constraints.lock().clone()
    }
}

#[async_trait]
impl MediaSource for RecordingSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalMediaStream> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.constraints.lock().push(constraints);

        let stream = self.inner.acquire(constraints).await?;
        self.tracks.lock().extend(stream.tracks().iter().cloned());
        Ok(stream)
    }
}

/// Source that refuses every request, like a denied permission prompt
#[derive(Default)]
pub struct DeniedSource {
    attempts: AtomicUsize,
}

impl DeniedSource {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for DeniedSource {
    async fn acquire(&self, _constraints: MediaConstraints) -> Result<LocalMediaStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::MediaAcquisition(
            "Permission denied: microphone access was refused".to_string(),
        ))
    }
}
