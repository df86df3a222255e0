//! Microphone capture and speaker playback on the host's audio devices
//!
//! cpal streams must stay on the thread that built them, so each device runs
//! on its own named thread. Channels bridge those threads to the async side:
//! the microphone thread sends encoded Opus frames to a task that writes them
//! to the outbound track, and the speaker thread receives RTP payloads from
//! the inbound reader. Dropping the async end of a channel stops its thread,
//! which drops the stream and releases the device.

use super::capture::{opus_track, LocalAudioTrack, LocalMediaStream, MediaConstraints, MediaSource};
use super::codec::{OpusFrameDecoder, OpusFrameEncoder, FRAME_DURATION, SAMPLE_RATE};
use super::playback::{InboundTrack, PlaybackSink, PlaybackStats, SourceSlot};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// How often an idle capture thread checks whether its track was stopped
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Decoded audio queued ahead of the output device, at most 500 ms
const PLAYOUT_CAPACITY_MS: usize = 500;

/// Pick a 48 kHz `f32` layout Opus can carry, closest to `preferred_channels`
fn pick_config<I>(ranges: I, preferred_channels: u16) -> Option<SupportedStreamConfig>
where
    I: IntoIterator<Item = SupportedStreamConfigRange>,
{
    ranges
        .into_iter()
        .filter(|range| {
            range.sample_format() == SampleFormat::F32
                && (1..=2).contains(&range.channels())
                && range.min_sample_rate().0 <= SAMPLE_RATE
                && range.max_sample_rate().0 >= SAMPLE_RATE
        })
        .min_by_key(|range| range.channels().abs_diff(preferred_channels))
        .map(|range| range.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)))
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".to_string())
}

/// Capture source reading the host's default input device
///
/// Each acquisition opens the device, encodes 20 ms Opus frames on a
/// dedicated thread and feeds them to one outbound track. A missing device,
/// an unsupported layout or a refused stream all surface as
/// [`Error::MediaAcquisition`].
#[derive(Debug, Clone, Default)]
pub struct CpalMicSource;

impl CpalMicSource {
    /// Create a microphone source
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for CpalMicSource {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalMediaStream> {
        if !constraints.audio {
            return Err(Error::MediaAcquisition(
                "microphone source only provides audio".to_string(),
            ));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture(frames_tx, ready_tx))?;

        let device = ready_rx.await.map_err(|_| {
            Error::MediaAcquisition("capture thread exited before opening a device".to_string())
        })??;

        let stream_id = format!("local-{}", uuid::Uuid::new_v4());
        let track_id = format!("audio-{}", uuid::Uuid::new_v4());
        let track = opus_track(&track_id, &stream_id);
        let pacer = tokio::spawn(forward_frames(Arc::clone(&track), frames_rx));

        info!("Capturing from '{}' into stream {}", device, stream_id);

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

struct OpenedInput {
    device: String,
    stream: cpal::Stream,
    samples: std_mpsc::Receiver<Vec<f32>>,
    encoder: OpusFrameEncoder,
}

fn open_input() -> Result<OpenedInput> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::MediaAcquisition("No default input device available".to_string()))?;
    let name = device_name(&device);

    let ranges = device.supported_input_configs().map_err(|e| {
        Error::MediaAcquisition(format!("Cannot query input device '{}': {}", name, e))
    })?;
    let config = pick_config(ranges, 1).ok_or_else(|| {
        Error::MediaAcquisition(format!(
            "Input device '{}' has no 48 kHz mono or stereo f32 layout",
            name
        ))
    })?;
    let encoder = OpusFrameEncoder::new(config.channels())?;

    let (tx, samples) = std_mpsc::channel();
    let stream = device
        .build_input_stream(
            &config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(data.to_vec());
            },
            |err| {
                error!("Audio capture error: {}", err);
            },
            None,
        )
        .map_err(|e| {
            Error::MediaAcquisition(format!("Cannot open input device '{}': {}", name, e))
        })?;

    stream.play().map_err(|e| {
        Error::MediaAcquisition(format!("Cannot start input device '{}': {}", name, e))
    })?;

    Ok(OpenedInput {
        device: name,
        stream,
        samples,
        encoder,
    })
}

fn run_capture(frames: mpsc::UnboundedSender<Bytes>, ready: oneshot::Sender<Result<String>>) {
    let OpenedInput {
        device,
        stream,
        samples,
        mut encoder,
    } = match open_input() {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(device.clone())).is_err() {
        return;
    }

    'capture: loop {
        match samples.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => {
                let encoded = match encoder.push(&chunk) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        warn!("Dropping captured audio: {}", e);
                        continue;
                    }
                };
                for frame in encoded {
                    if frames.send(frame).is_err() {
                        break 'capture;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) if frames.is_closed() => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Input device '{}' stopped delivering audio", device);
                break;
            }
        }
    }

    drop(stream);
    debug!("Released input device '{}'", device);
}

/// Write encoded frames to the outbound track until the capture thread stops
async fn forward_frames(
    track: Arc<TrackLocalStaticSample>,
    mut frames: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(data) = frames.recv().await {
        let sample = Sample {
            data,
            duration: FRAME_DURATION,
            ..Default::default()
        };
        // Unbound tracks drop the sample before negotiation completes
        if let Err(e) = track.write_sample(&sample).await {
            trace!("Captured frame not written: {}", e);
        }
    }
}

/// Decoded samples waiting for the output callback
///
/// Holds at most `capacity` samples; when the network outruns the device the
/// oldest audio is dropped so latency stays bounded.
struct PlayoutBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl PlayoutBuffer {
    fn new(channels: u16) -> Self {
        let capacity = SAMPLE_RATE as usize / 1000 * PLAYOUT_CAPACITY_MS * channels as usize;
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, decoded: &[f32]) {
        self.samples.extend(decoded.iter().copied());
        let overflow = self.samples.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.samples.drain(..overflow);
        }
    }

    /// Fill `out`, padding with silence on underrun
    fn fill(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.samples.pop_front().unwrap_or(0.0);
        }
    }
}

/// Playback sink decoding the agent's audio to the default output device
///
/// Every attach starts a playback thread that owns the output stream for
/// that source; detaching or replacing the source ends it. When no output
/// device can be opened the inbound audio is still drained and counted.
#[derive(Default)]
pub struct CpalSpeakerSink {
    source: SourceSlot,
}

impl CpalSpeakerSink {
    /// Create an idle sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a source is attached
    pub fn is_attached(&self) -> bool {
        self.source.is_attached()
    }
}

impl PlaybackSink for CpalSpeakerSink {
    fn attach(&self, track: Arc<dyn InboundTrack>) {
        let (payloads_tx, payloads_rx) = std_mpsc::channel::<Bytes>();
        let track_id = track.id();

        let spawned = std::thread::Builder::new()
            .name("speaker-playback".to_string())
            .spawn(move || run_playback(track_id, payloads_rx));

        match spawned {
            Ok(_) => self
                .source
                .attach(track, move |payload| payloads_tx.send(payload).is_ok()),
            Err(e) => {
                warn!("Cannot start playback thread, draining without output: {}", e);
                self.source.attach(track, |_| true);
            }
        }
    }

    fn detach(&self) {
        self.source.detach();
    }

    fn stats(&self) -> PlaybackStats {
        self.source.stats()
    }
}

struct OpenedOutput {
    device: String,
    stream: cpal::Stream,
    playout: Arc<Mutex<PlayoutBuffer>>,
    decoder: OpusFrameDecoder,
}

fn open_output() -> Result<OpenedOutput> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("No output device available"))?;
    let name = device_name(&device);

    let ranges = device
        .supported_output_configs()
        .map_err(|e| anyhow::anyhow!("Cannot query output device '{}': {}", name, e))?;
    let config = pick_config(ranges, 2).ok_or_else(|| {
        anyhow::anyhow!(
            "Output device '{}' has no 48 kHz mono or stereo f32 layout",
            name
        )
    })?;
    let channels = config.channels();
    let decoder = OpusFrameDecoder::new(channels)?;

    let playout = Arc::new(Mutex::new(PlayoutBuffer::new(channels)));
    let callback_playout = Arc::clone(&playout);
    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback_playout.lock().fill(data);
            },
            |err| {
                error!("Audio playback error: {}", err);
            },
            None,
        )
        .map_err(|e| anyhow::anyhow!("Cannot open output device '{}': {}", name, e))?;

    stream
        .play()
        .map_err(|e| anyhow::anyhow!("Cannot start output device '{}': {}", name, e))?;

    Ok(OpenedOutput {
        device: name,
        stream,
        playout,
        decoder,
    })
}

fn run_playback(track_id: String, payloads: std_mpsc::Receiver<Bytes>) {
    let OpenedOutput {
        device,
        stream,
        playout,
        mut decoder,
    } = match open_output() {
        Ok(opened) => opened,
        Err(e) => {
            warn!("Playing {} without output: {}", track_id, e);
            for _ in payloads {}
            return;
        }
    };

    info!("Playing {} on '{}'", track_id, device);

    for payload in payloads {
        match decoder.decode(&payload) {
            Ok(samples) => playout.lock().push(&samples),
            Err(e) => trace!("Skipping undecodable payload from {}: {}", track_id, e),
        }
    }

    drop(stream);
    debug!("Released output device '{}'", device);
}
