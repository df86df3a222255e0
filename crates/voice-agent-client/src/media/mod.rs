//! Local capture and remote playback
//!
//! - [`capture`]: the local audio stream sent to the agent
//! - [`playback`]: the sink the agent's inbound audio is attached to
//! - [`device`]: microphone and speaker on the host's audio devices
//! - [`codec`]: Opus framing between device samples and RTP payloads

pub mod capture;
pub mod codec;
pub mod device;
pub mod playback;

pub use capture::{LocalAudioTrack, LocalMediaStream, MediaConstraints, MediaSource, SilenceSource};
pub use codec::{OpusFrameDecoder, OpusFrameEncoder};
pub use device::{CpalMicSource, CpalSpeakerSink};
pub use playback::{InboundTrack, PlaybackSink, PlaybackStats, RemoteRtpTrack, RtpPlaybackSink};
