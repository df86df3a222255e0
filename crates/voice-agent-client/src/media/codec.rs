//! Opus framing between audio devices and RTP
//!
//! Device callbacks hand over interleaved `f32` buffers of whatever length the
//! backend picks. [`OpusFrameEncoder`] regroups them into 20 ms frames before
//! encoding, and [`OpusFrameDecoder`] turns RTP payloads back into
//! interleaved samples.

use crate::{Error, Result};
use bytes::Bytes;
use std::time::Duration;

/// WebRTC Opus always runs at 48 kHz
pub const SAMPLE_RATE: u32 = 48_000;

/// Duration of one encoded frame
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Samples per channel in one frame
pub const FRAME_SAMPLES: usize = SAMPLE_RATE as usize / 50;

/// Largest packet the encoder may produce
const MAX_PACKET_SIZE: usize = 4000;

/// 120 ms at 48 kHz, the longest Opus frame
const MAX_FRAME_SAMPLES: usize = 5760;

const BITRATE: i32 = 64_000;

fn opus_channels(channels: u16) -> Result<opus::Channels> {
    match channels {
        1 => Ok(opus::Channels::Mono),
        2 => Ok(opus::Channels::Stereo),
        n => Err(Error::Codec(format!(
            "Opus supports 1 (mono) or 2 (stereo) channels, got {}",
            n
        ))),
    }
}

/// Buffers device samples and encodes them 20 ms at a time
pub struct OpusFrameEncoder {
    encoder: opus::Encoder,
    channels: usize,
    pending: Vec<f32>,
}

impl OpusFrameEncoder {
    /// Create a voice encoder for `channels` interleaved channels
    pub fn new(channels: u16) -> Result<Self> {
        let mut encoder =
            opus::Encoder::new(SAMPLE_RATE, opus_channels(channels)?, opus::Application::Voip)
                .map_err(|e| Error::Codec(format!("Failed to create Opus encoder: {}", e)))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(BITRATE))
            .map_err(|e| Error::Codec(format!("Failed to set bitrate: {}", e)))?;

        Ok(Self {
            encoder,
            channels: channels as usize,
            pending: Vec::with_capacity(FRAME_SAMPLES * channels as usize * 2),
        })
    }

    /// Interleaved samples in one frame
    pub fn frame_len(&self) -> usize {
        FRAME_SAMPLES * self.channels
    }

    /// Samples waiting for a frame to fill up
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Buffer `samples` and encode every complete frame
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<Bytes>> {
        self.pending.extend_from_slice(samples);

        let frame_len = self.frame_len();
        let mut output = [0u8; MAX_PACKET_SIZE];
        let mut frames = Vec::with_capacity(self.pending.len() / frame_len);
        let mut consumed = 0;

        while self.pending.len() - consumed >= frame_len {
            let frame = &self.pending[consumed..consumed + frame_len];
            consumed += frame_len;
            match self.encoder.encode_float(frame, &mut output) {
                Ok(len) => frames.push(Bytes::copy_from_slice(&output[..len])),
                Err(e) => {
                    self.pending.drain(..consumed);
                    return Err(Error::Codec(format!("Opus encoding failed: {}", e)));
                }
            }
        }

        self.pending.drain(..consumed);
        Ok(frames)
    }
}

/// Decodes Opus RTP payloads to interleaved samples
pub struct OpusFrameDecoder {
    decoder: opus::Decoder,
    channels: usize,
}

impl OpusFrameDecoder {
    /// Create a decoder producing `channels` interleaved channels
    pub fn new(channels: u16) -> Result<Self> {
        let decoder = opus::Decoder::new(SAMPLE_RATE, opus_channels(channels)?)
            .map_err(|e| Error::Codec(format!("Failed to create Opus decoder: {}", e)))?;

        Ok(Self {
            decoder,
            channels: channels as usize,
        })
    }

    /// Decode one packet
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>> {
        let mut output = vec![0f32; MAX_FRAME_SAMPLES * self.channels];

        let len = self
            .decoder
            .decode_float(payload, &mut output, false)
            .map_err(|e| Error::Codec(format!("Opus decoding failed: {}", e)))?;

        output.truncate(len * self.channels);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_waits_for_full_frames() {
        let mut encoder = OpusFrameEncoder::new(1).unwrap();
        assert_eq!(encoder.frame_len(), 960);

        // Device buffers rarely line up with 20 ms
        let frames = encoder.push(&[0.0; 500]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(encoder.buffered(), 500);

        let frames = encoder.push(&[0.0; 1500]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(encoder.buffered(), 40);
        assert!(frames.iter().all(|f| !f.is_empty()));
    }

    #[test]
    fn test_stereo_frame_decodes_to_twenty_ms() {
        let mut encoder = OpusFrameEncoder::new(2).unwrap();
        let tone: Vec<f32> = (0..FRAME_SAMPLES * 2)
            .map(|i| ((i / 2) as f32 * 0.05).sin() * 0.3)
            .collect();
        let frames = encoder.push(&tone).unwrap();
        assert_eq!(frames.len(), 1);

        let mut decoder = OpusFrameDecoder::new(2).unwrap();
        let samples = decoder.decode(&frames[0]).unwrap();
        assert_eq!(samples.len(), FRAME_SAMPLES * 2);
    }

    #[test]
    fn test_rejects_surround_layouts() {
        assert!(matches!(OpusFrameEncoder::new(6), Err(Error::Codec(_))));
        assert!(matches!(OpusFrameDecoder::new(0), Err(Error::Codec(_))));
    }

    #[test]
    fn test_garbage_payload_is_a_codec_error() {
        let mut decoder = OpusFrameDecoder::new(1).unwrap();
        // TOC for a code-3 packet with a frame count of zero
        let err = decoder.decode(&[0x03, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }
}
