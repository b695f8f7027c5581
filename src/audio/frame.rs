//! # Frame Slicing
//!
//! Slices raw PCM byte streams into the fixed-duration frames the speech
//! classifier consumes. The WebRTC VAD only accepts frames of 10, 20 or
//! 30 ms at one of four sample rates, so everything downstream works in
//! whole frames of `sample_rate * frame_duration_ms / 1000` samples.
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 8000, 16000, 32000 or 48000 Hz
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Sample rates accepted by the frame classifier.
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];

/// Frame durations accepted by the frame classifier.
pub const SUPPORTED_FRAME_DURATIONS_MS: [u32; 3] = [10, 20, 30];

/// Framing parameters for one connection's audio stream.
///
/// ## Fields:
/// - `sample_rate`: rate of the inbound PCM stream in Hz
/// - `frame_duration_ms`: duration of each classified frame
/// - `padding_duration_ms`: trailing window the segmenter inspects when
///   deciding whether speech has started or ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub padding_duration_ms: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_duration_ms: 30,
            padding_duration_ms: 300,
        }
    }
}

impl FrameConfig {
    /// Validate the configuration against what the classifier supports.
    pub fn validate(&self) -> Result<(), String> {
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(format!(
                "Sample rate must be one of {:?}, got {}",
                SUPPORTED_SAMPLE_RATES, self.sample_rate
            ));
        }
        if !SUPPORTED_FRAME_DURATIONS_MS.contains(&self.frame_duration_ms) {
            return Err(format!(
                "Frame duration must be one of {:?} ms, got {}",
                SUPPORTED_FRAME_DURATIONS_MS, self.frame_duration_ms
            ));
        }
        if self.padding_duration_ms < self.frame_duration_ms {
            return Err(format!(
                "Padding duration ({} ms) must cover at least one frame ({} ms)",
                self.padding_duration_ms, self.frame_duration_ms
            ));
        }
        Ok(())
    }

    /// Number of samples in one complete frame.
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Ring buffer capacity: how many frames fit in the padding window.
    pub fn padding_frames(&self) -> usize {
        (self.padding_duration_ms / self.frame_duration_ms) as usize
    }
}

/// Decode little-endian 16-bit PCM bytes into samples.
///
/// A trailing odd byte cannot form a sample and is dropped.
pub fn decode_pcm(data: &[u8]) -> Vec<i16> {
    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }
    samples
}

/// Encode samples back to little-endian 16-bit PCM bytes.
pub fn encode_pcm(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Writing to a Vec cannot fail
        bytes.write_i16::<LittleEndian>(sample).ok();
    }
    bytes
}

/// Slice a sample buffer into complete frames.
///
/// Returns the complete frames in order plus the undersized trailing
/// remainder. The remainder is never classified; callers that accept
/// the up-to-one-frame loss at chunk boundaries simply drop it.
pub fn split_frames(samples: &[i16], frame_size: usize) -> (Vec<&[i16]>, &[i16]) {
    let chunks = samples.chunks_exact(frame_size);
    let remainder = chunks.remainder();
    (chunks.collect(), remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FrameConfig::default();
        assert!(config.validate().is_ok());
        // 30ms at 16kHz
        assert_eq!(config.frame_size(), 480);
        // 300ms padding / 30ms frames
        assert_eq!(config.padding_frames(), 10);
    }

    #[test]
    fn test_unsupported_rates_rejected() {
        let config = FrameConfig {
            sample_rate: 44100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = FrameConfig {
            frame_duration_ms: 25,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_frames_drops_remainder() {
        let samples: Vec<i16> = (0..10).collect();
        let (frames, remainder) = split_frames(&samples, 4);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], &[0, 1, 2, 3]);
        assert_eq!(frames[1], &[4, 5, 6, 7]);
        assert_eq!(remainder, &[8, 9]);
    }

    #[test]
    fn test_pcm_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN];
        let bytes = encode_pcm(&samples);
        assert_eq!(bytes.len(), samples.len() * 2);
        assert_eq!(decode_pcm(&bytes), samples);
    }

    #[test]
    fn test_decode_drops_odd_trailing_byte() {
        let bytes = vec![0x01, 0x00, 0xff];
        assert_eq!(decode_pcm(&bytes), vec![1]);
    }
}
