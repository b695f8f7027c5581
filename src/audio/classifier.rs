//! # Frame Speech Classification
//!
//! Wraps the per-frame speech/non-speech decision behind a small trait so
//! the segmenter never knows which detector is underneath. The production
//! implementation delegates to the WebRTC VAD; tests swap in scripted
//! classifiers.

use crate::audio::frame::FrameConfig;
use tracing::debug;
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Per-frame speech classifier.
///
/// `classify` receives exactly one complete frame of mono 16-bit PCM at
/// the configured sample rate. Returning `None` means the classifier
/// could not judge the frame (malformed input); the caller skips such
/// frames rather than propagating the failure.
pub trait SpeechClassifier {
    fn classify(&mut self, frame: &[i16]) -> Option<bool>;
}

/// WebRTC VAD aggressiveness (0 = most permissive, 3 = most aggressive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggressiveness(pub u8);

impl Default for Aggressiveness {
    fn default() -> Self {
        Aggressiveness(3)
    }
}

/// Speech classifier backed by the WebRTC VAD.
///
/// The underlying `Vad` handle wraps a raw C pointer and is not `Send`,
/// so each connection owns its own classifier on the thread that feeds
/// it frames.
pub struct WebRtcClassifier {
    vad: Vad,
    frame_size: usize,
}

impl WebRtcClassifier {
    /// Create a classifier for the given framing parameters.
    ///
    /// Fails if the sample rate is one the WebRTC VAD does not support
    /// or the aggressiveness mode is out of range.
    pub fn new(config: &FrameConfig, aggressiveness: Aggressiveness) -> Result<Self, String> {
        config.validate()?;

        let sample_rate = match config.sample_rate {
            8000 => SampleRate::Rate8kHz,
            16000 => SampleRate::Rate16kHz,
            32000 => SampleRate::Rate32kHz,
            48000 => SampleRate::Rate48kHz,
            other => return Err(format!("Unsupported sample rate: {}", other)),
        };

        let mode = match aggressiveness.0 {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => return Err(format!("VAD aggressiveness must be 0-3, got {}", other)),
        };

        let mut vad = Vad::new();
        vad.set_sample_rate(sample_rate);
        vad.set_mode(mode);

        Ok(Self {
            vad,
            frame_size: config.frame_size(),
        })
    }
}

impl SpeechClassifier for WebRtcClassifier {
    fn classify(&mut self, frame: &[i16]) -> Option<bool> {
        if frame.len() != self.frame_size {
            debug!(
                expected = self.frame_size,
                got = frame.len(),
                "Skipping frame with unexpected size"
            );
            return None;
        }

        match self.vad.is_voice_segment(frame) {
            Ok(is_speech) => Some(is_speech),
            Err(_) => {
                debug!("VAD rejected frame, skipping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_initialization() {
        let config = FrameConfig::default();
        assert!(WebRtcClassifier::new(&config, Aggressiveness::default()).is_ok());
    }

    #[test]
    fn test_invalid_aggressiveness_rejected() {
        let config = FrameConfig::default();
        assert!(WebRtcClassifier::new(&config, Aggressiveness(4)).is_err());
    }

    #[test]
    fn test_silence_is_not_speech() {
        let config = FrameConfig::default();
        let mut classifier = WebRtcClassifier::new(&config, Aggressiveness::default()).unwrap();
        let silence = vec![0i16; config.frame_size()];
        assert_eq!(classifier.classify(&silence), Some(false));
    }

    #[test]
    fn test_undersized_frame_skipped() {
        let config = FrameConfig::default();
        let mut classifier = WebRtcClassifier::new(&config, Aggressiveness::default()).unwrap();
        let short = vec![0i16; 100];
        assert_eq!(classifier.classify(&short), None);
    }
}
