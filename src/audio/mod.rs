//! # Audio Processing Module
//!
//! Turns the raw PCM byte stream from a WebSocket connection into
//! discrete utterances for transcription.
//!
//! ## Key Components:
//! - **Frame slicing**: fixed-duration frames cut from the byte stream
//! - **Speech classifier**: per-frame speech/non-speech decision
//!   (WebRTC VAD behind a trait)
//! - **Hysteresis segmenter**: the two-mode state machine that detects
//!   utterance boundaries
//!
//! The segmenter and classifier are per-connection and live on the
//! connection's own thread; nothing here is shared across sessions.

pub mod classifier; // SpeechClassifier trait + WebRTC VAD implementation
pub mod frame; // PCM decoding and frame slicing
pub mod segmenter; // Utterance boundary detection

pub use classifier::{Aggressiveness, SpeechClassifier, WebRtcClassifier};
pub use frame::FrameConfig;
pub use segmenter::{SegmentOutcome, SpeechSegmenter};
