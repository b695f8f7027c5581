//! # Hysteresis Speech Segmenter
//!
//! The voice-activity state machine at the heart of the pipeline. Frames
//! flow in, classified speech/non-speech; complete utterances flow out.
//!
//! ## Algorithm:
//! The segmenter holds a ring buffer covering the trailing padding window
//! and runs in two modes:
//! - **idle**: frames accumulate in the ring buffer. When more than half
//!   of the window is classified as speech, the segmenter triggers and
//!   the whole window (the start of the utterance) moves into
//!   `voiced_frames`.
//! - **triggered**: every frame is appended to `voiced_frames`. When the
//!   unvoiced share of the window exceeds the end threshold, the
//!   accumulated frames are concatenated, the state resets to idle, and
//!   the utterance is returned.
//!
//! Entering and leaving speech use different thresholds (0.5 to enter,
//! 0.95 by default to leave) so noisy classifications don't flap the
//! state.
//!
//! ## Contract:
//! `process` consumes only bytes appended since the previous call and
//! reports at most one completed utterance per call, returning
//! immediately when one completes. Undersized trailing samples are
//! dropped, accepting up to one frame of loss at a chunk boundary.

use crate::audio::classifier::SpeechClassifier;
use crate::audio::frame::{self, FrameConfig};
use std::collections::VecDeque;
use tracing::debug;

/// Result of feeding one chunk of audio through the segmenter.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOutcome {
    /// True when an utterance boundary was detected in this chunk.
    pub speech_ended: bool,

    /// The completed utterance as 16-bit little-endian PCM bytes,
    /// present exactly when `speech_ended` is true.
    pub utterance: Option<Vec<u8>>,
}

impl SegmentOutcome {
    fn silent() -> Self {
        Self {
            speech_ended: false,
            utterance: None,
        }
    }
}

/// Hysteresis segmenter for one connection's audio stream.
///
/// Owned exclusively by the connection that feeds it; never shared.
/// Reused across utterances within the connection via `reset`.
pub struct SpeechSegmenter {
    classifier: Box<dyn SpeechClassifier>,

    /// Samples per complete frame.
    frame_size: usize,

    /// Ring buffer capacity in frames (the padding window).
    capacity: usize,

    /// Unvoiced share of the window that ends an utterance (strict >).
    end_threshold: f64,

    /// Whether we are inside an utterance.
    triggered: bool,

    /// Trailing window of (frame, classification) pairs.
    ring_buffer: VecDeque<(Vec<i16>, bool)>,

    /// Frames accumulated since the trigger, in arrival order.
    voiced_frames: Vec<Vec<i16>>,
}

impl SpeechSegmenter {
    pub fn new(
        config: &FrameConfig,
        end_threshold: f64,
        classifier: Box<dyn SpeechClassifier>,
    ) -> Self {
        let capacity = config.padding_frames();
        Self {
            classifier,
            frame_size: config.frame_size(),
            capacity,
            end_threshold,
            triggered: false,
            ring_buffer: VecDeque::with_capacity(capacity),
            voiced_frames: Vec::new(),
        }
    }

    /// Clear mode, ring buffer and accumulated frames.
    ///
    /// Idempotent; the segmenter object is reused for the next utterance.
    pub fn reset(&mut self) {
        self.triggered = false;
        self.voiced_frames.clear();
        self.ring_buffer.clear();
    }

    /// Rebuild the segmenter for new framing parameters.
    ///
    /// The ring buffer keeps as many trailing entries as fit in the new
    /// capacity; mode and accumulated frames are untouched.
    pub fn reconfigure(&mut self, config: &FrameConfig, classifier: Box<dyn SpeechClassifier>) {
        self.classifier = classifier;
        self.frame_size = config.frame_size();
        self.capacity = config.padding_frames();
        while self.ring_buffer.len() > self.capacity {
            self.ring_buffer.pop_front();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Feed newly received PCM bytes through the detector.
    ///
    /// Input must be bytes appended since the previous call; they are
    /// never re-fed. At most one completed utterance is reported per
    /// call: when an end-of-speech boundary fires, remaining frames in
    /// the chunk are left unprocessed and the function returns at once.
    pub fn process(&mut self, new_bytes: &[u8]) -> SegmentOutcome {
        let samples = frame::decode_pcm(new_bytes);
        let (frames, _remainder) = frame::split_frames(&samples, self.frame_size);

        for chunk in frames {
            // Classifier errors skip the frame, nothing else
            let is_speech = match self.classifier.classify(chunk) {
                Some(classification) => classification,
                None => continue,
            };

            if !self.triggered {
                self.push_ring(chunk.to_vec(), is_speech);

                let num_voiced = self
                    .ring_buffer
                    .iter()
                    .filter(|(_, speech)| *speech)
                    .count();

                // Strict >, denominator is the full capacity even while
                // the buffer is still filling
                if num_voiced as f64 > 0.5 * self.capacity as f64 {
                    debug!(num_voiced, capacity = self.capacity, "Speech started");
                    self.triggered = true;
                    for (buffered, _) in self.ring_buffer.drain(..) {
                        self.voiced_frames.push(buffered);
                    }
                }
            } else {
                self.voiced_frames.push(chunk.to_vec());
                self.push_ring(chunk.to_vec(), is_speech);

                let num_unvoiced = self
                    .ring_buffer
                    .iter()
                    .filter(|(_, speech)| !*speech)
                    .count();

                if num_unvoiced as f64 > self.end_threshold * self.capacity as f64 {
                    debug!(
                        frames = self.voiced_frames.len(),
                        "Speech ended, emitting utterance"
                    );
                    let mut samples = Vec::new();
                    for voiced in &self.voiced_frames {
                        samples.extend_from_slice(voiced);
                    }
                    let utterance = frame::encode_pcm(&samples);
                    self.reset();
                    // Remaining frames in this chunk are intentionally
                    // not processed; one utterance per call
                    return SegmentOutcome {
                        speech_ended: true,
                        utterance: Some(utterance),
                    };
                }
            }
        }

        SegmentOutcome::silent()
    }

    fn push_ring(&mut self, frame: Vec<i16>, is_speech: bool) {
        if self.ring_buffer.len() == self.capacity {
            self.ring_buffer.pop_front();
        }
        self.ring_buffer.push_back((frame, is_speech));
    }
}
