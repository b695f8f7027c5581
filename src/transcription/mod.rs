//! # Transcription Module
//!
//! Speech-to-text as an external capability. The session orchestrator
//! only sees the `TranscriptionAdapter` trait; the production
//! implementation talks to a whisper.cpp server over HTTP.

pub mod whisper;

use crate::error::AppResult;
use async_trait::async_trait;

/// Speech-to-text capability.
///
/// `Ok(None)` means the service succeeded but found no speech in the
/// utterance; callers append no turn and keep listening. `Err` is an
/// explicit adapter failure and surfaces as an error event.
#[async_trait]
pub trait TranscriptionAdapter: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> AppResult<Option<String>>;
}

pub use whisper::WhisperClient;
