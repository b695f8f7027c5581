//! # Whisper Server Client
//!
//! Sends completed utterances to a whisper.cpp server instance for
//! transcription. The raw PCM utterance is wrapped in an in-memory WAV
//! container and posted as multipart form data to the server's
//! `/inference` endpoint together with the sampling parameters.

use crate::audio::frame;
use crate::config::TranscriptionConfig;
use crate::error::{AppError, AppResult};
use crate::transcription::TranscriptionAdapter;
use async_trait::async_trait;
use std::io::Cursor;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// How long we wait on the whisper-server before reporting failure.
/// The session core enforces no timeout of its own.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a whisper-server instance.
pub struct WhisperClient {
    client: reqwest::Client,
    transcribe_url: String,
    sample_rate: u32,
    temperature: f64,
    temperature_inc: f64,
    response_format: String,
}

/// The slice of the whisper-server response we care about.
#[derive(Debug, serde::Deserialize)]
struct InferenceResponse {
    text: Option<String>,
}

impl WhisperClient {
    pub fn new(config: &TranscriptionConfig, sample_rate: u32) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Transcription(format!("Failed to build HTTP client: {}", e)))?;

        let transcribe_url = format!("{}{}", config.server_url, config.endpoint);
        info!(url = %transcribe_url, "WhisperClient initialized");

        Ok(Self {
            client,
            transcribe_url,
            sample_rate,
            temperature: config.temperature,
            temperature_inc: config.temperature_inc,
            response_format: config.response_format.clone(),
        })
    }

    /// Wrap raw 16-bit mono PCM in a WAV container, in memory.
    fn to_wav(&self, audio: &[u8]) -> AppResult<Vec<u8>> {
        let samples = frame::decode_pcm(audio);
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, 1, self.sample_rate, 16);

        let mut cursor = Cursor::new(Vec::new());
        wav::write(header, &wav::BitDepth::Sixteen(samples), &mut cursor)
            .map_err(|e| AppError::Transcription(format!("Failed to encode WAV: {}", e)))?;

        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl TranscriptionAdapter for WhisperClient {
    async fn transcribe(&self, audio: &[u8]) -> AppResult<Option<String>> {
        if audio.is_empty() {
            debug!("Empty utterance, skipping transcription request");
            return Ok(None);
        }

        let wav_bytes = self.to_wav(audio)?;
        debug!(
            pcm_bytes = audio.len(),
            wav_bytes = wav_bytes.len(),
            "Sending utterance to whisper-server"
        );

        let file_part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| AppError::Transcription(format!("Invalid multipart payload: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("temperature", self.temperature.to_string())
            .text("temperature_inc", self.temperature_inc.to_string())
            .text("response_format", self.response_format.clone());

        let start = Instant::now();
        let response = self
            .client
            .post(&self.transcribe_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Transcription(format!("Request failed: {}", e)))?;

        let status = response.status();
        debug!(
            status = %status,
            duration_ms = start.elapsed().as_millis() as u64,
            "whisper-server request completed"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "whisper-server returned error: {}", body);
            return Err(AppError::Transcription(format!(
                "whisper-server returned {}: {}",
                status, body
            )));
        }

        let result: InferenceResponse = response
            .json()
            .await
            .map_err(|e| AppError::Transcription(format!("Invalid JSON response: {}", e)))?;

        // The server answers with text for silence too; whitespace-only
        // results count as "no speech found"
        let text = result
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if let Some(ref transcription) = text {
            info!(chars = transcription.len(), "Transcription received");
        } else {
            debug!("No speech found in utterance");
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_wav_wrapping_adds_header() {
        let config = AppConfig::default();
        let client = WhisperClient::new(&config.transcription, 16000).unwrap();

        let pcm = frame::encode_pcm(&vec![0i16; 480]);
        let wav_bytes = client.to_wav(&pcm).unwrap();

        // RIFF/WAVE magic plus the payload
        assert_eq!(&wav_bytes[0..4], b"RIFF");
        assert_eq!(&wav_bytes[8..12], b"WAVE");
        assert!(wav_bytes.len() > pcm.len());
    }

    #[test]
    fn test_url_is_joined_from_config() {
        let config = AppConfig::default();
        let client = WhisperClient::new(&config.transcription, 16000).unwrap();
        assert_eq!(client.transcribe_url, "http://localhost:8080/inference");
    }
}
