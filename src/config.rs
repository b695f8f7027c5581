//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_AUDIO_SAMPLERATE, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The dialogue API key is deliberately *not* part of this struct; it is
//! read from `GROK_API_KEY` when the dialogue client is constructed so
//! it never ends up serialized into config responses.

use crate::audio::frame::FrameConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub dialogue: DialogueConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Segmentation parameters for inbound audio.
///
/// ## Fields:
/// - `sample_rate`: PCM rate of inbound chunks (8000/16000/32000/48000)
/// - `frame_duration_ms`: classifier frame length (10/20/30)
/// - `padding_duration_ms`: trailing window for speech start/end decisions
/// - `speech_end_threshold`: unvoiced share of the window that ends an
///   utterance; strict comparison, default 0.95
/// - `aggressiveness`: WebRTC VAD mode, 0 (permissive) to 3 (aggressive)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_duration_ms: u32,
    pub padding_duration_ms: u32,
    pub speech_end_threshold: f64,
    pub aggressiveness: u8,
}

impl AudioConfig {
    pub fn to_frame_config(&self) -> FrameConfig {
        FrameConfig {
            sample_rate: self.sample_rate,
            frame_duration_ms: self.frame_duration_ms,
            padding_duration_ms: self.padding_duration_ms,
        }
    }
}

/// Where and how to reach the whisper-server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub server_url: String,
    pub endpoint: String,
    /// Initial sampling temperature for decoding.
    pub temperature: f64,
    /// Temperature increment applied when a decoding pass is judged
    /// low-confidence.
    pub temperature_inc: f64,
    pub response_format: String,
}

/// Chat-completion service parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    pub api_url: String,
    pub model: String,
    /// Directory holding systemPrompt.txt and per-user context files.
    pub prompt_dir: String,
    /// Response length cap; kept short for voice interaction.
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            audio: AudioConfig {
                sample_rate: 16000,
                frame_duration_ms: 30,
                padding_duration_ms: 300,
                speech_end_threshold: 0.95,
                aggressiveness: 3,
            },
            transcription: TranscriptionConfig {
                server_url: "http://localhost:8080".to_string(),
                endpoint: "/inference".to_string(),
                temperature: 0.0,
                temperature_inc: 0.2,
                response_format: "json".to_string(),
            },
            dialogue: DialogueConfig {
                api_url: "https://api.x.ai/v1/chat/completions".to_string(),
                model: "grok-2-latest".to_string(),
                prompt_dir: "prompts/".to_string(),
                max_tokens: 150,
                temperature: 0.7,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and APP_* env vars.
    ///
    /// `HOST` and `PORT` without the prefix are honored as overrides
    /// for deployment platforms that set them.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        self.audio
            .to_frame_config()
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;

        if !(0.0..=1.0).contains(&self.audio.speech_end_threshold) {
            return Err(anyhow::anyhow!(
                "Speech end threshold must be between 0.0 and 1.0"
            ));
        }

        if self.audio.aggressiveness > 3 {
            return Err(anyhow::anyhow!("VAD aggressiveness must be 0-3"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!(
                "Max concurrent sessions must be greater than 0"
            ));
        }

        if self.dialogue.max_tokens == 0 {
            return Err(anyhow::anyhow!("Dialogue max_tokens must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (runtime config updates).
    ///
    /// Only the fields present in the JSON are touched; the result is
    /// re-validated before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = audio.get("sample_rate").and_then(|v| v.as_u64()) {
                self.audio.sample_rate = rate as u32;
            }
            if let Some(frame) = audio.get("frame_duration_ms").and_then(|v| v.as_u64()) {
                self.audio.frame_duration_ms = frame as u32;
            }
            if let Some(padding) = audio.get("padding_duration_ms").and_then(|v| v.as_u64()) {
                self.audio.padding_duration_ms = padding as u32;
            }
            if let Some(threshold) = audio.get("speech_end_threshold").and_then(|v| v.as_f64()) {
                self.audio.speech_end_threshold = threshold;
            }
            if let Some(mode) = audio.get("aggressiveness").and_then(|v| v.as_u64()) {
                self.audio.aggressiveness = mode as u8;
            }
        }

        if let Some(transcription) = partial_config.get("transcription") {
            if let Some(url) = transcription.get("server_url").and_then(|v| v.as_str()) {
                self.transcription.server_url = url.to_string();
            }
            if let Some(endpoint) = transcription.get("endpoint").and_then(|v| v.as_str()) {
                self.transcription.endpoint = endpoint.to_string();
            }
        }

        if let Some(dialogue) = partial_config.get("dialogue") {
            if let Some(url) = dialogue.get("api_url").and_then(|v| v.as_str()) {
                self.dialogue.api_url = url.to_string();
            }
            if let Some(model) = dialogue.get("model").and_then(|v| v.as_str()) {
                self.dialogue.model = model.to_string();
            }
            if let Some(max_tokens) = dialogue.get("max_tokens").and_then(|v| v.as_u64()) {
                self.dialogue.max_tokens = max_tokens as u32;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}
