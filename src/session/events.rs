//! # Outward Session Events
//!
//! Everything a session says to its client, as `type`-tagged JSON
//! messages. The orchestrator pushes these into a channel; the
//! WebSocket actor forwards them as text frames.

use serde::{Deserialize, Serialize};

/// Server → client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Lifecycle notices (connection established, reset confirmed, ...)
    #[serde(rename = "info")]
    Info { message: String },

    /// Progress while a turn is being processed
    #[serde(rename = "status")]
    Status { message: String },

    /// Transcribed user utterance
    #[serde(rename = "transcription")]
    Transcription { text: String },

    /// Assistant reply
    #[serde(rename = "response")]
    Response { text: String },

    /// Session-local failure; the session keeps listening
    #[serde(rename = "error")]
    Error { message: String },
}
