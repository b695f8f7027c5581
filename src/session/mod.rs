//! # Session Management
//!
//! Per-connection orchestration and the process-wide registry of live
//! sessions. The WebSocket layer owns audio segmentation; everything
//! after an utterance boundary (transcription, conversation history,
//! dialogue, outbound events) runs through [`orchestrator::Session`].

pub mod events;
pub mod orchestrator;
pub mod registry;

pub use events::ServerEvent;
pub use orchestrator::{Session, SessionState};
pub use registry::ConnectionRegistry;
