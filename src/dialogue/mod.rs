//! # Dialogue Module
//!
//! Everything around the multi-turn interview loop: the append-only
//! conversation history, the escalation policy that steers the model
//! toward a close, and the chat-completion client.
//!
//! ## Key Components:
//! - **Conversation / Turn**: per-connection history, append-only
//! - **Turn Policy**: history length → directive (normal / wrap-up /
//!   hard-stop)
//! - **DialogueAdapter**: capability trait the orchestrator calls
//! - **GrokClient**: xAI chat-completions implementation with
//!   identity-specific system prompts

pub mod conversation;
pub mod grok;
pub mod policy;

use crate::error::AppResult;
use async_trait::async_trait;
use conversation::ApiMessage;

/// Text-in, text-out dialogue capability.
///
/// The adapter owns its system prompt; callers pass the full history
/// (oldest first) and the escalation directive selected by the Turn
/// Policy. Failures carry the upstream detail verbatim so it can be
/// surfaced to the client as an error event.
#[async_trait]
pub trait DialogueAdapter: Send + Sync {
    async fn respond(&self, history: &[ApiMessage], directive: Directive) -> AppResult<String>;
}

pub use conversation::{Conversation, Role, Turn};
pub use grok::GrokClient;
pub use policy::Directive;
