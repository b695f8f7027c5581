//! # Grok Chat-Completions Client
//!
//! Dialogue adapter backed by the xAI chat-completions API. Each client
//! is bound to one system prompt, resolved once at construction from an
//! optional user identity:
//!
//! - `prompts/systemPrompt.txt` is the interview preamble; the
//!   `[NAME_HERE]` placeholder is replaced with the resolved display
//!   name (empty for anonymous sessions).
//! - `prompts/<email-prefix>.txt`, when present, supplies per-user
//!   context appended after the preamble.
//!
//! The API key comes from `GROK_API_KEY`; a missing key is reported as
//! a dialogue failure on the first call rather than at startup.

use crate::config::DialogueConfig;
use crate::dialogue::conversation::ApiMessage;
use crate::dialogue::policy::Directive;
use crate::dialogue::DialogueAdapter;
use crate::error::{AppError, AppResult};
use crate::users;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SYSTEM_PROMPT_FILE: &str = "systemPrompt.txt";
const NAME_PLACEHOLDER: &str = "[NAME_HERE]";
pub const API_KEY_ENV: &str = "GROK_API_KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Chat-completions client bound to one resolved system prompt.
pub struct GrokClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl GrokClient {
    /// Build a client for the given identity.
    ///
    /// Identity resolution happens exactly once, here; the resulting
    /// prompt is fixed for the client's lifetime. An absent or unknown
    /// identity yields the default prompt.
    pub fn new(config: &DialogueConfig, email: Option<&str>) -> AppResult<Self> {
        let name = email.and_then(users::get_user_by_email).unwrap_or("");
        if let Some(email) = email {
            info!(email, name, "Resolved identity for dialogue client");
        }

        let prompt_dir = Path::new(&config.prompt_dir);
        let preamble = load_prompt_file(&prompt_dir.join(SYSTEM_PROMPT_FILE))
            .replace(NAME_PLACEHOLDER, name);

        // Per-user context file is keyed by the local part of the email
        let context = email
            .and_then(|e| e.split('@').next())
            .map(|prefix| load_prompt_file(&prompt_dir.join(format!("{}.txt", prefix))))
            .unwrap_or_default();

        let system_prompt = if context.is_empty() {
            preamble
        } else {
            format!("{}\n{}", preamble, context)
        };

        let api_key = std::env::var(API_KEY_ENV).ok();
        if api_key.is_none() {
            warn!("{} not set; dialogue calls will fail", API_KEY_ENV);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Dialogue(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            api_key,
            system_prompt,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

/// Read a prompt file, treating a missing or empty file as no prompt.
fn load_prompt_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim().to_string();
            if trimmed.is_empty() {
                warn!(path = %path.display(), "Prompt file is empty");
            }
            trimmed
        }
        Err(_) => {
            warn!(path = %path.display(), "Prompt file not found, using default");
            String::new()
        }
    }
}

#[async_trait]
impl DialogueAdapter for GrokClient {
    async fn respond(&self, history: &[ApiMessage], directive: Directive) -> AppResult<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::Dialogue(format!(
                "API key not configured. Please set the {} environment variable.",
                API_KEY_ENV
            ))
        })?;

        // System directive first, then the full history in order
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ApiMessage::new(
            "system",
            format!("{}{}", self.system_prompt, directive.prompt_suffix()),
        ));
        messages.extend_from_slice(history);

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            model = %self.model,
            history_len = history.len(),
            directive = ?directive,
            "Sending chat-completion request"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Dialogue(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "Dialogue API error: {}", body);
            return Err(AppError::Dialogue(format!(
                "Dialogue API returned {}: {}",
                status, body
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Dialogue(format!("Invalid JSON response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                AppError::Dialogue("Dialogue API response contained no content".to_string())
            })?;

        info!(chars = content.len(), "Dialogue response received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_client_builds_without_identity() {
        let config = AppConfig::default();
        let client = GrokClient::new(&config.dialogue, None).unwrap();
        // No prompt files on disk: default (empty) prompt
        assert!(client.system_prompt.is_empty());
    }

    #[test]
    fn test_identity_resolution_substitutes_name() {
        let dir = std::env::temp_dir().join(format!("prompts-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(SYSTEM_PROMPT_FILE),
            "You are interviewing [NAME_HERE].",
        )
        .unwrap();

        let mut config = AppConfig::default().dialogue;
        config.prompt_dir = dir.to_string_lossy().to_string();

        let client = GrokClient::new(&config, Some("engineering@example.com")).unwrap();
        assert_eq!(client.system_prompt, "You are interviewing David Rodriguez.");

        let anonymous = GrokClient::new(&config, None).unwrap();
        assert_eq!(anonymous.system_prompt, "You are interviewing .");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_per_user_context_is_appended() {
        let dir = std::env::temp_dir().join(format!("prompts-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SYSTEM_PROMPT_FILE), "Preamble.").unwrap();
        std::fs::write(dir.join("analyst.txt"), "Background notes.").unwrap();

        let mut config = AppConfig::default().dialogue;
        config.prompt_dir = dir.to_string_lossy().to_string();

        let client = GrokClient::new(&config, Some("analyst@example.com")).unwrap();
        assert_eq!(client.system_prompt, "Preamble.\nBackground notes.");

        std::fs::remove_dir_all(&dir).ok();
    }
}
