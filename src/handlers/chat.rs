//! Non-WebSocket chat endpoint, useful for testing the dialogue path
//! without streaming audio. Takes the full message history; the close
//! policy escalates on its length exactly as it does for a live voice
//! session.

use crate::dialogue::conversation::ApiMessage;
use crate::dialogue::grok::GrokClient;
use crate::dialogue::policy::Directive;
use crate::dialogue::DialogueAdapter;
use crate::error::AppError;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    pub messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub response: String,
}

pub async fn chat(
    state: web::Data<AppState>,
    body: web::Json<ConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();

    if !request.messages.iter().any(|m| m.role == "user") {
        return Err(AppError::BadRequest("No user message provided".to_string()));
    }

    let config = state.get_config();
    let client = GrokClient::new(&config.dialogue, None)?;

    let directive = Directive::for_history_len(request.messages.len());
    let response = client.respond(&request.messages, directive).await?;

    Ok(HttpResponse::Ok().json(ConversationResponse { response }))
}
