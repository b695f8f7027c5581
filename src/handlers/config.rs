//! Runtime configuration endpoints. GET returns the live config, PUT
//! applies a partial JSON update after validation. Server host/port
//! changes only take effect on restart; audio changes apply to the next
//! WebSocket connection, not already-open ones.

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_json(config: &crate::config::AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "audio": {
            "sample_rate": config.audio.sample_rate,
            "frame_duration_ms": config.audio.frame_duration_ms,
            "padding_duration_ms": config.audio.padding_duration_ms,
            "speech_end_threshold": config.audio.speech_end_threshold,
            "aggressiveness": config.audio.aggressiveness
        },
        "transcription": {
            "server_url": config.transcription.server_url,
            "endpoint": config.transcription.endpoint,
            "temperature": config.transcription.temperature,
            "temperature_inc": config.transcription.temperature_inc,
            "response_format": config.transcription.response_format
        },
        "dialogue": {
            "api_url": config.dialogue.api_url,
            "model": config.dialogue.model,
            "max_tokens": config.dialogue.max_tokens,
            "temperature": config.dialogue.temperature
        },
        "performance": {
            "max_concurrent_sessions": config.performance.max_concurrent_sessions
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_json(&config)
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_json(&current_config)
    })))
}
