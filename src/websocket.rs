//! # WebSocket Audio Streaming Handler
//!
//! Clients connect to `/lexllm/ws/audio` and stream base64 PCM chunks
//! as JSON text frames. The actor runs the speech segmenter inline and
//! hands each completed utterance to the session pipeline
//! (transcription, then dialogue) on a spawned task, so the actor keeps
//! draining frames while an upstream call is in flight.
//!
//! ## Message Format:
//! - **Client → Server**: `{"type": "audio", "data": "<base64 PCM>"}`,
//!   `{"type": "reset"}`, `{"type": "identity", "email": ..., "name": ...}`
//! - **Server → Client**: `type`-tagged JSON events (`info`, `status`,
//!   `transcription`, `response`, `error`)
//!
//! The segmenter's VAD handle is not `Send`, so it lives here on the
//! actor and never crosses into spawned tasks; only the session core
//! does.

use crate::audio::{Aggressiveness, SpeechSegmenter, WebRtcClassifier};
use crate::dialogue::grok::GrokClient;
use crate::error::AppError;
use crate::session::{ConnectionRegistry, ServerEvent, Session};
use crate::state::AppState;
use crate::transcription::WhisperClient;
use crate::users;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client → server messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Base64-encoded 16-bit little-endian PCM chunk
    #[serde(rename = "audio")]
    Audio { data: String },

    /// Clear the conversation and the segmenter
    #[serde(rename = "reset")]
    Reset,

    /// Bind a user identity; rebuilds the dialogue adapter with the
    /// identity-specific system prompt
    #[serde(rename = "identity")]
    Identity {
        email: String,
        name: Option<String>,
    },
}

impl ClientMessage {
    /// Parses an inbound text frame. A frame that does not parse is a
    /// transport fault and ends the session.
    fn parse(text: &str) -> Result<ClientMessage, String> {
        serde_json::from_str(text).map_err(|err| format!("Invalid message: {}", err))
    }
}

/// Tasks spawned on behalf of one connection. Aborted as a group when
/// the connection stops, so no adapter call outlives its session.
struct ConnectionTasks(Vec<JoinHandle<()>>);

impl ConnectionTasks {
    fn new() -> Self {
        Self(Vec::new())
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.0.retain(|task| !task.is_finished());
        self.0.push(handle);
    }

    fn abort_all(&mut self) {
        for task in self.0.drain(..) {
            task.abort();
        }
    }
}

/// WebSocket actor for one audio session.
///
/// The actor owns the segmenter; the session core is shared with
/// pipeline tasks behind an async mutex, which also serializes turns so
/// responses come back in utterance order.
pub struct AudioWebSocket {
    session_id: Uuid,
    segmenter: SpeechSegmenter,
    session: Arc<Mutex<Session>>,
    /// Taken by `started()` and drained into the socket
    events: Option<mpsc::UnboundedReceiver<ServerEvent>>,
    registry: Arc<ConnectionRegistry>,
    app_state: web::Data<AppState>,
    /// Pipeline and session tasks, all aborted on disconnect
    tasks: ConnectionTasks,
    forwarder: Option<JoinHandle<()>>,
    last_heartbeat: Instant,
}

impl AudioWebSocket {
    fn handle_audio(&mut self, data: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let chunk = match BASE64.decode(data) {
            Ok(chunk) => chunk,
            Err(err) => {
                self.fail(ctx, &format!("Invalid base64 audio data: {}", err));
                return;
            }
        };

        let outcome = self.segmenter.process(&chunk);

        if outcome.speech_ended {
            if let Some(utterance) = outcome.utterance {
                if !utterance.is_empty() {
                    info!(
                        session_id = %self.session_id,
                        bytes = utterance.len(),
                        "Utterance complete, starting turn"
                    );
                    let session = self.session.clone();
                    self.tasks.track(tokio::spawn(async move {
                        session.lock().await.run_turn(utterance).await;
                    }));
                }
            }
        }
    }

    fn handle_reset(&mut self) {
        self.segmenter.reset();
        let session = self.session.clone();
        self.tasks.track(tokio::spawn(async move {
            session.lock().await.reset();
        }));
    }

    fn handle_identity(
        &mut self,
        email: String,
        name: Option<String>,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let config = self.app_state.get_config();
        // Prompt files are small; loading them here keeps identity
        // changes ordered with the frames around them
        let client = match GrokClient::new(&config.dialogue, Some(&email)) {
            Ok(client) => Arc::new(client),
            Err(err) => {
                self.send_error(ctx, &err.to_string());
                return;
            }
        };

        let display = name
            .or_else(|| users::get_user_by_email(&email).map(str::to_string))
            .unwrap_or(email);

        let session = self.session.clone();
        self.tasks.track(tokio::spawn(async move {
            session.lock().await.bind_identity(client, &display);
        }));
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        warn!(session_id = %self.session_id, error = %message, "WebSocket error");
        let event = ServerEvent::Error {
            message: message.to_string(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            ctx.text(json);
        }
    }

    /// Transport fault: report the error, then close the session.
    fn fail(&mut self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        self.send_error(ctx, message);
        ctx.stop();
    }
}

/// Event lifted out of the session channel for delivery to the client.
#[derive(Message)]
#[rtype(result = "()")]
struct ForwardEvent(ServerEvent);

impl Actor for AudioWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection started");

        // Drain session events into the actor mailbox
        if let Some(mut rx) = self.events.take() {
            let addr = ctx.address();
            self.forwarder = Some(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    addr.do_send(ForwardEvent(event));
                }
            }));
        }

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session_id, "Heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection stopped");

        self.tasks.abort_all();
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }

        self.registry.remove(&self.session_id);

        let session = self.session.clone();
        tokio::spawn(async move {
            session.lock().await.close();
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match ClientMessage::parse(&text) {
                Ok(ClientMessage::Audio { data }) => {
                    self.handle_audio(&data, ctx);
                }
                Ok(ClientMessage::Reset) => {
                    self.handle_reset();
                }
                Ok(ClientMessage::Identity { email, name }) => {
                    self.handle_identity(email, name, ctx);
                }
                Err(reason) => {
                    self.fail(ctx, &reason);
                }
            },
            Ok(ws::Message::Binary(_)) => {
                self.fail(ctx, "Binary frames are not supported; send base64 audio messages");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(session_id = %self.session_id, "WebSocket closed: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<ForwardEvent> for AudioWebSocket {
    type Result = ();

    fn handle(&mut self, msg: ForwardEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize event: {}", err),
        }
    }
}

/// WebSocket endpoint handler.
///
/// Builds the full per-connection stack (segmenter, transcription and
/// dialogue adapters, session core) before upgrading, so a connection
/// that cannot be served is refused with an HTTP error instead of
/// failing after the handshake.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let config = app_state.get_config();
    let frame_config = config.audio.to_frame_config();
    frame_config
        .validate()
        .map_err(AppError::ConfigError)?;

    let classifier = WebRtcClassifier::new(&frame_config, Aggressiveness(config.audio.aggressiveness))
        .map_err(AppError::Internal)?;
    let segmenter = SpeechSegmenter::new(
        &frame_config,
        config.audio.speech_end_threshold,
        Box::new(classifier),
    );

    let transcriber = Arc::new(WhisperClient::new(
        &config.transcription,
        config.audio.sample_rate,
    )?);
    // Default prompt until an identity message arrives
    let dialogue = Arc::new(GrokClient::new(&config.dialogue, None)?);

    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    let session = Arc::new(Mutex::new(Session::new(
        session_id,
        transcriber,
        dialogue,
        tx,
    )));

    let registry = app_state.registry.clone();
    registry.register(session_id, session.clone())?;

    let actor = AudioWebSocket {
        session_id,
        segmenter,
        session,
        events: Some(rx),
        registry: registry.clone(),
        app_state,
        tasks: ConnectionTasks::new(),
        forwarder: None,
        last_heartbeat: Instant::now(),
    };

    match ws::start(actor, &req, stream) {
        Ok(response) => Ok(response),
        Err(err) => {
            registry.remove(&session_id);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "audio", "data": "AAAA"}"#).unwrap();
        match msg {
            ClientMessage::Audio { data } => assert_eq!(data, "AAAA"),
            _ => panic!("Wrong message type"),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "reset"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Reset));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "identity", "email": "engineering@example.com"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Identity { email, name } => {
                assert_eq!(email, "engineering@example.com");
                assert_eq!(name, None);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_unknown_message_type_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "bogus"}"#).is_err());
    }

    #[test]
    fn test_malformed_frame_is_a_parse_error() {
        let err = ClientMessage::parse("not json at all").unwrap_err();
        assert!(err.starts_with("Invalid message:"));

        let err = ClientMessage::parse(r#"{"type": "audio"}"#).unwrap_err();
        assert!(err.starts_with("Invalid message:"));
    }

    #[tokio::test]
    async fn test_abort_all_cancels_every_tracked_task() {
        // Each task holds a sender for its whole lifetime; the receiver
        // closes only when the task's future is dropped.
        let (first_tx, mut first_rx) = mpsc::unbounded_channel::<()>();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel::<()>();

        let mut tasks = ConnectionTasks::new();
        tasks.track(tokio::spawn(async move {
            let _held = first_tx;
            std::future::pending::<()>().await
        }));
        tasks.track(tokio::spawn(async move {
            let _held = second_tx;
            std::future::pending::<()>().await
        }));

        tasks.abort_all();

        assert_eq!(first_rx.recv().await, None);
        assert_eq!(second_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_track_drops_finished_tasks() {
        let mut tasks = ConnectionTasks::new();

        let done = tokio::spawn(async {});
        while !done.is_finished() {
            tokio::task::yield_now().await;
        }
        tasks.track(done);

        tasks.track(tokio::spawn(async {
            std::future::pending::<()>().await
        }));
        assert_eq!(tasks.0.len(), 1);

        tasks.abort_all();
    }
}
