//! # Session Orchestrator
//!
//! Sequences the turn pipeline for one connection: completed utterance →
//! transcription → conversation append → policy escalation → dialogue →
//! response event. One orchestrator per connection; nothing here is
//! shared across sessions.
//!
//! ## State Machine:
//! `Connected → AwaitingSpeech ⇄ (Transcribing → AwaitingDialogue →
//! Responding) → Closed`. Adapter failures emit an `error` event and
//! drop the session back to `AwaitingSpeech`; only transport failure
//! reaches `Closed`.
//!
//! The segmenter itself lives with the WebSocket actor (its VAD handle
//! must stay on one thread); the orchestrator picks up where an
//! utterance boundary has already been detected.

use crate::dialogue::conversation::{Conversation, Role};
use crate::dialogue::policy::Directive;
use crate::dialogue::DialogueAdapter;
use crate::session::events::ServerEvent;
use crate::transcription::TranscriptionAdapter;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a session currently is in its turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connection accepted, welcome notice not yet sent
    Connected,
    /// Listening for the next utterance
    AwaitingSpeech,
    /// Utterance handed to the transcription adapter
    Transcribing,
    /// User turn appended, dialogue adapter invoked
    AwaitingDialogue,
    /// Assistant reply received, response event being emitted
    Responding,
    /// Terminal; resources released
    Closed,
}

/// Per-connection orchestrator: conversation, bound adapters, event
/// channel. Owned by the Connection Registry entry for the connection.
pub struct Session {
    id: Uuid,
    state: SessionState,
    conversation: Conversation,
    transcriber: Arc<dyn TranscriptionAdapter>,
    dialogue: Arc<dyn DialogueAdapter>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl Session {
    /// Create the session and emit the connection-established notice.
    pub fn new(
        id: Uuid,
        transcriber: Arc<dyn TranscriptionAdapter>,
        dialogue: Arc<dyn DialogueAdapter>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        let mut session = Self {
            id,
            state: SessionState::Connected,
            conversation: Conversation::new(),
            transcriber,
            dialogue,
            events,
        };

        info!(session_id = %id, "Session created");
        session.emit(ServerEvent::Info {
            message: "Connection established. Start speaking.".to_string(),
        });
        session.state = SessionState::AwaitingSpeech;
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Rebind the dialogue adapter after an identity message and
    /// confirm it to the client.
    ///
    /// The conversation so far is kept; only future dialogue calls use
    /// the new identity-specific prompt.
    pub fn bind_identity(&mut self, dialogue: Arc<dyn DialogueAdapter>, display_name: &str) {
        self.dialogue = dialogue;
        info!(session_id = %self.id, display = %display_name, "Identity bound");
        self.emit(ServerEvent::Info {
            message: format!("Personalized settings loaded for {}", display_name),
        });
    }

    /// Run one full turn for a completed utterance.
    ///
    /// Every failure is converted into an outward event here; the call
    /// itself never fails and the session always ends up back in
    /// `AwaitingSpeech` (unless it was already closed).
    pub async fn run_turn(&mut self, utterance: Vec<u8>) {
        if self.state == SessionState::Closed {
            warn!(session_id = %self.id, "Ignoring utterance for closed session");
            return;
        }

        self.state = SessionState::Transcribing;
        self.emit(ServerEvent::Status {
            message: "Processing audio...".to_string(),
        });

        let text = match self.transcriber.transcribe(&utterance).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                // No speech found: no turn, no error, keep listening
                debug!(session_id = %self.id, "Transcription empty, resuming listening");
                self.state = SessionState::AwaitingSpeech;
                return;
            }
            Err(err) => {
                self.emit(ServerEvent::Error {
                    message: err.to_string(),
                });
                self.state = SessionState::AwaitingSpeech;
                return;
            }
        };

        self.emit(ServerEvent::Transcription { text: text.clone() });
        self.conversation.add_turn(Role::User, text);

        self.state = SessionState::AwaitingDialogue;
        self.emit(ServerEvent::Status {
            message: "Getting response from AI...".to_string(),
        });

        let directive = Directive::for_history_len(self.conversation.len());
        let history = self.conversation.to_api_messages();

        match self.dialogue.respond(&history, directive).await {
            Ok(reply) => {
                self.state = SessionState::Responding;
                self.conversation.add_turn(Role::Assistant, reply.clone());
                self.emit(ServerEvent::Response { text: reply });
            }
            Err(err) => {
                // The user turn stays; nothing is rolled back
                self.emit(ServerEvent::Error {
                    message: err.to_string(),
                });
            }
        }

        self.state = SessionState::AwaitingSpeech;
    }

    /// Out-of-band reset: clear the conversation and return to
    /// listening, whatever state we were in.
    pub fn reset(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!(session_id = %self.id, "Conversation reset");
        self.conversation.clear();
        self.state = SessionState::AwaitingSpeech;
        self.emit(ServerEvent::Info {
            message: "Conversation reset.".to_string(),
        });
    }

    /// Terminal transition; the registry entry is removed by the caller.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            info!(session_id = %self.id, turns = self.conversation.len(), "Session closed");
            self.state = SessionState::Closed;
        }
    }

    fn emit(&self, event: ServerEvent) {
        // A send failure means the client is already gone; the session
        // will be closed by the disconnect path
        if self.events.send(event).is_err() {
            debug!(session_id = %self.id, "Event dropped, receiver gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::conversation::ApiMessage;
    use crate::error::{AppError, AppResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transcriber that replays scripted outcomes.
    struct MockTranscriber {
        results: Mutex<Vec<AppResult<Option<String>>>>,
    }

    impl MockTranscriber {
        fn with(results: Vec<AppResult<Option<String>>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
            })
        }
    }

    #[async_trait]
    impl TranscriptionAdapter for MockTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> AppResult<Option<String>> {
            self.results
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(Some("fallback".to_string())))
        }
    }

    /// Dialogue adapter that echoes, fails, or records directives.
    struct MockDialogue {
        fail_with: Option<String>,
        seen_directives: Mutex<Vec<Directive>>,
        seen_history_len: Mutex<Vec<usize>>,
    }

    impl MockDialogue {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail_with: None,
                seen_directives: Mutex::new(Vec::new()),
                seen_history_len: Mutex::new(Vec::new()),
            })
        }

        fn failing(detail: &str) -> Arc<Self> {
            Arc::new(Self {
                fail_with: Some(detail.to_string()),
                seen_directives: Mutex::new(Vec::new()),
                seen_history_len: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DialogueAdapter for MockDialogue {
        async fn respond(
            &self,
            history: &[ApiMessage],
            directive: Directive,
        ) -> AppResult<String> {
            self.seen_directives.lock().unwrap().push(directive);
            self.seen_history_len.lock().unwrap().push(history.len());
            match &self.fail_with {
                Some(detail) => Err(AppError::Dialogue(detail.clone())),
                None => Ok("assistant reply".to_string()),
            }
        }
    }

    fn new_session(
        transcriber: Arc<dyn TranscriptionAdapter>,
        dialogue: Arc<dyn DialogueAdapter>,
    ) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(Uuid::new_v4(), transcriber, dialogue, tx);
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_successful_turn_appends_user_and_assistant() {
        let transcriber = MockTranscriber::with(vec![Ok(Some("hello there".to_string()))]);
        let (mut session, mut rx) = new_session(transcriber, MockDialogue::ok());
        drain(&mut rx); // connection notice

        session.run_turn(vec![0u8; 960]).await;

        assert_eq!(session.state(), SessionState::AwaitingSpeech);
        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "hello there");
        assert_eq!(turns[1].role, Role::Assistant);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ServerEvent::Status {
                    message: "Processing audio...".to_string()
                },
                ServerEvent::Transcription {
                    text: "hello there".to_string()
                },
                ServerEvent::Status {
                    message: "Getting response from AI...".to_string()
                },
                ServerEvent::Response {
                    text: "assistant reply".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_history_grows_two_turns_per_cycle() {
        let transcriber = MockTranscriber::with(
            (0..4).map(|i| Ok(Some(format!("utterance {}", i)))).collect(),
        );
        let (mut session, mut rx) = new_session(transcriber, MockDialogue::ok());

        for _ in 0..4 {
            session.run_turn(vec![0u8; 960]).await;
        }
        drain(&mut rx);

        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 8);
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
        // Chronological order is preserved
        for window in turns.windows(2) {
            assert!(window[0].timestamp <= window[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_empty_transcription_appends_nothing() {
        let transcriber = MockTranscriber::with(vec![Ok(None)]);
        let (mut session, mut rx) = new_session(transcriber, MockDialogue::ok());
        drain(&mut rx);

        session.run_turn(vec![0u8; 960]).await;

        assert_eq!(session.state(), SessionState::AwaitingSpeech);
        assert!(session.conversation().is_empty());

        // Only the processing status, no transcription, no error
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![ServerEvent::Status {
                message: "Processing audio...".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_transcription_failure_emits_error() {
        let transcriber = MockTranscriber::with(vec![Err(AppError::Transcription(
            "server unreachable".to_string(),
        ))]);
        let (mut session, mut rx) = new_session(transcriber, MockDialogue::ok());
        drain(&mut rx);

        session.run_turn(vec![0u8; 960]).await;

        assert_eq!(session.state(), SessionState::AwaitingSpeech);
        assert!(session.conversation().is_empty());
        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(ServerEvent::Error { message }) if message.contains("server unreachable")
        ));
    }

    #[tokio::test]
    async fn test_dialogue_failure_keeps_user_turn() {
        let transcriber = MockTranscriber::with(vec![Ok(Some("hello".to_string()))]);
        let dialogue = MockDialogue::failing("401 Unauthorized: invalid api key");
        let (mut session, mut rx) = new_session(transcriber, dialogue);
        drain(&mut rx);

        session.run_turn(vec![0u8; 960]).await;

        // The user turn is not rolled back
        assert_eq!(session.state(), SessionState::AwaitingSpeech);
        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(ServerEvent::Error { message }) if message.contains("invalid api key")
        ));
    }

    #[tokio::test]
    async fn test_directive_escalates_with_history_length() {
        let transcriber = MockTranscriber::with(
            (0..5).map(|i| Ok(Some(format!("utterance {}", i)))).collect(),
        );
        let dialogue = MockDialogue::ok();
        let (mut session, _rx) = new_session(transcriber, dialogue.clone());

        for _ in 0..5 {
            session.run_turn(vec![0u8; 960]).await;
        }

        // History length at call time: 1, 3, 5, 7, 9
        let directives = dialogue.seen_directives.lock().unwrap().clone();
        assert_eq!(
            directives,
            vec![
                Directive::Normal,
                Directive::Normal,
                Directive::WrapUp,
                Directive::HardStop,
                Directive::HardStop,
            ]
        );
        let lens = dialogue.seen_history_len.lock().unwrap().clone();
        assert_eq!(lens, vec![1, 3, 5, 7, 9]);
    }

    #[tokio::test]
    async fn test_reset_clears_conversation_and_notifies() {
        let transcriber = MockTranscriber::with(vec![Ok(Some("hello".to_string()))]);
        let (mut session, mut rx) = new_session(transcriber, MockDialogue::ok());

        session.run_turn(vec![0u8; 960]).await;
        assert!(!session.conversation().is_empty());

        session.reset();
        assert!(session.conversation().is_empty());
        assert_eq!(session.state(), SessionState::AwaitingSpeech);

        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(ServerEvent::Info { message }) if message == "Conversation reset."
        ));
    }

    #[tokio::test]
    async fn test_bind_identity_keeps_history() {
        let transcriber = MockTranscriber::with(vec![
            Ok(Some("second".to_string())),
            Ok(Some("first".to_string())),
        ]);
        let replacement = MockDialogue::ok();
        let (mut session, mut rx) = new_session(transcriber, MockDialogue::ok());

        session.run_turn(vec![0u8; 960]).await;
        session.bind_identity(replacement.clone(), "Jordan Smith");
        session.run_turn(vec![0u8; 960]).await;

        // Replacement adapter saw the full history, not a fresh one
        assert_eq!(*replacement.seen_history_len.lock().unwrap(), vec![3]);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Info { message } if message == "Personalized settings loaded for Jordan Smith"
        )));
    }

    #[tokio::test]
    async fn test_closed_session_ignores_input() {
        let transcriber = MockTranscriber::with(vec![Ok(Some("hello".to_string()))]);
        let (mut session, mut rx) = new_session(transcriber, MockDialogue::ok());
        drain(&mut rx);

        session.close();
        session.run_turn(vec![0u8; 960]).await;

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.conversation().is_empty());
        assert!(drain(&mut rx).is_empty());
    }
}
