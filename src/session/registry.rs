//! Tracks every live WebSocket session so that capacity limits and the
//! metrics endpoint see a single authoritative view. Sessions register
//! on connect and are removed on disconnect; nothing outlives its
//! registry entry.

use crate::error::{AppError, AppResult};
use crate::session::orchestrator::Session;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// All live sessions, keyed by connection id.
///
/// The map lock is held only for insert/lookup/remove; per-session work
/// happens behind each session's own async mutex, so slow adapter calls
/// on one connection never block registration of another.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    max_sessions: usize,
}

impl ConnectionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Insert a new session. Fails when the server is at capacity or
    /// the id is already registered.
    pub fn register(&self, id: Uuid, session: Arc<Mutex<Session>>) -> AppResult<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| AppError::Internal("Session registry lock poisoned".to_string()))?;

        if sessions.len() >= self.max_sessions {
            warn!(
                session_id = %id,
                active = sessions.len(),
                "Rejecting connection, session limit reached"
            );
            return Err(AppError::BadRequest(format!(
                "Maximum concurrent sessions ({}) reached",
                self.max_sessions
            )));
        }
        if sessions.contains_key(&id) {
            return Err(AppError::Internal(format!(
                "Session {} is already registered",
                id
            )));
        }

        sessions.insert(id, session);
        info!(session_id = %id, active = sessions.len(), "Session registered");
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().ok()?.get(id).cloned()
    }

    /// Remove a session on disconnect. Removing an unknown id is a
    /// no-op; disconnect paths can race.
    pub fn remove(&self, id: &Uuid) -> Option<Arc<Mutex<Session>>> {
        let mut sessions = self.sessions.write().ok()?;
        let removed = sessions.remove(id);
        if removed.is_some() {
            info!(session_id = %id, active = sessions.len(), "Session removed");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::conversation::ApiMessage;
    use crate::dialogue::policy::Directive;
    use crate::dialogue::DialogueAdapter;
    use crate::error::AppResult;
    use crate::session::events::ServerEvent;
    use crate::transcription::TranscriptionAdapter;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct NoopTranscriber;

    #[async_trait]
    impl TranscriptionAdapter for NoopTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> AppResult<Option<String>> {
            Ok(None)
        }
    }

    struct NoopDialogue;

    #[async_trait]
    impl DialogueAdapter for NoopDialogue {
        async fn respond(
            &self,
            _history: &[ApiMessage],
            _directive: Directive,
        ) -> AppResult<String> {
            Ok(String::new())
        }
    }

    fn make_session(id: Uuid) -> (Arc<Mutex<Session>>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(id, Arc::new(NoopTranscriber), Arc::new(NoopDialogue), tx);
        (Arc::new(Mutex::new(session)), rx)
    }

    #[test]
    fn test_register_and_remove() {
        let registry = ConnectionRegistry::new(10);
        let id = Uuid::new_v4();
        let (session, _rx) = make_session(id);

        registry.register(id, session).unwrap();
        assert_eq!(registry.active_count(), 1);
        assert!(registry.get(&id).is_some());

        assert!(registry.remove(&id).is_some());
        assert_eq!(registry.active_count(), 0);
        assert!(registry.get(&id).is_none());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_capacity_limit_rejects_new_sessions() {
        let registry = ConnectionRegistry::new(2);
        let mut receivers = Vec::new();
        for _ in 0..2 {
            let id = Uuid::new_v4();
            let (session, rx) = make_session(id);
            registry.register(id, session).unwrap();
            receivers.push(rx);
        }

        let id = Uuid::new_v4();
        let (session, _rx) = make_session(id);
        let err = registry.register(id, session).unwrap_err();
        assert!(err.to_string().contains("Maximum concurrent sessions"));
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ConnectionRegistry::new(10);
        let id = Uuid::new_v4();
        let (first, _rx1) = make_session(id);
        let (second, _rx2) = make_session(id);

        registry.register(id, first).unwrap();
        assert!(registry.register(id, second).is_err());
        assert_eq!(registry.active_count(), 1);
    }
}
