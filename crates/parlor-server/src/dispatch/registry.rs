//! Event type → handler table.
//!
//! Built once at startup, then owned immutably by the
//! [`SessionManager`](crate::websocket::SessionManager), so lookups need no
//! locking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use parlor_core::EventEnvelope;
use tracing::{debug, warn};

use super::errors::{DispatchError, HandlerError};
use crate::metrics::{EVENT_DISPATCH_DURATION_SECONDS, EVENT_ERRORS_TOTAL, EVENTS_DISPATCHED_TOTAL};
use crate::websocket::Session;

/// Trait implemented by every event handler.
///
/// Handlers run on the calling session's read pump and block it while they
/// run, so they must return promptly. They may enqueue envelopes on any
/// session they can reach.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one envelope received on `session`.
    async fn handle(&self, event: &EventEnvelope, session: &Arc<Session>)
    -> Result<(), HandlerError>;
}

/// Registry mapping envelope types to handlers.
pub struct EventRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` for `event_type`, replacing any previous one.
    pub fn register(&mut self, event_type: &str, handler: impl EventHandler + 'static) {
        if self.has_event(event_type) {
            warn!(event_type, "replacing registered handler");
        }
        let _ = self.handlers.insert(event_type.to_owned(), Arc::new(handler));
    }

    /// Route `event` to its handler.
    ///
    /// Handler errors are returned as-is, without retry.
    pub async fn dispatch(
        &self,
        event: &EventEnvelope,
        session: &Arc<Session>,
    ) -> Result<(), DispatchError> {
        let Some(handler) = self.handlers.get(&event.event_type) else {
            let err = DispatchError::UnsupportedEvent(event.event_type.clone());
            counter!(EVENT_ERRORS_TOTAL, "type" => "unsupported", "error_type" => err.kind())
                .increment(1);
            return Err(err);
        };

        let event_type = event.event_type.clone();
        counter!(EVENTS_DISPATCHED_TOTAL, "type" => event_type.clone()).increment(1);
        debug!(event_type, "dispatching event");

        let start = Instant::now();
        let result = handler.handle(event, session).await;
        let elapsed = start.elapsed();
        histogram!(EVENT_DISPATCH_DURATION_SECONDS, "type" => event_type.clone())
            .record(elapsed.as_secs_f64());

        if elapsed.as_millis() >= 500 {
            warn!(
                event_type,
                duration_secs = elapsed.as_secs_f64(),
                "slow event handler"
            );
        }

        result.map_err(|source| {
            counter!(EVENT_ERRORS_TOTAL, "type" => event_type.clone(), "error_type" => source.kind())
                .increment(1);
            DispatchError::Handler { event_type, source }
        })
    }

    /// List all registered event types (sorted).
    pub fn event_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether an event type is registered.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::test_support::detached_session;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use parlor_core::ConnectionId;
    use serde_json::{Value, json};

    // ── Test handler implementations ────────────────────────────────

    #[derive(Clone, Default)]
    struct RecordingHandler {
        seen: Arc<Mutex<Vec<(Value, ConnectionId)>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(
            &self,
            event: &EventEnvelope,
            session: &Arc<Session>,
        ) -> Result<(), HandlerError> {
            self.seen
                .lock()
                .push((event.payload.clone(), session.id().clone()));
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(
            &self,
            _event: &EventEnvelope,
            _session: &Arc<Session>,
        ) -> Result<(), HandlerError> {
            Err(HandlerError::Failed("boom".into()))
        }
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn dispatch_invokes_registered_handler_with_payload_and_session() {
        let recorder = RecordingHandler::default();
        let mut reg = EventRegistry::new();
        reg.register("send_message", recorder.clone());

        let (session, _rx) = detached_session();
        let event = EventEnvelope::new("send_message", json!({"message": "hi", "from": "alice"}));
        reg.dispatch(&event, &session).await.unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, json!({"message": "hi", "from": "alice"}));
        assert_eq!(&seen[0].1, session.id());
    }

    #[tokio::test]
    async fn unknown_type_is_unsupported_and_invokes_nothing() {
        let recorder = RecordingHandler::default();
        let mut reg = EventRegistry::new();
        reg.register("send_message", recorder.clone());

        let (session, _rx) = detached_session();
        let event = EventEnvelope::new("bogus", json!({}));
        let err = reg.dispatch(&event, &session).await.unwrap_err();
        assert_matches!(err, DispatchError::UnsupportedEvent(ref t) if t == "bogus");
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn handler_error_is_propagated() {
        let mut reg = EventRegistry::new();
        reg.register("explode", FailingHandler);

        let (session, _rx) = detached_session();
        let err = reg
            .dispatch(&EventEnvelope::new("explode", Value::Null), &session)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            DispatchError::Handler { ref event_type, source: HandlerError::Failed(_) }
                if event_type == "explode"
        );
    }

    #[test]
    fn event_types_sorted_and_lookup() {
        let mut reg = EventRegistry::default();
        reg.register("send_message", RecordingHandler::default());
        reg.register("change_room", RecordingHandler::default());
        assert_eq!(reg.event_types(), vec!["change_room", "send_message"]);
        assert!(reg.has_event("change_room"));
        assert!(!reg.has_event("bogus"));
    }

    #[test]
    fn register_replaces_existing() {
        let mut reg = EventRegistry::new();
        reg.register("x", RecordingHandler::default());
        reg.register("x", FailingHandler);
        assert_eq!(reg.event_types().len(), 1);
    }
}
