//! In-memory transports and sessions for unit tests.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use axum::extract::ws::Message;
use futures::Sink;
use futures::channel::mpsc as fmpsc;
use parlor_core::{ConnectionId, EventEnvelope};
use tokio::sync::mpsc;

use super::{Session, SessionManager};
use crate::config::SessionConfig;
use crate::dispatch::{EventRegistry, handlers};
use crate::otp::RetentionMap;

/// A manager with the chat handlers and a private task tracker.
pub(crate) fn manager_with(config: SessionConfig) -> Arc<SessionManager> {
    let mut events = EventRegistry::new();
    handlers::register_all(&mut events);
    let otps = Arc::new(RetentionMap::new(std::time::Duration::from_secs(5)));
    Arc::new(SessionManager::new(
        config,
        events,
        otps,
        tokio_util::task::TaskTracker::new(),
    ))
}

/// A session with no manager and a roomy outbound queue.
pub(crate) fn detached_session() -> (Arc<Session>, mpsc::Receiver<EventEnvelope>) {
    let (tx, rx) = mpsc::channel(32);
    let session = Session::new(ConnectionId::new(), tx, Weak::new(), 0);
    (Arc::new(session), rx)
}

/// Server half of an in-memory WebSocket: what the pumps get.
pub(crate) struct ServerSide {
    pub sink: fmpsc::UnboundedSender<Message>,
    pub stream: fmpsc::UnboundedReceiver<Result<Message, std::io::Error>>,
}

/// Client half of an in-memory WebSocket: what the test drives.
pub(crate) struct ClientSide {
    pub outgoing: fmpsc::UnboundedSender<Result<Message, std::io::Error>>,
    pub incoming: fmpsc::UnboundedReceiver<Message>,
}

impl ClientSide {
    /// Send one text frame to the server.
    pub fn send_text(&self, text: &str) {
        let _ = self
            .outgoing
            .unbounded_send(Ok(Message::Text(text.to_owned().into())));
    }

    /// Send one envelope as a text frame.
    pub fn send_envelope(&self, envelope: &EventEnvelope) {
        self.send_text(&envelope.to_frame().unwrap());
    }

    /// Next envelope the server wrote, skipping control frames.
    pub async fn next_envelope(&mut self) -> Option<EventEnvelope> {
        use futures::StreamExt;
        while let Some(msg) = self.incoming.next().await {
            if let Message::Text(text) = msg {
                return Some(EventEnvelope::parse(text.as_str()).unwrap());
            }
        }
        None
    }
}

/// A connected pair of in-memory transport halves.
pub(crate) fn transport() -> (ServerSide, ClientSide) {
    let (to_client, incoming) = fmpsc::unbounded();
    let (outgoing, from_client) = fmpsc::unbounded();
    (
        ServerSide {
            sink: to_client,
            stream: from_client,
        },
        ClientSide { outgoing, incoming },
    )
}

/// Reserve a slot and attach the server half, skipping credential checks.
pub(crate) async fn connect(manager: &Arc<SessionManager>, server: ServerSide) -> Arc<Session> {
    let ticket = manager.reserve().await.unwrap();
    manager.attach(ticket, server.sink, server.stream).await
}

/// A sink whose peer never drains: every operation stays pending.
pub(crate) struct StalledSink;

impl Sink<Message> for StalledSink {
    type Error = std::io::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Pending
    }
}
