//! The two per-session pumps.
//!
//! The read pump turns inbound frames into envelopes and dispatches them.
//! The write pump drains the outbound queue, pings quiet peers and performs
//! the close handshake. Either pump exiting deregisters the session; the
//! manager makes that idempotent. Both are generic over the transport halves
//! so they can run against an in-memory pair in tests.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parlor_core::EventEnvelope;
use parlor_settings::HandlerFailurePolicy;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::CloseReason;
use super::connection::Session;
use super::heartbeat::{HeartbeatAction, HeartbeatConfig};
use crate::dispatch::DispatchError;

/// Read frames until the transport ends or the session closes.
#[instrument(skip_all, fields(connection_id = %session.id()))]
pub async fn read_pump<R, E>(session: Arc<Session>, mut stream: R, policy: HandlerFailurePolicy)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            () = session.closed() => break,
            frame = stream.next() => frame,
        };

        let message = match frame {
            None => {
                let _ = session.close(CloseReason::ClientClosed);
                break;
            }
            Some(Err(err)) => {
                warn!(error = %err, "websocket read failed");
                let _ = session.close(CloseReason::TransportError);
                break;
            }
            Some(Ok(message)) => message,
        };

        session.liveness().mark_alive();

        let parsed = match message {
            Message::Text(text) => EventEnvelope::parse(text.as_str()),
            Message::Binary(data) => EventEnvelope::parse_bytes(&data),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(frame) => {
                debug!(code = frame.as_ref().map(|f| f.code), "peer sent close frame");
                let _ = session.close(CloseReason::ClientClosed);
                break;
            }
        };

        let envelope = match parsed {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                continue;
            }
        };

        let Some(manager) = session.manager() else {
            let _ = session.close(CloseReason::Deregistered);
            break;
        };

        match manager.dispatch(&envelope, &session).await {
            Ok(()) => {}
            Err(err @ DispatchError::UnsupportedEvent(_)) => {
                warn!(error = %err, "ignoring event");
            }
            Err(err) => {
                warn!(
                    event_type = %envelope.event_type,
                    error_kind = err.kind(),
                    error = %err,
                    "event handler failed"
                );
                if policy == HandlerFailurePolicy::Disconnect {
                    let _ = session.close(CloseReason::HandlerFailure);
                    break;
                }
            }
        }
    }

    release(&session).await;
}

/// Write queued envelopes and heartbeat pings until the session closes.
///
/// Every write is bounded by the heartbeat interval; a peer that stops
/// draining its socket is treated as a broken transport.
#[instrument(skip_all, fields(connection_id = %session.id()))]
pub async fn write_pump<S>(
    session: Arc<Session>,
    mut sink: S,
    mut outbound: mpsc::Receiver<EventEnvelope>,
    heartbeat: HeartbeatConfig,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = session.closed() => break,
            _ = ticker.tick() => {
                match session.liveness().on_tick(&heartbeat) {
                    HeartbeatAction::TimedOut => {
                        warn!(idle_ms = u64::try_from(session.liveness().idle_for().as_millis()).unwrap_or(u64::MAX), "heartbeat timed out");
                        let _ = session.close(CloseReason::HeartbeatTimeout);
                        break;
                    }
                    HeartbeatAction::Ping => {
                        if let Err(err) = write_frame(&mut sink, Message::Ping(Bytes::new()), heartbeat.interval).await {
                            warn!(error = %err, "ping failed");
                            let _ = session.close(CloseReason::TransportError);
                            break;
                        }
                    }
                    HeartbeatAction::Idle => {}
                }
            }
            next = outbound.recv() => {
                let Some(envelope) = next else {
                    let _ = session.close(CloseReason::Deregistered);
                    break;
                };
                let frame = match envelope.to_frame() {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(event_type = %envelope.event_type, error = %err, "dropping unencodable envelope");
                        continue;
                    }
                };
                if let Err(err) = write_frame(&mut sink, Message::Text(frame.into()), heartbeat.interval).await {
                    warn!(error = %err, "websocket write failed");
                    let _ = session.close(CloseReason::TransportError);
                    break;
                }
            }
        }
    }

    if let Some(frame) = session.close_reason().and_then(CloseReason::close_frame) {
        if let Err(err) = write_frame(&mut sink, Message::Close(Some(frame)), heartbeat.interval).await {
            debug!(error = %err, "close frame not delivered");
        }
    }
    if tokio::time::timeout(heartbeat.interval, sink.close()).await.is_err() {
        debug!("transport close timed out");
    }
    info!(
        reason = session.close_reason().map_or("-", CloseReason::as_str),
        dropped = session.drop_count(),
        "session closed"
    );

    release(&session).await;
}

/// Why a single frame could not be written.
#[derive(Debug, Error)]
enum WriteError {
    #[error("{0}")]
    Transport(String),
    #[error("write stalled for {0:?}")]
    Stalled(Duration),
}

async fn write_frame<S>(sink: &mut S, frame: Message, limit: Duration) -> Result<(), WriteError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(WriteError::Transport(err.to_string())),
        Err(_) => Err(WriteError::Stalled(limit)),
    }
}

async fn release(session: &Arc<Session>) {
    if let Some(manager) = session.manager() {
        let _ = manager.deregister(session.id()).await;
    }
}
