//! Per-connection session state.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use metrics::counter;
use parking_lot::{Mutex, RwLock};
use parlor_core::{ConnectionId, EventEnvelope};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::CloseReason;
use super::heartbeat::Liveness;
use super::manager::SessionManager;
use crate::metrics::WS_OUTBOUND_DROPS_TOTAL;

/// One admitted WebSocket connection.
///
/// Only the session's own pumps touch the transport. Everything else may
/// enqueue outbound envelopes with [`send`](Self::send), read or change the
/// room, and request closure with [`close`](Self::close).
pub struct Session {
    id: ConnectionId,
    outbound: mpsc::Sender<EventEnvelope>,
    room: RwLock<Option<String>>,
    manager: Weak<SessionManager>,
    closed: CancellationToken,
    close_reason: Mutex<Option<CloseReason>>,
    liveness: Liveness,
    connected_at: Instant,
    dropped: AtomicU64,
    consecutive_drops: AtomicU32,
    slow_consumer_limit: u32,
}

impl Session {
    /// Create a session writing into `outbound`. A `slow_consumer_limit` of
    /// zero never closes on drops.
    pub fn new(
        id: ConnectionId,
        outbound: mpsc::Sender<EventEnvelope>,
        manager: Weak<SessionManager>,
        slow_consumer_limit: u32,
    ) -> Self {
        Self {
            id,
            outbound,
            room: RwLock::new(None),
            manager,
            closed: CancellationToken::new(),
            close_reason: Mutex::new(None),
            liveness: Liveness::new(),
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
            consecutive_drops: AtomicU32::new(0),
            slow_consumer_limit,
        }
    }

    /// Connection identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Enqueue an envelope without waiting.
    ///
    /// Returns `false` when the session is closed or its queue is full. A
    /// full queue counts as a drop; after `slow_consumer_limit` consecutive
    /// drops the session closes with [`CloseReason::SlowConsumer`].
    pub fn send(&self, envelope: EventEnvelope) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.outbound.try_send(envelope) {
            Ok(()) => {
                self.consecutive_drops.store(0, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                let streak = self.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(WS_OUTBOUND_DROPS_TOTAL).increment(1);
                debug!(connection_id = %self.id, streak, "outbound queue full, dropping envelope");
                if self.slow_consumer_limit > 0 && streak >= self.slow_consumer_limit {
                    warn!(connection_id = %self.id, streak, "slow consumer, closing session");
                    let _ = self.close(CloseReason::SlowConsumer);
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Request closure. Returns `true` for the call that actually closed the
    /// session; later calls are no-ops and keep the first reason.
    pub fn close(&self, reason: CloseReason) -> bool {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }
        self.closed.cancel();
        true
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Whether the session has been asked to close.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// The recorded close reason, if closed.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Current room. `None` is the shared default space.
    pub fn room(&self) -> Option<String> {
        self.room.read().clone()
    }

    /// Whether the session is in `room`.
    pub fn in_room(&self, room: Option<&str>) -> bool {
        self.room.read().as_deref() == room
    }

    /// Move the session to another room.
    pub fn set_room(&self, room: Option<String>) {
        *self.room.write() = room;
    }

    /// The owning manager, unless it has been dropped.
    pub fn manager(&self) -> Option<Arc<SessionManager>> {
        self.manager.upgrade()
    }

    /// Inbound activity tracker.
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Time since admission.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Total envelopes dropped on a full queue.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("room", &self.room())
            .field("close_reason", &self.close_reason())
            .finish_non_exhaustive()
    }
}
