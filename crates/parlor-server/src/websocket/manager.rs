//! The session registry: admission, the live-set, dispatch and fan-out.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axum::extract::ws::Message;
use futures::{Sink, Stream};
use metrics::{counter, gauge, histogram};
use parlor_core::{ConnectionId, EventEnvelope};
use tokio::sync::{RwLock, mpsc};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::CloseReason;
use super::connection::Session;
use super::pump::{read_pump, write_pump};
use crate::config::SessionConfig;
use crate::dispatch::{DispatchError, EventRegistry};
use crate::errors::{AdmissionError, RejectReason};
use crate::metrics::{
    WS_ADMISSIONS_REJECTED_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::otp::RetentionMap;

/// A capacity slot held between authorization and attachment.
///
/// Dropping it without attaching gives the slot back, so an upgrade that
/// never completes does not leak capacity.
#[derive(Debug)]
#[must_use = "dropping the ticket releases the reserved slot"]
pub struct AdmissionTicket {
    reserved: Arc<AtomicUsize>,
}

impl AdmissionTicket {
    /// Take a slot; returns the ticket and the number of slots now reserved.
    fn take(reserved: &Arc<AtomicUsize>) -> (Self, usize) {
        let pending = reserved.fetch_add(1, Ordering::AcqRel) + 1;
        (
            Self {
                reserved: Arc::clone(reserved),
            },
            pending,
        )
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        let _ = self.reserved.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owns every live [`Session`], the event table and the credential store.
///
/// Constructed explicitly and shared behind an `Arc`; nothing here is a
/// process-wide singleton, so tests can run independent managers.
pub struct SessionManager {
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
    events: EventRegistry,
    otps: Arc<RetentionMap>,
    config: SessionConfig,
    tasks: TaskTracker,
    reserved: Arc<AtomicUsize>,
    closing: AtomicBool,
}

impl SessionManager {
    /// Create a manager. Session pumps are spawned on `tasks`.
    pub fn new(
        config: SessionConfig,
        events: EventRegistry,
        otps: Arc<RetentionMap>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            otps,
            config,
            tasks,
            reserved: Arc::new(AtomicUsize::new(0)),
            closing: AtomicBool::new(false),
        }
    }

    /// Admission and per-session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The credential store gating admission.
    pub fn otps(&self) -> &Arc<RetentionMap> {
        &self.otps
    }

    /// The immutable event table.
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    // ── Admission ───────────────────────────────────────────────────

    /// Check an upgrade request before the transport is upgraded.
    ///
    /// Order: credential present, origin, shutdown and capacity, then
    /// credential redemption. The credential is consumed only when every
    /// earlier check passed. The returned ticket holds a live-set slot until
    /// it is passed to [`attach`](Self::attach) or dropped.
    pub async fn authorize(
        &self,
        otp: Option<&str>,
        origin: Option<&str>,
    ) -> Result<AdmissionTicket, AdmissionError> {
        let result = self.check_admission(otp, origin).await;
        if let Err(err) = &result {
            counter!(WS_ADMISSIONS_REJECTED_TOTAL, "reason" => err.reason_label()).increment(1);
            info!(reason = err.reason_label(), origin = origin.unwrap_or("-"), "admission rejected");
        }
        result
    }

    async fn check_admission(
        &self,
        otp: Option<&str>,
        origin: Option<&str>,
    ) -> Result<AdmissionTicket, AdmissionError> {
        let Some(otp) = otp.filter(|otp| !otp.is_empty()) else {
            return Err(AdmissionError::Unauthorized(RejectReason::MissingOtp));
        };
        if let Some(allowed) = self.config.allowed_origin.as_deref() {
            if origin != Some(allowed) {
                return Err(AdmissionError::Unauthorized(RejectReason::OriginNotAllowed));
            }
        }
        let ticket = self.reserve().await?;
        if !self.otps.verify_and_consume(otp) {
            return Err(AdmissionError::Unauthorized(RejectReason::InvalidOtp));
        }
        Ok(ticket)
    }

    /// Reserve a live-set slot without any credential check.
    ///
    /// Live sessions plus outstanding tickets never exceed
    /// `max_connections`.
    pub async fn reserve(&self) -> Result<AdmissionTicket, AdmissionError> {
        // The read guard keeps `attach` from growing the live-set meanwhile.
        let sessions = self.sessions.read().await;
        if self.closing.load(Ordering::Acquire) {
            return Err(AdmissionError::ShuttingDown);
        }
        let (ticket, pending) = AdmissionTicket::take(&self.reserved);
        if sessions.len() + pending > self.config.max_connections {
            return Err(AdmissionError::AtCapacity);
        }
        Ok(ticket)
    }

    /// Authorize and, on success, attach an already-upgraded transport.
    pub async fn admit<S, R, E>(
        self: &Arc<Self>,
        otp: Option<&str>,
        origin: Option<&str>,
        sink: S,
        stream: R,
    ) -> Result<Arc<Session>, AdmissionError>
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let ticket = self.authorize(otp, origin).await?;
        Ok(self.attach(ticket, sink, stream).await)
    }

    /// Register a new session over the given transport halves and start its
    /// read and write pumps.
    ///
    /// Once shutdown has begun the session is not registered: it is closed
    /// with [`CloseReason::Shutdown`] and only its write pump runs, to send
    /// the Close frame.
    pub async fn attach<S, R, E>(
        self: &Arc<Self>,
        ticket: AdmissionTicket,
        sink: S,
        stream: R,
    ) -> Arc<Session>
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_capacity.max(1));
        let session = Arc::new(Session::new(
            ConnectionId::new(),
            tx,
            Arc::downgrade(self),
            self.config.slow_consumer_limit,
        ));

        let live = {
            let mut sessions = self.sessions.write().await;
            let registered = !self.closing.load(Ordering::Acquire);
            if registered {
                let _ = sessions.insert(session.id().clone(), Arc::clone(&session));
            }
            drop(ticket);
            registered.then(|| sessions.len())
        };

        let Some(live) = live else {
            info!(connection_id = %session.id(), "refusing session, shutting down");
            let _ = session.close(CloseReason::Shutdown);
            let _ = self.tasks.spawn(write_pump(
                Arc::clone(&session),
                sink,
                rx,
                self.config.heartbeat,
            ));
            return session;
        };
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(connection_id = %session.id(), live, "session registered");

        let _ = self.tasks.spawn(write_pump(
            Arc::clone(&session),
            sink,
            rx,
            self.config.heartbeat,
        ));
        let _ = self.tasks.spawn(read_pump(
            Arc::clone(&session),
            stream,
            self.config.failure_policy,
        ));

        session
    }

    /// Remove a session from the live-set and close it.
    ///
    /// Returns `true` only for the call that actually removed it; removing an
    /// absent session is a no-op.
    pub async fn deregister(&self, id: &ConnectionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        let Some(session) = removed else {
            return false;
        };
        let _ = session.close(CloseReason::Deregistered);

        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(session.age().as_secs_f64());
        let reason = session.close_reason().unwrap_or(CloseReason::Deregistered);
        if reason.is_transport_failure() {
            warn!(connection_id = %id, %reason, "session deregistered");
        } else {
            info!(connection_id = %id, %reason, "session deregistered");
        }
        true
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Number of live sessions.
    pub async fn live_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ── Messaging ───────────────────────────────────────────────────

    /// Route an inbound envelope to its handler.
    pub async fn dispatch(
        &self,
        envelope: &EventEnvelope,
        session: &Arc<Session>,
    ) -> Result<(), DispatchError> {
        self.events.dispatch(envelope, session).await
    }

    /// Enqueue `envelope` on every live session in `room`. Returns how many
    /// sessions accepted it.
    pub async fn broadcast_to_room(&self, room: Option<&str>, envelope: &EventEnvelope) -> usize {
        let targets: Vec<Arc<Session>> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|session| session.in_room(room))
            .cloned()
            .collect();

        targets
            .iter()
            .filter(|session| session.send(envelope.clone()))
            .count()
    }

    /// Stop admitting sessions, then close every live one with
    /// [`CloseReason::Shutdown`]. Returns how many were closed.
    pub async fn begin_shutdown(&self) -> usize {
        {
            let _sessions = self.sessions.write().await;
            self.closing.store(true, Ordering::Release);
        }
        self.close_all(CloseReason::Shutdown).await
    }

    /// Close every live session with `reason`. Their pumps deregister them.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let count = sessions.len();
        for session in sessions {
            let _ = session.close(reason);
        }
        if count > 0 {
            info!(count, %reason, "closing all sessions");
        }
        count
    }
}
