//! Live sessions: per-connection state, the two pumps, and the manager that
//! owns them.

pub mod connection;
pub mod heartbeat;
pub mod manager;
pub mod pump;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::Session;
pub use manager::{AdmissionTicket, SessionManager};

use std::fmt;

use axum::extract::ws::{CloseFrame, close_code};

/// Why a session ended. The first reason recorded wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Read or write on the transport failed.
    TransportError,
    /// The peer stayed silent past the heartbeat timeout.
    HeartbeatTimeout,
    /// The outbound queue stayed full for too many consecutive sends.
    SlowConsumer,
    /// The peer sent a Close frame or the stream ended.
    ClientClosed,
    /// Removed from the manager by something other than its own pumps.
    Deregistered,
    /// A handler failed under the `disconnect` policy.
    HandlerFailure,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransportError => "transport_error",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::SlowConsumer => "slow_consumer",
            Self::ClientClosed => "client_closed",
            Self::Deregistered => "deregistered",
            Self::HandlerFailure => "handler_failure",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether this ending counts as a transport failure.
    pub fn is_transport_failure(self) -> bool {
        matches!(
            self,
            Self::TransportError | Self::HeartbeatTimeout | Self::SlowConsumer
        )
    }

    /// Close frame sent to the peer, if the transport is still usable.
    pub fn close_frame(self) -> Option<CloseFrame> {
        let code = match self {
            Self::TransportError | Self::ClientClosed => return None,
            Self::Deregistered => close_code::NORMAL,
            Self::Shutdown => close_code::AWAY,
            Self::HeartbeatTimeout | Self::SlowConsumer | Self::HandlerFailure => {
                close_code::POLICY
            }
        };
        Some(CloseFrame {
            code,
            reason: self.as_str().into(),
        })
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
