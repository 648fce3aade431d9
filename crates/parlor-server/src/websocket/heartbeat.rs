//! Ping/pong liveness tracking.
//!
//! The read pump marks a session alive on every inbound frame; the write
//! pump's heartbeat tick pings a quiet peer and reaps one that never answers.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Ping cadence and liveness window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often the write pump checks on the peer.
    pub interval: Duration,
    /// Silence after which the peer is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        }
    }
}

/// What the write pump should do on a heartbeat tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// The peer spoke within the last interval; nothing to send.
    Idle,
    /// The peer has been quiet for an interval; send a `Ping`.
    Ping,
    /// A `Ping` went out and the peer stayed silent past the timeout.
    TimedOut,
}

#[derive(Debug)]
struct Beat {
    last_seen: Instant,
    awaiting_reply: bool,
}

/// Last time anything arrived from the peer, and whether a `Ping` is
/// outstanding.
#[derive(Debug)]
pub struct Liveness {
    state: Mutex<Beat>,
}

impl Liveness {
    /// Start the clock now.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Beat {
                last_seen: Instant::now(),
                awaiting_reply: false,
            }),
        }
    }

    /// Record inbound activity. Any frame counts as a reply to the last
    /// `Ping`.
    pub fn mark_alive(&self) {
        let mut state = self.state.lock();
        state.last_seen = Instant::now();
        state.awaiting_reply = false;
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.state.lock().last_seen.elapsed()
    }

    /// Decide the tick action from inbound silence alone.
    ///
    /// Outbound traffic does not count: a peer that only listens is still
    /// pinged, and is timed out only once a `Ping` went unanswered.
    pub fn on_tick(&self, config: &HeartbeatConfig) -> HeartbeatAction {
        let mut state = self.state.lock();
        let idle = state.last_seen.elapsed();
        if state.awaiting_reply && idle >= config.timeout {
            HeartbeatAction::TimedOut
        } else if idle >= config.interval {
            state.awaiting_reply = true;
            HeartbeatAction::Ping
        } else {
            HeartbeatAction::Idle
        }
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CFG: HeartbeatConfig = HeartbeatConfig {
        interval: Duration::from_secs(1),
        timeout: Duration::from_secs(3),
    };

    #[tokio::test(start_paused = true)]
    async fn quiet_peer_is_pinged_every_interval() {
        let live = Liveness::new();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(live.on_tick(&CFG), HeartbeatAction::Idle);
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(live.on_tick(&CFG), HeartbeatAction::Ping);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(live.on_tick(&CFG), HeartbeatAction::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_needs_an_unanswered_ping() {
        let live = Liveness::new();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(live.on_tick(&CFG), HeartbeatAction::Ping);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(live.on_tick(&CFG), HeartbeatAction::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn mark_alive_answers_the_ping() {
        let live = Liveness::new();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(live.on_tick(&CFG), HeartbeatAction::Ping);
        live.mark_alive();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(live.idle_for(), Duration::from_secs(3));
        assert_eq!(live.on_tick(&CFG), HeartbeatAction::Ping);
    }
}
