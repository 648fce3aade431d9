//! Time-bounded, single-use admission tokens.
//!
//! [`RetentionMap`] maps opaque tokens to their issue instant. A token
//! redeems at most once and only while younger than the TTL. Expired
//! records are reaped either by [`RetentionMap::verify_and_consume`] (when
//! presented) or by the periodic sweep started with
//! [`RetentionMap::spawn_sweeper`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use metrics::counter;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::{OTP_CONSUMED_TOTAL, OTP_EXPIRED_TOTAL, OTP_ISSUED_TOTAL};

/// Random bytes per token (encoded as 43 URL-safe base64 characters).
const TOKEN_BYTES: usize = 32;

/// An issued one-time credential.
#[derive(Clone, Debug)]
pub struct Otp {
    /// The opaque token handed to the client.
    pub key: String,
    /// When the token was issued.
    pub created: Instant,
}

/// Token store guarded by a single reader/writer lock.
pub struct RetentionMap {
    otps: RwLock<HashMap<String, Instant>>,
    ttl: Duration,
}

impl RetentionMap {
    /// Create an empty store whose tokens live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            otps: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Token time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate and record a fresh token.
    pub fn issue(&self) -> Otp {
        let key = URL_SAFE_NO_PAD.encode(rand::random::<[u8; TOKEN_BYTES]>());
        let created = Instant::now();
        let _ = self.otps.write().insert(key.clone(), created);
        counter!(OTP_ISSUED_TOTAL).increment(1);
        debug!("issued one-time credential");
        Otp { key, created }
    }

    /// Redeem `token`.
    ///
    /// Returns `true` and forgets the token iff it exists and is younger than
    /// the TTL. A present-but-expired token is forgotten as well. The lookup
    /// and removal happen under one write lock, so concurrent callers racing
    /// on the same token see exactly one `true`.
    pub fn verify_and_consume(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let Some(created) = self.otps.write().remove(token) else {
            return false;
        };
        if created.elapsed() < self.ttl {
            counter!(OTP_CONSUMED_TOTAL).increment(1);
            true
        } else {
            counter!(OTP_EXPIRED_TOTAL).increment(1);
            false
        }
    }

    /// Remove every record whose age has reached the TTL. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        let ttl = self.ttl;
        let mut otps = self.otps.write();
        let before = otps.len();
        otps.retain(|_, created| created.elapsed() < ttl);
        let removed = before - otps.len();
        if removed > 0 {
            counter!(OTP_EXPIRED_TOTAL).increment(removed as u64);
            debug!(removed, "swept expired credentials");
        }
        removed
    }

    /// Number of outstanding (unredeemed, unswept) tokens.
    pub fn len(&self) -> usize {
        self.otps.read().len()
    }

    /// Whether no tokens are outstanding.
    pub fn is_empty(&self) -> bool {
        self.otps.read().is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = self.sweep();
                    }
                }
            }
            info!("credential sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TTL: Duration = Duration::from_secs(5);

    #[test]
    fn issued_token_is_url_safe() {
        let map = RetentionMap::new(TTL);
        let otp = map.issue();
        assert_eq!(otp.key.len(), 43);
        assert!(
            otp.key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn tokens_are_unique() {
        let map = RetentionMap::new(TTL);
        let a = map.issue();
        let b = map.issue();
        assert_ne!(a.key, b.key);
        assert_eq!(map.len(), 2);
    }

    #[tokio::test]
    async fn token_redeems_exactly_once() {
        let map = RetentionMap::new(TTL);
        let otp = map.issue();
        assert!(map.verify_and_consume(&otp.key));
        assert!(!map.verify_and_consume(&otp.key));
        assert!(!map.verify_and_consume(&otp.key));
        assert!(map.is_empty());
    }

    #[test]
    fn unknown_and_empty_tokens_fail() {
        let map = RetentionMap::new(TTL);
        let _ = map.issue();
        assert!(!map.verify_and_consume("abc"));
        assert!(!map.verify_and_consume(""));
        assert_eq!(map.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn token_valid_just_before_ttl() {
        let map = RetentionMap::new(TTL);
        let otp = map.issue();
        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert!(map.verify_and_consume(&otp.key));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_fails_and_is_removed() {
        let map = RetentionMap::new(TTL);
        let otp = map.issue();
        tokio::time::advance(TTL).await;
        assert!(!map.verify_and_consume(&otp.key));
        assert!(map.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let map = RetentionMap::new(TTL);
        let old = map.issue();
        tokio::time::advance(Duration::from_secs(3)).await;
        let fresh = map.issue();
        tokio::time::advance(Duration::from_secs(3)).await;

        assert_eq!(map.sweep(), 1);
        assert_eq!(map.len(), 1);
        assert!(!map.verify_and_consume(&old.key));
        assert!(map.verify_and_consume(&fresh.key));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_reaps_in_background_and_stops_on_cancel() {
        let map = Arc::new(RetentionMap::new(TTL));
        let cancel = CancellationToken::new();
        let handle = Arc::clone(&map).spawn_sweeper(TTL, cancel.clone());

        let _ = map.issue();
        tokio::time::sleep(TTL * 2 + Duration::from_millis(10)).await;
        assert!(map.is_empty());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop on cancel")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemption_has_single_winner() {
        let map = Arc::new(RetentionMap::new(TTL));
        let otp = map.issue();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let map = Arc::clone(&map);
            let key = otp.key.clone();
            handles.push(tokio::spawn(async move { map.verify_and_consume(&key) }));
        }
        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    proptest! {
        #[test]
        fn every_issued_token_redeems_once(count in 1usize..40, attempts in 1usize..4) {
            let map = RetentionMap::new(Duration::from_secs(60));
            let keys: Vec<String> = (0..count).map(|_| map.issue().key).collect();
            for key in &keys {
                prop_assert!(map.verify_and_consume(key));
                for _ in 0..attempts {
                    prop_assert!(!map.verify_and_consume(key));
                }
            }
            prop_assert!(map.is_empty());
        }

        #[test]
        fn foreign_tokens_never_redeem(token in "[A-Za-z0-9_-]{0,43}") {
            let map = RetentionMap::new(Duration::from_secs(60));
            let issued = map.issue();
            prop_assume!(token != issued.key);
            prop_assert!(!map.verify_and_consume(&token));
            prop_assert_eq!(map.len(), 1);
        }
    }
}
