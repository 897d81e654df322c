//! Per-user download throttling
//!
//! Tracks the last successful download per user and denies new requests
//! inside the configured window. Entries live in a moka cache whose TTL
//! equals the window, so stale users age out instead of accumulating for
//! the lifetime of the process.

use chrono::{DateTime, TimeDelta, Utc};
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Upper bound on tracked users; far above anything a single bot sees
const MAX_TRACKED_USERS: u64 = 100_000;

/// Timestamp-keyed throttle with one privileged (exempt) user
#[derive(Clone)]
pub struct DownloadThrottle {
    /// user id -> time of their last successful download
    recent: Cache<u64, DateTime<Utc>>,
    window: TimeDelta,
    vip_user_id: u64,
}

impl DownloadThrottle {
    /// Create a throttle with the given window and privileged user
    #[must_use]
    pub fn new(window: Duration, vip_user_id: u64) -> Self {
        let recent = Cache::builder()
            .max_capacity(MAX_TRACKED_USERS)
            .time_to_live(window)
            .build();

        Self {
            recent,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            vip_user_id,
        }
    }

    /// Whether `user_id` may start a download at `now`.
    ///
    /// The privileged user is always allowed. Everyone else is allowed
    /// when they have no recorded download, or their last one is at least
    /// a full window old. A denial does not touch the recorded timestamp.
    pub async fn allow(&self, user_id: u64, now: DateTime<Utc>) -> bool {
        if user_id == self.vip_user_id {
            return true;
        }

        match self.recent.get(&user_id).await {
            None => true,
            Some(last) => {
                let allowed = now - last >= self.window;
                if !allowed {
                    debug!(user_id, %last, "Rate limit window still open");
                }
                allowed
            }
        }
    }

    /// Record a successful download; call only after delivery succeeds.
    ///
    /// The privileged user is never tracked.
    pub async fn record(&self, user_id: u64, now: DateTime<Utc>) {
        if user_id == self.vip_user_id {
            return;
        }
        self.recent.insert(user_id, now).await;
    }

    /// Window length in whole minutes, for user-facing messages
    #[must_use]
    pub fn window_minutes(&self) -> i64 {
        self.window.num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIP: u64 = 99;

    fn throttle() -> DownloadThrottle {
        DownloadThrottle::new(Duration::from_secs(60), VIP)
    }

    #[tokio::test]
    async fn first_request_allowed_and_window_enforced() {
        let throttle = throttle();
        let t0 = Utc::now();

        assert!(throttle.allow(1, t0).await);
        throttle.record(1, t0).await;

        // denied strictly inside the window
        assert!(!throttle.allow(1, t0 + TimeDelta::seconds(30)).await);
        assert!(!throttle.allow(1, t0 + TimeDelta::seconds(59)).await);

        // allowed again at and after the boundary
        assert!(throttle.allow(1, t0 + TimeDelta::seconds(60)).await);
        assert!(throttle.allow(1, t0 + TimeDelta::seconds(61)).await);
    }

    #[tokio::test]
    async fn privileged_user_always_allowed() {
        let throttle = throttle();
        let t0 = Utc::now();

        assert!(throttle.allow(VIP, t0).await);
        throttle.record(VIP, t0).await;
        assert!(throttle.allow(VIP, t0 + TimeDelta::seconds(1)).await);
    }

    #[tokio::test]
    async fn denial_does_not_extend_the_window() {
        let throttle = throttle();
        let t0 = Utc::now();

        throttle.record(1, t0).await;
        assert!(!throttle.allow(1, t0 + TimeDelta::seconds(30)).await);
        // the denied attempt at t+30 must not push the boundary to t+90
        assert!(throttle.allow(1, t0 + TimeDelta::seconds(60)).await);
    }

    #[tokio::test]
    async fn users_are_tracked_independently() {
        let throttle = throttle();
        let t0 = Utc::now();

        throttle.record(1, t0).await;
        assert!(!throttle.allow(1, t0 + TimeDelta::seconds(5)).await);
        assert!(throttle.allow(2, t0 + TimeDelta::seconds(5)).await);
    }

    #[tokio::test]
    async fn failed_download_consumes_nothing() {
        // record() is only called on success; an allow() without a
        // record() leaves the user free to retry immediately
        let throttle = throttle();
        let t0 = Utc::now();

        assert!(throttle.allow(1, t0).await);
        assert!(throttle.allow(1, t0 + TimeDelta::seconds(1)).await);
    }
}
