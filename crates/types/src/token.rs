//! Cached OAuth token and the clock its expiry is measured against.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// An access token together with the instant it stops being valid.
///
/// Replaced wholesale on renewal; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    /// Expiry in milliseconds since the Unix epoch, as issued.
    pub expires_at: u64,
}

impl CachedToken {
    /// Builds a token issued at `now_millis` that lives for `expires_in_secs`.
    pub fn issued(value: impl Into<String>, now_millis: u64, expires_in_secs: u64) -> Self {
        Self {
            value: value.into(),
            expires_at: now_millis.saturating_add(expires_in_secs.saturating_mul(1000)),
        }
    }

    /// `true` while `now < expires_at - margin`.
    #[must_use]
    pub fn is_fresh(&self, now_millis: u64, margin: Duration) -> bool {
        let margin_ms = u64::try_from(margin.as_millis()).unwrap_or(u64::MAX);
        now_millis.saturating_add(margin_ms) < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARGIN: Duration = Duration::from_secs(60);

    #[test]
    fn test_served_with_61s_left() {
        let now = 1_000_000;
        let t = CachedToken {
            value: "tok".into(),
            expires_at: now + 61_000,
        };
        assert!(t.is_fresh(now, MARGIN));
    }

    #[test]
    fn test_stale_with_59s_left() {
        let now = 1_000_000;
        let t = CachedToken {
            value: "tok".into(),
            expires_at: now + 59_000,
        };
        assert!(!t.is_fresh(now, MARGIN));
    }

    #[test]
    fn test_stale_exactly_at_margin() {
        let now = 1_000_000;
        let t = CachedToken {
            value: "tok".into(),
            expires_at: now + 60_000,
        };
        assert!(!t.is_fresh(now, MARGIN));
    }

    #[test]
    fn test_issued_expiry_in_millis() {
        let t = CachedToken::issued("abc", 5_000, 1800);
        assert_eq!(t.expires_at, 5_000 + 1_800_000);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(10);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_millis(), 2_010);
        clock.set(7);
        assert_eq!(clock.now_millis(), 7);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
