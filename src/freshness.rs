//! Credential freshness checks and the clock they are measured against.

use chrono::Utc;

/// Default lifetime of a cached credential, in seconds.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 5;

/// Returns `true` if a credential issued at `issued_at_ms` has outlived
/// `ttl_secs` at `now_ms`.
///
/// The boundary is exclusive: a credential that is exactly `ttl_secs` old is
/// still fresh. A timestamp from the future counts as zero elapsed time.
///
/// ```
/// use lobby_client::freshness::is_expired;
///
/// assert!(!is_expired(1_000, 6_000, 5));
/// assert!(is_expired(1_000, 6_001, 5));
/// ```
pub fn is_expired(issued_at_ms: i64, now_ms: i64, ttl_secs: u64) -> bool {
    let elapsed = now_ms.saturating_sub(issued_at_ms);
    let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    elapsed > ttl_ms
}

/// Source of the current time in Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in milliseconds.
    fn now_millis(&self) -> i64;
}

/// Wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock pinned to a single instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: i64,
}

impl FixedClock {
    /// Create a clock that always reports `fixed_time_millis`.
    pub fn new(fixed_time_millis: i64) -> Self {
        Self {
            fixed_time: fixed_time_millis,
        }
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.fixed_time
    }
}
