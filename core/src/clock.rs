//! Time abstraction for testable audit timestamps.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Audit records take their `created_at` from an injected clock so tests can
/// pin time deterministically (see `FixedClock` in the testing crate).
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
