//! Timing attack protection utilities
//!
//! Two-factor codes are compared in constant time, and failed logins are
//! held to a fixed minimum duration.

use std::time::{Duration, Instant};

use crate::constants::MIN_LOGIN_DURATION_MS;

/// Constant-time string comparison.
///
/// Exact byte equality: no trimming, no numeric coercion.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    constant_time_eq_bytes(a.as_bytes(), b.as_bytes())
}

/// Constant-time byte slice comparison
pub fn constant_time_eq_bytes(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Holds an operation open until a minimum duration has passed
pub struct AuthTimer {
    start: Instant,
    min_duration: Duration,
}

impl AuthTimer {
    pub fn new(min_duration: Duration) -> Self {
        Self {
            start: Instant::now(),
            min_duration,
        }
    }

    /// Timer with the login floor
    pub fn for_login() -> Self {
        Self::new(Duration::from_millis(MIN_LOGIN_DURATION_MS))
    }

    /// Wait until the minimum duration has elapsed
    pub async fn wait(self) {
        let elapsed = self.start.elapsed();
        if elapsed < self.min_duration {
            tokio::time::sleep(self.min_duration - elapsed).await;
        }
    }
}
