//! Server-tunable outbound pacing rule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pacing rule: `points` messages may be sent per `duration` seconds.
///
/// Installed by the server through a rate-limit frame at any time; reset to
/// [`RateLimitRule::DEFAULT`] once the outbound queue drains to empty so a
/// fresh burst after idle time is not throttled by a stale, tightened rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Messages allowed per window.
    pub points: u32,
    /// Window length in seconds.
    pub duration: u64,
}

impl RateLimitRule {
    /// Built-in rule active until the server overrides it.
    pub const DEFAULT: Self = Self {
        points: 20,
        duration: 1,
    };

    /// Per-message delay: `duration / points`.
    ///
    /// A zero-point rule degenerates to one message per window.
    pub fn delay(&self) -> Duration {
        if self.points == 0 {
            return Duration::from_secs(self.duration);
        }
        Duration::from_secs_f64(self.duration as f64 / self.points as f64)
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self::DEFAULT
    }
}
