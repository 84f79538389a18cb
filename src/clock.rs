//! Wall-clock source for session timestamps
//!
//! The controller never calls `Utc::now()` directly. It reads time through a
//! [`Clock`] so that dwell time and idle expiry agree with the runtime's timers,
//! including when a test pauses and advances the runtime clock.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of "now" for a session
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock anchored once, then advanced by the tokio monotonic clock.
///
/// Timestamps never go backwards even if the system clock is adjusted, and they
/// follow `tokio::time::pause`/`advance` in tests.
#[derive(Debug, Clone)]
pub struct TokioClock {
    wall_origin: DateTime<Utc>,
    instant_origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor the clock at a specific wall-clock instant
    pub fn anchored_at(wall_origin: DateTime<Utc>) -> Self {
        Self {
            wall_origin,
            instant_origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.instant_origin);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.wall_origin + elapsed,
            Err(_) => self.wall_origin,
        }
    }
}
