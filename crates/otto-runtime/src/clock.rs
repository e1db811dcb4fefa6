// SPDX-License-Identifier: MIT
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::Instant;

/// The runtime clock.
///
/// Wall time is anchored once at construction and then advanced by the
/// tokio timer, so tasks that only read this clock observe the same time
/// line as their durable timers.  Under `#[tokio::test(start_paused = true)]`
/// the clock advances with the paused timer, which makes timer-heavy tests
/// instantaneous and deterministic.
#[derive(Debug, Clone)]
pub struct Clock {
    wall_anchor: DateTime<Utc>,
    instant_anchor: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self { wall_anchor: Utc::now(), instant_anchor: Instant::now() }
    }

    /// Current time on the runtime's time line.
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = self.instant_anchor.elapsed();
        self.wall_anchor
            + ChronoDuration::from_std(elapsed).unwrap_or_else(|_| ChronoDuration::zero())
    }

    /// Map a wall-clock deadline onto the tokio time line.  Deadlines at or
    /// before the anchor map to the anchor, i.e. they are already elapsed.
    pub fn instant_at(&self, deadline: DateTime<Utc>) -> Instant {
        match (deadline - self.wall_anchor).to_std() {
            Ok(offset) => self.instant_anchor + offset,
            Err(_) => self.instant_anchor,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
