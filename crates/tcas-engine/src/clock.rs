//! The simulation clock.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};

/// Maps a monotonic wall origin onto calendar simulation time. Owned by
/// the state so two runs in one process never share a clock.
#[derive(Debug, Clone)]
pub struct SimClock {
    origin: Instant,
    start: DateTime<Utc>,
}

impl SimClock {
    /// A clock whose simulation time starts at the current wall time.
    pub fn start_now() -> Self {
        Self {
            origin: Instant::now(),
            start: Utc::now(),
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.origin.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.start + elapsed
    }

    /// When this clock started ticking.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic_from_start() {
        let clock = SimClock::start_now();
        let a = clock.now();
        let b = clock.now();
        assert!(a >= clock.started_at());
        assert!(b >= a);
    }
}
