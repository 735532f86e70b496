//! Monotonic time source and named interval timers.
//!
//! Every "is this due" decision in the supervisor loop compares monotonic
//! elapsed time against a configured period, so the whole loop can be driven
//! by an injected clock in tests without real-time waiting.

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub trait Clock {
    /// Monotonic time elapsed since the clock was created (i.e. since boot).
    fn monotonic(&self) -> Duration;

    /// Wall-clock time as unix seconds. Used for payload timestamps and log
    /// lines only — never for scheduling decisions.
    fn wall_unix(&self) -> i64;
}

/// Production clock: `Instant` for scheduling, UTC wall time for timestamps.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall_unix(&self) -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }
}

// ---------------------------------------------------------------------------
// Interval timer
// ---------------------------------------------------------------------------

/// A named periodic deadline: `due` answers "has one period elapsed since the
/// last firing?" and re-arms itself when it fires.
#[derive(Debug)]
pub struct IntervalTimer {
    period: Duration,
    last: Option<Duration>,
}

impl IntervalTimer {
    /// Timer that fires on the first `due` check, then every `period`.
    pub fn immediate(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Timer that first fires one full `period` after `now`.
    pub fn after(period: Duration, now: Duration) -> Self {
        Self {
            period,
            last: Some(now),
        }
    }

    pub fn due(&mut self, now: Duration) -> bool {
        let fire = match self.last {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.period,
        };
        if fire {
            self.last = Some(now);
        }
        fire
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn immediate_timer_fires_on_first_check() {
        let mut t = IntervalTimer::immediate(30 * SEC);
        assert!(t.due(Duration::ZERO));
    }

    #[test]
    fn after_timer_waits_one_full_period() {
        let mut t = IntervalTimer::after(30 * SEC, Duration::ZERO);
        assert!(!t.due(Duration::ZERO));
        assert!(!t.due(29 * SEC));
        assert!(t.due(30 * SEC));
    }

    #[test]
    fn timer_rearms_after_firing() {
        let mut t = IntervalTimer::immediate(10 * SEC);
        assert!(t.due(5 * SEC));
        assert!(!t.due(14 * SEC));
        assert!(t.due(15 * SEC));
        assert!(!t.due(16 * SEC));
    }

    #[test]
    fn timer_fires_once_per_period_even_when_late() {
        // A long stall yields a single catch-up firing, not a burst.
        let mut t = IntervalTimer::after(10 * SEC, Duration::ZERO);
        assert!(t.due(45 * SEC));
        assert!(!t.due(46 * SEC));
        assert!(t.due(55 * SEC));
    }

    #[test]
    fn non_monotonic_now_does_not_panic() {
        let mut t = IntervalTimer::after(10 * SEC, 20 * SEC);
        // now < last: saturating arithmetic, simply not due.
        assert!(!t.due(5 * SEC));
    }

    #[test]
    fn monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.monotonic();
        let b = clock.monotonic();
        assert!(b >= a);
    }

    #[test]
    fn wall_unix_is_recent() {
        let clock = MonotonicClock::new();
        let ts = clock.wall_unix();
        // After 2024-01-01 and before 2040-01-01.
        assert!(ts > 1_704_067_200, "timestamp too old: {ts}");
        assert!(ts < 2_208_988_800, "timestamp too far in future: {ts}");
    }
}
