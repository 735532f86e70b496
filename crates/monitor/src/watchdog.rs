//! Watchdog servicing and the preventive reset timer.
//!
//! The watchdog is the last-resort liveness guarantee: it must be fed
//! exactly once per completed loop iteration, at iteration end, never from
//! inside a sub-operation that might block. Separately, the preventive
//! reset fires on schedule regardless of observed health, bounding the
//! lifetime of any slow state degradation nothing else caught.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Watchdog capability
// ---------------------------------------------------------------------------

pub trait Watchdog {
    fn feed(&mut self);
}

/// Process-level stand-in for a hardware watchdog: a monitor thread aborts
/// the process when the loop stops feeding it, and the host's process
/// supervisor performs the actual restart.
pub struct SoftWatchdog {
    last_fed: Arc<Mutex<Instant>>,
}

impl SoftWatchdog {
    pub fn start(timeout: Duration) -> io::Result<Self> {
        let last_fed = Arc::new(Mutex::new(Instant::now()));
        let shared = Arc::clone(&last_fed);

        std::thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || loop {
                std::thread::sleep(timeout / 4);
                let fed = match shared.lock() {
                    Ok(guard) => *guard,
                    Err(poisoned) => *poisoned.into_inner(),
                };
                if fed.elapsed() > timeout {
                    tracing::error!(
                        timeout_secs = timeout.as_secs(),
                        "watchdog expired — aborting for external restart"
                    );
                    std::process::abort();
                }
            })?;

        tracing::info!(timeout_secs = timeout.as_secs(), "watchdog armed");
        Ok(Self { last_fed })
    }
}

impl Watchdog for SoftWatchdog {
    fn feed(&mut self) {
        if let Ok(mut guard) = self.last_fed.lock() {
            *guard = Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor-facing wrapper
// ---------------------------------------------------------------------------

/// Couples watchdog servicing with the preventive reset schedule.
pub struct WatchdogSupervisor<W: Watchdog> {
    dog: W,
    reset_after: Duration,
}

impl<W: Watchdog> WatchdogSupervisor<W> {
    pub fn new(dog: W, reset_after: Duration) -> Self {
        Self { dog, reset_after }
    }

    /// Feed the watchdog. Called once per completed loop iteration.
    pub fn service(&mut self) {
        self.dog.feed();
    }

    /// The preventive reset fires purely on uptime, healthy or not.
    pub fn preventive_reset_due(&self, uptime: Duration) -> bool {
        uptime >= self.reset_after
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingDog(Rc<Cell<u32>>);

    impl Watchdog for CountingDog {
        fn feed(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn service_feeds_exactly_once() {
        let feeds = Rc::new(Cell::new(0));
        let mut sup = WatchdogSupervisor::new(CountingDog(Rc::clone(&feeds)), Duration::from_secs(60));

        sup.service();
        sup.service();
        sup.service();

        assert_eq!(feeds.get(), 3);
    }

    #[test]
    fn preventive_reset_fires_at_the_boundary() {
        let sup = WatchdogSupervisor::new(
            CountingDog(Rc::new(Cell::new(0))),
            Duration::from_secs(86_400),
        );
        assert!(!sup.preventive_reset_due(Duration::from_secs(86_399)));
        assert!(sup.preventive_reset_due(Duration::from_secs(86_400)));
        assert!(sup.preventive_reset_due(Duration::from_secs(100_000)));
    }

    #[test]
    fn soft_watchdog_survives_regular_feeding() {
        // Generous timeout: the feeds below keep it alive and the monitor
        // thread never fires during the test.
        let mut dog = SoftWatchdog::start(Duration::from_secs(60)).unwrap();
        for _ in 0..5 {
            dog.feed();
        }
    }
}
