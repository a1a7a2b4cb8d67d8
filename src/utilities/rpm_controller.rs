//! Requests-per-minute limiting for LLM calls.
//!
//! Keeps a sliding one-minute window of call instants measured on the
//! injected [`Clock`]. When the window is full the caller is blocked until
//! the oldest call ages out; the controller never rejects a call.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::utilities::clock::Clock;

const WINDOW: Duration = Duration::from_secs(60);

/// Manages requests per minute limiting.
#[derive(Debug)]
pub struct RPMController {
    /// Maximum requests per minute. `None` disables limiting.
    pub max_rpm: Option<u32>,
    clock: Arc<dyn Clock>,
    calls: Mutex<VecDeque<Duration>>,
}

impl RPMController {
    pub fn new(max_rpm: Option<u32>, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_rpm,
            clock,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a call, waiting first if the cap is momentarily exceeded.
    ///
    /// Returns the total time spent waiting.
    pub fn acquire(&self) -> Duration {
        let Some(max) = self.max_rpm.filter(|m| *m > 0) else {
            return Duration::ZERO;
        };

        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut calls = self.calls.lock();
                let now = self.clock.now();
                while calls
                    .front()
                    .is_some_and(|t| now.saturating_sub(*t) >= WINDOW)
                {
                    calls.pop_front();
                }
                if calls.len() < max as usize {
                    calls.push_back(now);
                    return waited;
                }
                // Window is full: wait until the oldest call leaves it.
                let oldest = calls.front().copied().unwrap_or(now);
                (oldest + WINDOW).saturating_sub(now)
            };

            log::warn!(
                "Max RPM ({}) reached, waiting {:?} before the next call",
                max,
                wait
            );
            self.clock.sleep(wait);
            waited += wait;
        }
    }

    /// Number of calls inside the current window.
    pub fn current_rpm(&self) -> usize {
        let now = self.clock.now();
        self.calls
            .lock()
            .iter()
            .filter(|t| now.saturating_sub(**t) < WINDOW)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::clock::ManualClock;
    use chrono::NaiveDate;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()))
    }

    #[test]
    fn test_unlimited_never_waits() {
        let clock = clock();
        let rpm = RPMController::new(None, clock.clone());
        for _ in 0..100 {
            assert_eq!(rpm.acquire(), Duration::ZERO);
        }
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_blocks_when_cap_reached() {
        let clock = clock();
        let rpm = RPMController::new(Some(2), clock.clone());
        assert_eq!(rpm.acquire(), Duration::ZERO);
        clock.advance(Duration::from_secs(10));
        assert_eq!(rpm.acquire(), Duration::ZERO);
        assert_eq!(rpm.current_rpm(), 2);

        // Third call must wait for the first one (t=0) to leave the window.
        let waited = rpm.acquire();
        assert_eq!(waited, Duration::from_secs(50));
        assert_eq!(clock.now(), Duration::from_secs(60));
        assert_eq!(rpm.current_rpm(), 2);
    }

    #[test]
    fn test_window_slides() {
        let clock = clock();
        let rpm = RPMController::new(Some(1), clock.clone());
        rpm.acquire();
        clock.advance(Duration::from_secs(61));
        assert_eq!(rpm.acquire(), Duration::ZERO);
    }
}
