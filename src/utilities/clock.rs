//! Injectable time source.
//!
//! Agents, the rate limiter and the run-level budget read time only through
//! [`Clock`], so limits can be exercised in tests without real waiting.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;

/// Monotonic time, sleeping, and the calendar date.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);

    /// Today's date, used for date injection.
    fn today(&self) -> NaiveDate;
}

/// Wall-clock implementation backed by [`Instant`] and the local time zone.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock that only moves when told to. `sleep` advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
    today: NaiveDate,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            elapsed: Mutex::new(Duration::ZERO),
            today,
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
        self.advance(duration);
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        clock.sleep(Duration::from_secs(5));
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(6));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
