//! Injectable time source.
//!
//! Every timestamp read in the signing window, the retry schedule, and cache
//! TTL checks goes through `Clock` so the tests can pin time.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    pub fn at_ms(epoch_ms: i64) -> Self {
        FixedClock::new(DateTime::from_timestamp_millis(epoch_ms).expect("valid epoch ms"))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard += duration;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_settable_and_advancable() {
        let clock = FixedClock::at_ms(1_700_000_000_000);
        assert_eq!(clock.now_ms(), 1_700_000_000_000);
        assert_eq!(clock.now_secs(), 1_700_000_000);

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now_secs(), 1_700_000_030);

        clock.set(DateTime::from_timestamp_millis(0).unwrap());
        assert_eq!(clock.now_ms(), 0);
    }
}
