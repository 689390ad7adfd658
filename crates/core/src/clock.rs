//! Clocks

use std::{
    fmt::Debug,
    sync::atomic::{AtomicI64, Ordering},
};

use jiff::{SignedDuration, Timestamp};

/// Source of the current time.
pub trait Clock: Debug + Send + Sync {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_millisecond()),
        }
    }

    /// Move the clock forward (or back, for a negative duration).
    pub fn advance(&self, by: SignedDuration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);

        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: Timestamp) {
        self.millis.store(to.as_millisecond(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millisecond(self.millis.load(Ordering::SeqCst))
            .unwrap_or(Timestamp::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() -> TestResult {
        let start = Timestamp::from_second(1_767_225_600)?;
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);

        clock.advance(SignedDuration::from_hours(24));

        assert_eq!(clock.now(), Timestamp::from_second(1_767_312_000)?);

        Ok(())
    }

    #[test]
    fn manual_clock_can_be_set() -> TestResult {
        let clock = ManualClock::new(Timestamp::UNIX_EPOCH);
        let target = Timestamp::from_second(60)?;

        clock.set(target);

        assert_eq!(clock.now(), target);

        Ok(())
    }
}
