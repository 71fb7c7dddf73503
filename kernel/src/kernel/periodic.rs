// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Jitter-free fractional periodic wake-ups.
//!
//! Divides a period of `period` ticks into `fraction` wake-ups. When the
//! period does not divide evenly the division error is accumulated and paid
//! back, so every full period lands exactly on schedule.

use super::{async_result::{Suspension, delay_until},
            scheduler::Scheduler};
use crate::time::{TICK_FREQUENCY, Tick};

#[derive(Debug)]
pub struct PeriodicWakeup {
    fraction: u32,
    period: u32,
    t: Tick,
    error: u32,
}

impl PeriodicWakeup {
    /// `fraction` wake-ups per `period` ticks, starting now.
    #[must_use]
    pub fn new(fraction: u32, period: u32) -> Self {
        assert!(fraction > 0);
        Self {
            fraction,
            period,
            t: Scheduler::current().time(),
            error: 0,
        }
    }

    /// `fraction` wake-ups per second.
    #[must_use]
    pub fn per_second(fraction: u32) -> Self { Self::new(fraction, TICK_FREQUENCY) }

    /// Restarts the schedule from the current time.
    pub fn reset(&mut self) {
        self.t = Scheduler::current().time();
        self.error = 0;
    }

    /// Tick time of the most recent scheduled wake-up.
    #[must_use]
    pub fn time(&self) -> Tick { self.t }

    /// Accumulated division error, always less than `fraction`.
    #[must_use]
    pub fn error(&self) -> u32 { self.error }

    /// Delays until the next scheduled wake-up instant.
    pub fn next(&mut self) -> Suspension {
        let total = self.error + self.period;
        let delay = total / self.fraction;
        self.error = total - delay * self.fraction;
        self.t += delay;
        delay_until(self.t)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_error_accumulates_and_pays_back() {
        let mut wake = PeriodicWakeup::new(3, 700);
        let start = wake.time();
        let _first = wake.next();
        assert_ne!(wake.error(), 0);
        let _second = wake.next();
        assert_ne!(wake.error(), 0);
        let _third = wake.next();
        assert_eq!(wake.error(), 0);
        assert_eq!(wake.time() - start, 700);
    }
}
