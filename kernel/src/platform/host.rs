// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Hosted (std) platform: process clock ticks and thread sleeps.

use std::time::{Duration, Instant};

use super::Platform;
use crate::time::{Tick, ticks_to_micros};

/// Largest single host sleep, in ticks. The host has no wake interrupts, so
/// long sleeps are chopped into short naps and the scheduler re-checks its
/// wait conditions in between.
const MAX_NAP_TICKS: u32 = 1_000;

/// [`Platform`] backed by [`std::time::Instant`]. Ticks count microseconds
/// since the platform instance was created and wrap naturally at 32 bits.
#[derive(Debug)]
pub struct HostPlatform {
    epoch: Instant,
}

impl HostPlatform {
    #[must_use]
    pub fn new() -> Self { Self { epoch: Instant::now() } }
}

impl Default for HostPlatform {
    fn default() -> Self { Self::new() }
}

impl Platform for HostPlatform {
    fn now(&self) -> Tick { Tick(self.epoch.elapsed().as_micros() as u32) }

    fn sleep(&self, since: Tick, duration: u32) {
        let target = since + duration.min(MAX_NAP_TICKS);
        let remaining = target - self.now();
        if remaining > 0 {
            std::thread::sleep(Duration::from_micros(u64::from(ticks_to_micros(
                remaining as u32,
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic() {
        let p = HostPlatform::new();
        let a = p.now();
        let b = p.now();
        assert!(b - a >= 0);
    }

    #[test]
    fn test_sleep_advances_clock() {
        let p = HostPlatform::new();
        let start = p.now();
        p.sleep(start, 2_000);
        // Capped at one nap; the clock still has to move forward.
        assert!(p.now() - start > 0);
    }
}
