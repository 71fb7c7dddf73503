// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Monotonic tick type and unit conversions.
//!
//! A [`Tick`] is one unit of the platform monotonic counter, running at
//! [`TICK_FREQUENCY`] ticks per second. The counter is 32 bits wide and wraps;
//! every comparison therefore goes through the signed wrapping difference, so
//! half of the range is "in the past" and half "in the future" relative to any
//! reference point.

use std::{fmt::{Display, Formatter},
          ops::{Add, AddAssign, Sub}};

/// Ticks per second of the monotonic counter (one tick per microsecond).
pub const TICK_FREQUENCY: u32 = 1_000_000;

/// One instant of the monotonic counter. Wrap-safe: use [`Tick::diff`] (or the
/// `-` operator) for comparisons, never the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(pub u32);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Signed distance from `other` to `self`. Positive means `self` is later.
    #[must_use]
    pub fn diff(self, other: Tick) -> i32 { self.0.wrapping_sub(other.0) as i32 }

    #[must_use]
    pub fn is_after(self, other: Tick) -> bool { self.diff(other) > 0 }

    #[must_use]
    pub fn is_before(self, other: Tick) -> bool { self.diff(other) < 0 }
}

impl Add<u32> for Tick {
    type Output = Tick;

    fn add(self, rhs: u32) -> Tick { Tick(self.0.wrapping_add(rhs)) }
}

impl AddAssign<u32> for Tick {
    fn add_assign(&mut self, rhs: u32) { self.0 = self.0.wrapping_add(rhs); }
}

impl Sub<Tick> for Tick {
    type Output = i32;

    fn sub(self, rhs: Tick) -> i32 { self.diff(rhs) }
}

impl Display for Tick {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}t", self.0) }
}

/// Converts microseconds to ticks, rounding up.
#[must_use]
pub fn ticks_from_micros(us: u32) -> u32 {
    div_ceil_u64(u64::from(us) * u64::from(TICK_FREQUENCY), 1_000_000)
}

/// Converts milliseconds to ticks, rounding up.
#[must_use]
pub fn ticks_from_millis(ms: u32) -> u32 {
    div_ceil_u64(u64::from(ms) * u64::from(TICK_FREQUENCY), 1_000)
}

/// Converts seconds to ticks.
#[must_use]
pub fn ticks_from_secs(sec: u32) -> u32 { (u64::from(sec) * u64::from(TICK_FREQUENCY)) as u32 }

/// Converts ticks to microseconds, rounding down.
#[must_use]
pub fn ticks_to_micros(ticks: u32) -> u32 {
    (u64::from(ticks) * 1_000_000 / u64::from(TICK_FREQUENCY)) as u32
}

/// Converts ticks to milliseconds, rounding down.
#[must_use]
pub fn ticks_to_millis(ticks: u32) -> u32 {
    (u64::from(ticks) * 1_000 / u64::from(TICK_FREQUENCY)) as u32
}

/// Converts ticks to seconds, rounding down.
#[must_use]
pub fn ticks_to_secs(ticks: u32) -> u32 { ticks / TICK_FREQUENCY }

fn div_ceil_u64(num: u64, den: u64) -> u32 { ((num + den - 1) / den) as u32 }

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_wrapping_diff() {
        let a = Tick(u32::MAX - 1);
        let b = a + 4;
        assert_eq!(b.0, 2);
        assert_eq!(b - a, 4);
        assert_eq!(a - b, -4);
        assert!(b.is_after(a));
        assert!(a.is_before(b));
    }

    #[test]
    fn test_conversions_round_up() {
        assert_eq!(ticks_from_millis(1), TICK_FREQUENCY / 1_000);
        assert_eq!(ticks_from_micros(1), 1);
        assert_eq!(ticks_from_secs(2), 2 * TICK_FREQUENCY);
        assert_eq!(ticks_to_millis(ticks_from_millis(10)), 10);
        assert_eq!(ticks_to_secs(ticks_from_secs(3)), 3);
    }
}
