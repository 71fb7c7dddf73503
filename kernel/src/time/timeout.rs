// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! One-word timeout values.
//!
//! A [`Timeout`] packs three shapes into a single `u32`:
//!
//! - `0` is the infinite timeout;
//! - `1..=i32::MAX` is a relative duration in ticks;
//! - values with the top bit set are absolute deadlines (the remaining 31 bits
//!   are significant; the signed distance to the deadline is recovered with a
//!   shift pair, so deadlines up to half the tick range away stay exact).
//!
//! Equality is *encoding identity*: `Timeout::absolute(Tick(10))` never equals
//! `Timeout::ticks(10)` even when both name the same instant. Temporal
//! comparison is a separate operation, [`Timeout::cmp_deadline`], which binds
//! both values to one shared `now`. The comparison operators are deliberately
//! not implemented: `PartialOrd` would have to disagree with `Eq` for mixed
//! encodings of the same deadline.

use std::cmp::Ordering;

use super::tick::{Tick, ticks_from_micros, ticks_from_millis, ticks_from_secs};

const ABSOLUTE_BIT: u32 = 1 << 31;

/// Maximum relative duration, in ticks, expressible in a [`Timeout`].
pub const TIMEOUT_MAX_TICKS: u32 = i32::MAX as u32;

/// An absolute, relative, or infinite timeout in one machine word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timeout(u32);

impl Timeout {
    /// The infinite timeout: never elapses, compares greater than everything.
    pub const INFINITE: Timeout = Timeout(0);

    /// A deadline at the given instant.
    #[must_use]
    pub const fn absolute(instant: Tick) -> Timeout { Timeout(instant.0 | ABSOLUTE_BIT) }

    /// A relative duration in ticks.
    ///
    /// # Panics
    ///
    /// Panics when `ticks` exceeds [`TIMEOUT_MAX_TICKS`]; a duration that
    /// large cannot be told apart from an absolute deadline.
    #[must_use]
    pub const fn ticks(ticks: u32) -> Timeout {
        assert!(ticks <= TIMEOUT_MAX_TICKS);
        Timeout(ticks)
    }

    #[must_use]
    pub fn micros(us: u32) -> Timeout { Timeout::ticks(ticks_from_micros(us)) }

    #[must_use]
    pub fn millis(ms: u32) -> Timeout { Timeout::ticks(ticks_from_millis(ms)) }

    #[must_use]
    pub fn secs(sec: u32) -> Timeout { Timeout::ticks(ticks_from_secs(sec)) }

    #[must_use]
    pub const fn is_infinite(&self) -> bool { self.0 == 0 }

    #[must_use]
    pub const fn is_absolute(&self) -> bool { self.0 > TIMEOUT_MAX_TICKS }

    /// Note that the infinite timeout counts as relative.
    #[must_use]
    pub const fn is_relative(&self) -> bool { self.0 <= TIMEOUT_MAX_TICKS }

    /// Signed time-to-go at `now`; negative means already elapsed. A relative
    /// timeout reports its full duration regardless of `now`.
    #[must_use]
    pub fn relative(&self, now: Tick) -> i32 {
        if self.is_relative() {
            self.0 as i32
        } else {
            // Recover the 31-bit signed distance to the absolute deadline.
            ((self.0.wrapping_sub(now.0) << 1) as i32) >> 1
        }
    }

    /// The deadline instant this timeout names when bound at `base`.
    #[must_use]
    pub fn to_monotonic(&self, base: Tick) -> Tick { base + self.relative(base) as u32 }

    /// Binds a relative timeout to an absolute deadline at `now`. Absolute and
    /// infinite timeouts are returned unchanged.
    #[must_use]
    pub fn make_absolute(&self, now: Tick) -> Timeout {
        if self.is_absolute() || self.is_infinite() {
            *self
        } else {
            Timeout::absolute(now + self.0)
        }
    }

    #[must_use]
    pub fn elapsed(&self, now: Tick) -> bool { !self.is_infinite() && self.relative(now) < 0 }

    /// Reports whether the deadline is still pending at `at`, binding a
    /// relative timeout in place on first call. Once the deadline passes the
    /// value degrades to infinite and keeps reporting `false`.
    pub fn pending(&mut self, at: Tick) -> bool {
        if self.is_infinite() {
            return false;
        }
        if self.is_relative() {
            *self = self.make_absolute(at);
        }
        if self.relative(at) < 0 {
            *self = Timeout::INFINITE;
            return false;
        }
        true
    }

    /// Temporal comparison with both timeouts bound to the same `now`.
    /// Infinite is strictly greater than every finite timeout.
    #[must_use]
    pub fn cmp_deadline(&self, other: &Timeout, now: Tick) -> Ordering {
        match (self.is_infinite(), other.is_infinite()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.relative(now).cmp(&other.relative(now)),
        }
    }
}
