// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Monotonic pipe positions.
//!
//! Positions count bytes since the pipe was created and never rewind; the
//! difference of two positions is taken wrap-safe, like ticks.

use std::{cmp::Ordering,
          ops::{Add, AddAssign, Sub, SubAssign}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipePosition(u64);

impl PipePosition {
    pub const ZERO: PipePosition = PipePosition(0);

    /// Bytes from `self` forward to `other`; zero when `other` is not ahead.
    #[must_use]
    pub fn length_until(self, other: PipePosition) -> usize {
        let diff = other - self;
        if diff > 0 { diff as usize } else { 0 }
    }
}

impl Sub<PipePosition> for PipePosition {
    type Output = i64;

    fn sub(self, rhs: PipePosition) -> i64 { self.0.wrapping_sub(rhs.0) as i64 }
}

impl Add<usize> for PipePosition {
    type Output = PipePosition;

    fn add(self, rhs: usize) -> PipePosition { PipePosition(self.0.wrapping_add(rhs as u64)) }
}

impl AddAssign<usize> for PipePosition {
    fn add_assign(&mut self, rhs: usize) { self.0 = self.0.wrapping_add(rhs as u64); }
}

impl SubAssign<usize> for PipePosition {
    fn sub_assign(&mut self, rhs: usize) { self.0 = self.0.wrapping_sub(rhs as u64); }
}

impl PartialOrd for PipePosition {
    fn partial_cmp(&self, other: &PipePosition) -> Option<Ordering> {
        Some((*self - *other).cmp(&0))
    }
}
