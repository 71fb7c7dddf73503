// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The suspension contract between async functions and the scheduler.
//!
//! An async function in this kernel is an ordinary Rust future; the compiler
//! generates its state machine and the task's box is its frame. What the
//! original register-pair protocol carried is preserved as the
//! [`AsyncResult`] tag: every kernel suspension point *publishes* a tag into
//! a per-thread slot and returns [`Poll::Pending`]; the scheduler picks the
//! tag up right after polling the task and interprets it:
//!
//! | Tag            | Scheduler action                                       |
//! |----------------|--------------------------------------------------------|
//! | (`Poll::Ready`)| run completion hook, drop the task                     |
//! | `Sleep`        | keep active; cap the upcoming host sleep               |
//! | `Delay`        | move to the delayed queue until the deadline           |
//! | `Wait`         | move to the waiting queue with the wait record         |
//! | `WaitMultiple` | as `Wait`, on a child-task counter                     |
//!
//! A foreign future that pends without publishing a tag is treated as
//! `Sleep(Ticks(0))`, i.e. a plain yield.

use std::{cell::RefCell,
          pin::Pin,
          task::{Context, Poll}};

use strum_macros::Display;

use crate::{kernel::wait::WaitRequest,
            time::{Tick, Timeout}};

/// A point in time in one of the encodings a suspension can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpec {
    /// An absolute instant.
    Until(Tick),
    /// Relative ticks.
    Ticks(u32),
    /// Relative milliseconds.
    Millis(u32),
    /// Relative seconds.
    Secs(u32),
    /// A [`Timeout`] value (absolute, relative or infinite).
    After(Timeout),
}

impl TimeSpec {
    /// Signed tick distance from `now` to the point this value names.
    #[must_use]
    pub fn relative(&self, now: Tick) -> i32 {
        match *self {
            TimeSpec::Until(t) => t - now,
            TimeSpec::Ticks(n) => n as i32,
            TimeSpec::Millis(ms) => crate::time::ticks_from_millis(ms) as i32,
            TimeSpec::Secs(s) => crate::time::ticks_from_secs(s) as i32,
            TimeSpec::After(t) => t.relative(now),
        }
    }
}

/// The tag a suspension point publishes for the scheduler.
#[derive(Debug, Clone, Display)]
pub enum AsyncResult {
    /// The task may sleep *up to* this long; any earlier wake-up is fine and
    /// the task stays on the active queue.
    Sleep(TimeSpec),
    /// The task must sleep *at least* this long; it moves to the delayed
    /// queue. Relative delays accumulate from the previous delay deadline so
    /// periodic wake-ups do not drift.
    Delay(TimeSpec),
    /// Wait for a masked memory condition, optionally with a deadline.
    Wait(WaitRequest),
    /// Wait for a child-task counter to reach zero.
    WaitMultiple(WaitRequest),
}

thread_local! {
    static PUBLISHED: RefCell<Option<AsyncResult>> = const { RefCell::new(None) };
}

/// Publishes the suspension tag for the poll currently in progress.
pub(crate) fn publish(result: AsyncResult) {
    PUBLISHED.with(|slot| *slot.borrow_mut() = Some(result));
}

/// Takes the tag published during the poll that just returned.
pub(crate) fn take_published() -> Option<AsyncResult> {
    PUBLISHED.with(|slot| slot.borrow_mut().take())
}

/// A one-shot suspension: publishes its tag on the first poll, completes on
/// the next. This is the whole of `yield`/`sleep`/`delay`; when and why the
/// second poll happens is the scheduler's business.
#[derive(Debug)]
pub struct Suspension {
    tag: Option<AsyncResult>,
}

impl Suspension {
    pub(crate) fn new(tag: AsyncResult) -> Self { Self { tag: Some(tag) } }
}

impl Future for Suspension {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        match self.tag.take() {
            Some(tag) => {
                publish(tag);
                Poll::Pending
            }
            None => Poll::Ready(()),
        }
    }
}

/// Yields to other tasks; execution continues on the next scheduler iteration.
#[must_use]
pub fn yield_now() -> Suspension { Suspension::new(AsyncResult::Sleep(TimeSpec::Ticks(0))) }

/// Allows the system to sleep until `until`, continuing as soon as it wakes
/// for any reason.
#[must_use]
pub fn sleep_until(until: Tick) -> Suspension {
    Suspension::new(AsyncResult::Sleep(TimeSpec::Until(until)))
}

/// Allows the system to sleep up to `ticks` ticks.
#[must_use]
pub fn sleep_ticks(ticks: u32) -> Suspension {
    Suspension::new(AsyncResult::Sleep(TimeSpec::Ticks(ticks)))
}

/// Allows the system to sleep up to `ms` milliseconds.
#[must_use]
pub fn sleep_ms(ms: u32) -> Suspension {
    Suspension::new(AsyncResult::Sleep(TimeSpec::Millis(ms)))
}

/// Allows the system to sleep up to `sec` seconds.
#[must_use]
pub fn sleep_secs(sec: u32) -> Suspension {
    Suspension::new(AsyncResult::Sleep(TimeSpec::Secs(sec)))
}

/// Allows the system to sleep until the timeout elapses.
#[must_use]
pub fn sleep_timeout(timeout: Timeout) -> Suspension {
    Suspension::new(AsyncResult::Sleep(TimeSpec::After(timeout)))
}

/// Delays execution until `until`.
#[must_use]
pub fn delay_until(until: Tick) -> Suspension {
    Suspension::new(AsyncResult::Delay(TimeSpec::Until(until)))
}

/// Delays execution for `ticks` ticks.
#[must_use]
pub fn delay_ticks(ticks: u32) -> Suspension {
    Suspension::new(AsyncResult::Delay(TimeSpec::Ticks(ticks)))
}

/// Delays execution for `ms` milliseconds.
#[must_use]
pub fn delay_ms(ms: u32) -> Suspension {
    Suspension::new(AsyncResult::Delay(TimeSpec::Millis(ms)))
}

/// Delays execution for `sec` seconds.
#[must_use]
pub fn delay_secs(sec: u32) -> Suspension {
    Suspension::new(AsyncResult::Delay(TimeSpec::Secs(sec)))
}

/// Delays execution until the timeout elapses.
#[must_use]
pub fn delay_timeout(timeout: Timeout) -> Suspension {
    Suspension::new(AsyncResult::Delay(TimeSpec::After(timeout)))
}
