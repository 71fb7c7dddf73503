// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Deterministic fixtures for kernel tests.
//!
//! [`VirtualPlatform`] replaces the wall clock with a tick counter that only
//! advances inside `sleep`, which makes every scheduler test exact to the
//! tick. [`SequenceRecorder`] collects `mark@millis` strings for asserting
//! execution order and timing in one comparison. [`StepHarness`] polls a
//! future by hand and exposes the [`AsyncResult`] tags it publishes, for
//! testing the suspension contract directly.

use std::{cell::{Cell, RefCell},
          fmt::Write as _,
          pin::Pin,
          rc::Rc,
          task::Poll};

use crate::{kernel::{async_result::{AsyncResult, take_published},
                     scheduler::Scheduler,
                     waker::noop_context},
            platform::Platform,
            time::{Tick, ticks_to_millis}};

/// A platform whose clock starts at zero and moves only when the scheduler
/// sleeps.
#[derive(Debug, Default)]
pub struct VirtualPlatform {
    now: Cell<u32>,
}

impl VirtualPlatform {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// A scheduler driven by a fresh virtual clock.
    #[must_use]
    pub fn scheduler() -> Scheduler { Scheduler::with_platform(Rc::new(Self::new())) }
}

impl Platform for VirtualPlatform {
    fn now(&self) -> Tick { Tick(self.now.get()) }

    fn sleep(&self, since: Tick, duration: u32) {
        let target = since + duration;
        if target.is_after(Tick(self.now.get())) {
            self.now.set(target.0);
        }
    }
}

/// Collects timestamped marks: `mark('a')` at 10 ms appends `"a@10"`.
#[derive(Debug, Clone, Default)]
pub struct SequenceRecorder {
    log: Rc<RefCell<String>>,
}

impl SequenceRecorder {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Appends `mark@millis` using the current scheduler's clock.
    pub fn mark(&self, mark: char) {
        let ms = ticks_to_millis(Scheduler::current().time().0);
        let mut log = self.log.borrow_mut();
        if !log.is_empty() {
            log.push(',');
        }
        let _infallible = write!(log, "{mark}@{ms}");
    }

    #[must_use]
    pub fn take(&self) -> String { std::mem::take(&mut *self.log.borrow_mut()) }
}

impl PartialEq<&str> for SequenceRecorder {
    fn eq(&self, other: &&str) -> bool { *self.log.borrow() == **other }
}

impl std::fmt::Display for SequenceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.log.borrow())
    }
}

/// One manual poll of a kernel future: either it completed, or it suspended
/// with the published tag.
#[derive(Debug)]
pub enum Step<T> {
    Complete(T),
    Suspended(AsyncResult),
}

impl<T> Step<T> {
    /// The suspension tag; panics when the future completed instead.
    #[must_use]
    pub fn tag(&self) -> &AsyncResult {
        match self {
            Step::Suspended(tag) => tag,
            Step::Complete(_) => panic!("future completed instead of suspending"),
        }
    }

    /// The completion value; panics when the future suspended instead.
    pub fn value(self) -> T {
        match self {
            Step::Complete(v) => v,
            Step::Suspended(tag) => panic!("future suspended with {tag} instead of completing"),
        }
    }
}

/// Drives a future one poll at a time, surfacing the suspension tags the
/// scheduler would normally consume.
pub struct StepHarness<T> {
    fut: Pin<Box<dyn Future<Output = T>>>,
}

impl<T> StepHarness<T> {
    #[must_use]
    pub fn new(fut: impl Future<Output = T> + 'static) -> Self { Self { fut: Box::pin(fut) } }

    pub fn step(&mut self) -> Step<T> {
        let _stale = take_published();
        let mut cx = noop_context();
        match self.fut.as_mut().poll(&mut cx) {
            Poll::Ready(value) => Step::Complete(value),
            Poll::Pending => Step::Suspended(
                take_published().expect("kernel future suspended without publishing a tag"),
            ),
        }
    }
}

impl<T> std::fmt::Debug for StepHarness<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StepHarness")
    }
}
