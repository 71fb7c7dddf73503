// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Wait-on-memory primitives.
//!
//! A task suspends until `(word & mask) == expect` (or `!=` for the inverted
//! forms), optionally claiming the matched bits atomically (`acquire`) and
//! optionally bounded by a [`Timeout`]. The scheduler re-evaluates every armed
//! wait once per iteration, in arming order, so the first waiter in FIFO order
//! wins contested acquire bits.
//!
//! The watched cells are [`WaitWord`] (a machine word) and [`Signal`] (a
//! byte). Interrupt handlers and worker threads may *store* into them; the
//! scheduler only loads under its interrupt-off bracket, and `acquire` XORs
//! under the same bracket, which is what makes the pair usable as a
//! lightweight semaphore.

use std::{cell::Cell,
          pin::Pin,
          rc::Rc,
          sync::atomic::{AtomicU8, AtomicUsize, Ordering},
          task::{Context, Poll}};

use super::async_result::{AsyncResult, publish};
use crate::time::Timeout;

/// A watchable machine word.
///
/// Besides carrying data for masked waits, a `WaitWord` is the kernel's
/// change-notification primitive: state counters (pipes) and allocator watch
/// words [`bump`](WaitWord::bump) it on every visible change so that waiters
/// armed with [`wait_mask_not`] on a snapshot wake up.
#[derive(Debug, Default)]
pub struct WaitWord(AtomicUsize);

impl WaitWord {
    #[must_use]
    pub fn new(value: usize) -> Self { Self(AtomicUsize::new(value)) }

    #[must_use]
    pub fn get(&self) -> usize { self.0.load(Ordering::SeqCst) }

    pub fn set(&self, value: usize) { self.0.store(value, Ordering::SeqCst); }

    /// Wrapping increment; the canonical "something changed" notification.
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fetch_or(&self, bits: usize) -> usize { self.0.fetch_or(bits, Ordering::SeqCst) }

    pub fn fetch_and(&self, bits: usize) -> usize { self.0.fetch_and(bits, Ordering::SeqCst) }

    pub fn fetch_xor(&self, bits: usize) -> usize { self.0.fetch_xor(bits, Ordering::SeqCst) }

    pub fn fetch_sub(&self, n: usize) -> usize { self.0.fetch_sub(n, Ordering::SeqCst) }
}

/// A watchable byte, the `signal` flavor of wait-on-memory. Interrupt
/// handlers (and worker threads) set it with a plain store.
#[derive(Debug, Default)]
pub struct Signal(AtomicU8);

impl Signal {
    #[must_use]
    pub fn new(value: u8) -> Self { Self(AtomicU8::new(value)) }

    #[must_use]
    pub fn get(&self) -> u8 { self.0.load(Ordering::SeqCst) }

    pub fn set(&self, value: u8) { self.0.store(value, Ordering::SeqCst); }

    fn fetch_xor(&self, bits: u8) -> u8 { self.0.fetch_xor(bits, Ordering::SeqCst) }
}

/// What a wait is armed on.
#[derive(Debug, Clone)]
pub enum WaitTarget {
    Word(std::sync::Arc<WaitWord>),
    Byte(std::sync::Arc<Signal>),
}

impl WaitTarget {
    pub(crate) fn load(&self) -> usize {
        match self {
            WaitTarget::Word(w) => w.get(),
            WaitTarget::Byte(b) => usize::from(b.get()),
        }
    }

    pub(crate) fn xor(&self, mask: usize) {
        match self {
            WaitTarget::Word(w) => {
                w.fetch_xor(mask);
            }
            WaitTarget::Byte(b) => {
                b.fetch_xor(mask as u8);
            }
        }
    }
}

/// The armed wait record the scheduler evaluates each iteration.
#[derive(Debug, Clone)]
pub struct WaitRequest {
    pub(crate) target: WaitTarget,
    pub(crate) mask: usize,
    pub(crate) expect: usize,
    pub(crate) invert: bool,
    pub(crate) acquire: bool,
    pub(crate) timeout: Timeout,
    /// Filled in by the scheduler before the task moves back to active:
    /// `true` = condition met, `false` = deadline expired.
    pub(crate) outcome: Rc<Cell<Option<bool>>>,
}

impl WaitRequest {
    pub(crate) fn matches(&self) -> bool {
        ((self.target.load() & self.mask) == self.expect) != self.invert
    }
}

/// A wait-on-memory future. Resolves to `true` when the condition was met and
/// `false` when the deadline expired first.
///
/// Arming takes a fast path: a condition that already holds completes
/// synchronously (still claiming bits for acquire waits) without the task
/// ever touching the waiting queue.
#[derive(Debug)]
pub struct WaitFuture {
    target: WaitTarget,
    mask: usize,
    expect: usize,
    invert: bool,
    acquire: bool,
    multiple: bool,
    timeout: Timeout,
    armed: Option<Rc<Cell<Option<bool>>>>,
}

impl WaitFuture {
    fn new(
        target: WaitTarget,
        mask: usize,
        expect: usize,
        invert: bool,
        acquire: bool,
        timeout: Timeout,
    ) -> Self {
        Self {
            target,
            mask,
            expect,
            invert,
            acquire,
            multiple: false,
            timeout,
            armed: None,
        }
    }

    pub(crate) fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

impl Future for WaitFuture {
    type Output = bool;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<bool> {
        if let Some(outcome) = self.armed.clone() {
            if let Some(result) = outcome.get() {
                return Poll::Ready(result);
            }
            // Polled again without a verdict; re-arm from scratch.
            self.armed = None;
        }

        let this = &mut *self;
        let request = WaitRequest {
            target: this.target.clone(),
            mask: this.mask,
            expect: this.expect,
            invert: this.invert,
            acquire: this.acquire,
            timeout: this.timeout,
            outcome: Rc::new(Cell::new(None)),
        };

        if request.matches() {
            if this.acquire {
                this.target.xor(this.mask);
            }
            return Poll::Ready(true);
        }

        this.armed = Some(request.outcome.clone());
        publish(if this.multiple {
            AsyncResult::WaitMultiple(request)
        } else {
            AsyncResult::Wait(request)
        });
        Poll::Pending
    }
}

/// Waits for `(word & mask) == expect`.
#[must_use]
pub fn wait_mask(
    word: &std::sync::Arc<WaitWord>,
    mask: usize,
    expect: usize,
    timeout: Timeout,
) -> WaitFuture {
    WaitFuture::new(
        WaitTarget::Word(word.clone()),
        mask,
        expect,
        false,
        false,
        timeout,
    )
}

/// Waits for `(word & mask) != expect`.
#[must_use]
pub fn wait_mask_not(
    word: &std::sync::Arc<WaitWord>,
    mask: usize,
    expect: usize,
    timeout: Timeout,
) -> WaitFuture {
    WaitFuture::new(
        WaitTarget::Word(word.clone()),
        mask,
        expect,
        true,
        false,
        timeout,
    )
}

/// Waits for the masked bits to read zero, then atomically flips them to
/// claim them. The first FIFO waiter wins each match window.
#[must_use]
pub fn wait_acquire(word: &std::sync::Arc<WaitWord>, mask: usize, timeout: Timeout) -> WaitFuture {
    WaitFuture::new(WaitTarget::Word(word.clone()), mask, 0, false, true, timeout)
}

/// Waits for the signal byte to become non-zero.
#[must_use]
pub fn wait_signal(signal: &std::sync::Arc<Signal>, timeout: Timeout) -> WaitFuture {
    WaitFuture::new(WaitTarget::Byte(signal.clone()), 0xFF, 0, true, false, timeout)
}

/// Waits for the signal byte to become zero.
#[must_use]
pub fn wait_signal_off(signal: &std::sync::Arc<Signal>, timeout: Timeout) -> WaitFuture {
    WaitFuture::new(WaitTarget::Byte(signal.clone()), 0xFF, 0, false, false, timeout)
}

/// Waits until `word` no longer reads `snapshot`; the change-notification
/// idiom used with [`WaitWord::bump`]-style state counters.
#[must_use]
pub fn wait_changed(
    word: &std::sync::Arc<WaitWord>,
    snapshot: usize,
    timeout: Timeout,
) -> WaitFuture {
    wait_mask_not(word, usize::MAX, snapshot, timeout)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::task::Poll;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::kernel::async_result::take_published;
    use crate::kernel::waker::noop_context;

    fn poll_once<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
        Pin::new(fut).poll(&mut noop_context())
    }

    #[test]
    fn test_fast_path_completes_without_arming() {
        let word = Arc::new(WaitWord::new(0b10));
        let mut fut = wait_mask(&word, 0b10, 0b10, Timeout::INFINITE);
        assert_eq!(poll_once(&mut fut), Poll::Ready(true));
        assert!(take_published().is_none());
    }

    #[test]
    fn test_fast_path_acquire_claims_bits() {
        let word = Arc::new(WaitWord::new(0));
        let mut fut = wait_acquire(&word, 0b100, Timeout::INFINITE);
        assert_eq!(poll_once(&mut fut), Poll::Ready(true));
        assert_eq!(word.get(), 0b100);
    }

    #[test]
    fn test_unmatched_wait_publishes_request() {
        let word = Arc::new(WaitWord::new(0));
        let mut fut = wait_mask(&word, 1, 1, Timeout::millis(5));
        assert_eq!(poll_once(&mut fut), Poll::Pending);
        let Some(AsyncResult::Wait(req)) = take_published() else {
            panic!("expected a wait tag");
        };
        assert_eq!(req.mask, 1);
        assert_eq!(req.expect, 1);
        assert_eq!(req.timeout, Timeout::millis(5));
        assert!(!req.invert);
        assert!(!req.matches());

        // Scheduler verdict resumes the future.
        req.outcome.set(Some(true));
        assert_eq!(poll_once(&mut fut), Poll::Ready(true));
    }

    #[test]
    fn test_signal_forms() {
        let sig = Arc::new(Signal::new(0));
        let mut on = wait_signal(&sig, Timeout::INFINITE);
        assert_eq!(poll_once(&mut on), Poll::Pending);
        let _ = take_published();

        sig.set(1);
        let mut on_now = wait_signal(&sig, Timeout::INFINITE);
        assert_eq!(poll_once(&mut on_now), Poll::Ready(true));

        let mut off = wait_signal_off(&sig, Timeout::INFINITE);
        assert_eq!(poll_once(&mut off), Poll::Pending);
        let _ = take_published();
    }
}
