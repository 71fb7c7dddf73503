// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Simple cooperative task scheduler.
//!
//! The scheduler owns three FIFO queues over a slot arena:
//!
//! - `active`: tasks that run this iteration;
//! - `delayed`: tasks sleeping until a deadline;
//! - `waiting`: tasks armed on a wait-on-memory condition.
//!
//! [`Scheduler::run`] repeats a fixed sequence until every queue is empty:
//! poll each active task once and interpret its published [`AsyncResult`];
//! reconcile elapsed time; promote due delayed tasks; if nothing is runnable,
//! check for termination and mask interrupts; consume pre-sleep callbacks;
//! scan the waiting tasks in arming order; and finally put the host to sleep
//! for as long as every pending deadline allows. Masking interrupts between
//! the wait scan and the sleep is what guarantees a wake condition stored
//! from an interrupt handler in that window is not slept through.
//!
//! New tasks are pre-seeded with a deadline of "now" and parked on the
//! delayed queue, which makes tasks added in the same tick start in insertion
//! order, after every peer already runnable in the current iteration.

use std::{cell::RefCell,
          collections::VecDeque,
          pin::Pin,
          rc::Rc,
          task::Poll};

use smallvec::SmallVec;

use super::{async_result::{AsyncResult, TimeSpec, take_published},
            exception::Exception,
            wait::WaitRequest,
            waker::noop_context};
use crate::{platform::{HostPlatform, Platform},
            time::{TICK_FREQUENCY, Tick, Timeout}};

/// What a task resolves to: one word of result, or a thrown exception that
/// reached the task root.
pub type TaskExitValue = Result<isize, Exception>;

/// Conversion from the output types a root future may have.
pub trait TaskExit {
    fn into_exit(self) -> TaskExitValue;
}

impl TaskExit for () {
    fn into_exit(self) -> TaskExitValue { Ok(0) }
}

impl TaskExit for isize {
    fn into_exit(self) -> TaskExitValue { Ok(self) }
}

impl<T: TaskExit> TaskExit for Result<T, Exception> {
    fn into_exit(self) -> TaskExitValue {
        match self {
            Ok(v) => v.into_exit(),
            Err(e) => Err(e),
        }
    }
}

type TaskFuture = Pin<Box<dyn Future<Output = TaskExitValue>>>;
type CompletionHook = Box<dyn FnOnce(&TaskExitValue)>;

/// Pre-sleep callback: receives the current tick and the pending sleep
/// duration; returning `true` cancels the sleep and removes the callback.
pub type PreSleepCallback = Box<dyn FnMut(Tick, i32) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TaskId {
    index: usize,
    generation: u64,
}

struct ArmedWait {
    request: WaitRequest,
    until: Option<Tick>,
}

struct Task {
    fut: Option<TaskFuture>,
    /// Display name for diagnostics; tasks added through `add` have none.
    name: Option<&'static str>,
    /// Deadline while the task sits on the delayed queue.
    until: Option<Tick>,
    /// Continuation baseline: the previous delay deadline, so consecutive
    /// relative delays accumulate without drift.
    baseline: Option<Tick>,
    wait: Option<ArmedWait>,
    on_complete: Option<CompletionHook>,
    generation: u64,
}

/// Aggregate scheduler counters, dumped once per tick-second while running.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub iterations: u64,
    pub polls: u64,
    pub completions: u64,
    pub delays: u64,
    pub delay_checks: u64,
    pub delay_ends: u64,
    pub waits: u64,
    pub wait_checks: u64,
    pub wait_ends: u64,
    pub wait_timeouts: u64,
    pub sleeps: u64,
    pub sleep_aborts: u64,
}

struct SchedInner {
    platform: Rc<dyn Platform>,
    slots: Vec<Option<Task>>,
    free: Vec<usize>,
    next_generation: u64,
    active: VecDeque<TaskId>,
    delayed: VecDeque<TaskId>,
    waiting: VecDeque<TaskId>,
    current: Option<TaskId>,
    pre_sleep: SmallVec<[PreSleepCallback; 2]>,
    tick_time: Tick,
    stats: SchedulerStats,
    stats_epoch: Option<Tick>,
    exception_hook: Option<Rc<dyn Fn(&Exception)>>,
}

/// A cheaply cloneable handle to one scheduler instance.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedInner>>,
}

thread_local! {
    static SCHEDULER_STACK: RefCell<Vec<Scheduler>> = const { RefCell::new(Vec::new()) };
    static MAIN_SCHEDULER: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

/// Restores the previously current scheduler when a nested `run` returns.
struct CurrentGuard;

impl CurrentGuard {
    fn push(scheduler: Scheduler) -> Self {
        SCHEDULER_STACK.with(|stack| stack.borrow_mut().push(scheduler));
        CurrentGuard
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        SCHEDULER_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Scheduler {
    /// A scheduler on the hosted platform.
    #[must_use]
    pub fn new() -> Self { Self::with_platform(Rc::new(HostPlatform::new())) }

    #[must_use]
    pub fn with_platform(platform: Rc<dyn Platform>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedInner {
                platform,
                slots: Vec::new(),
                free: Vec::new(),
                next_generation: 0,
                active: VecDeque::new(),
                delayed: VecDeque::new(),
                waiting: VecDeque::new(),
                current: None,
                pre_sleep: SmallVec::new(),
                tick_time: Tick::ZERO,
                stats: SchedulerStats::default(),
                stats_epoch: None,
                exception_hook: None,
            })),
        }
    }

    /// The per-thread main scheduler instance.
    #[must_use]
    pub fn main() -> Self {
        MAIN_SCHEDULER.with(|main| {
            main.borrow_mut()
                .get_or_insert_with(Scheduler::new)
                .clone()
        })
    }

    /// The scheduler driving the currently executing task, or the main
    /// scheduler when called from outside a `run`.
    #[must_use]
    pub fn current() -> Self {
        SCHEDULER_STACK
            .with(|stack| stack.borrow().last().cloned())
            .unwrap_or_else(Scheduler::main)
    }

    /// Current monotonic time as this scheduler's platform reports it.
    #[must_use]
    pub fn time(&self) -> Tick {
        let platform = self.inner.borrow().platform.clone();
        platform.now()
    }

    pub(crate) fn platform(&self) -> Rc<dyn Platform> { self.inner.borrow().platform.clone() }

    /// Adds a task. It is parked on the delayed queue with a deadline of
    /// "now", so tasks added in the same tick start in insertion order.
    pub fn add<F, T>(&self, fut: F) -> TaskHandle
    where
        F: Future<Output = T> + 'static,
        T: TaskExit,
    {
        self.add_task(None, fut)
    }

    /// Adds a task carrying a display name for diagnostics (orphan-removal
    /// warnings, trace output).
    pub fn add_with<F, T>(&self, name: &'static str, fut: F) -> TaskHandle
    where
        F: Future<Output = T> + 'static,
        T: TaskExit,
    {
        self.add_task(Some(name), fut)
    }

    fn add_task<F, T>(&self, name: Option<&'static str>, fut: F) -> TaskHandle
    where
        F: Future<Output = T> + 'static,
        T: TaskExit,
    {
        let now = self.time();
        let mut inner = self.inner.borrow_mut();
        inner.next_generation += 1;
        let task = Task {
            fut: Some(Box::pin(async move { fut.await.into_exit() })),
            name,
            until: Some(now),
            // Seeding the baseline makes the task's first relative delay
            // count from the moment it was added, not from its first run.
            baseline: Some(now),
            wait: None,
            on_complete: None,
            generation: inner.next_generation,
        };
        let index = match inner.free.pop() {
            Some(index) => {
                inner.slots[index] = Some(task);
                index
            }
            None => {
                inner.slots.push(Some(task));
                inner.slots.len() - 1
            }
        };
        let id = TaskId {
            index,
            generation: inner.next_generation,
        };
        inner.delayed.push_back(id);
        tracing::trace!(target: "kernel", index, task = name.unwrap_or("?"), "task added");
        TaskHandle {
            scheduler: Rc::downgrade(&self.inner),
            id,
        }
    }

    /// Registers a callback consulted right before the host is put to sleep.
    pub fn add_pre_sleep(&self, callback: PreSleepCallback) {
        self.inner.borrow_mut().pre_sleep.push(callback);
    }

    /// Installs the hook notified when an uncaught exception reaches a task
    /// root.
    pub fn set_exception_hook(&self, hook: impl Fn(&Exception) + 'static) {
        self.inner.borrow_mut().exception_hook = Some(Rc::new(hook));
    }

    /// Number of live tasks across all three queues.
    #[must_use]
    pub fn task_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.active.len() + inner.delayed.len() + inner.waiting.len()
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats { self.inner.borrow().stats }

    /// Destroys every queued task (their frames unwind through `Drop`) and
    /// clears the queues.
    pub fn reset(&self) {
        let orphans: Vec<Task> = {
            let mut inner = self.inner.borrow_mut();
            let mut ids: Vec<TaskId> = inner.active.drain(..).collect();
            ids.extend(inner.delayed.drain(..));
            ids.extend(inner.waiting.drain(..));
            ids.iter()
                .filter_map(|id| inner.slots[id.index].take())
                .collect()
        };
        {
            let mut inner = self.inner.borrow_mut();
            inner.free.clear();
            let slots_len = inner.slots.len();
            inner.free.extend(0..slots_len);
            inner.current = None;
        }
        for task in &orphans {
            tracing::warn!(
                target: "kernel",
                task = task.name.unwrap_or("?"),
                "removing orphaned task"
            );
        }
        // Frames drop here, outside any scheduler borrow.
        drop(orphans);
    }

    /// Executes the scheduled tasks; returns the final tick time once all
    /// three queues are empty.
    pub fn run(&self) -> Tick {
        let _guard = CurrentGuard::push(self.clone());
        let platform = self.platform();

        loop {
            platform.watchdog_hit();

            let mut t = platform.now();
            {
                let mut inner = self.inner.borrow_mut();
                inner.tick_time = t;
                inner.stats.iterations += 1;
                Self::maybe_dump_stats(&mut inner, t);
            }

            let mut max_sleep = i64::from(i32::MAX);

            // Active pass: poll each task once, interpret its suspension.
            let mut next_active: VecDeque<TaskId> = VecDeque::new();
            loop {
                let popped = self.inner.borrow_mut().active.pop_front();
                let Some(id) = popped else { break };

                let mut fut = {
                    let mut inner = self.inner.borrow_mut();
                    inner.current = Some(id);
                    inner.stats.polls += 1;
                    let slot = inner.slots[id.index]
                        .as_mut()
                        .expect("active task has a slot");
                    slot.fut.take().expect("active task has a future")
                };

                let _stale = take_published();
                let mut cx = noop_context();
                let poll = fut.as_mut().poll(&mut cx);
                self.inner.borrow_mut().current = None;

                match poll {
                    Poll::Ready(exit) => {
                        self.complete_task(id, &exit);
                    }
                    Poll::Pending => {
                        let tag = take_published()
                            .unwrap_or(AsyncResult::Sleep(TimeSpec::Ticks(0)));
                        let mut inner = self.inner.borrow_mut();
                        let slot = inner.slots[id.index]
                            .as_mut()
                            .expect("pending task has a slot");
                        slot.fut = Some(fut);
                        match tag {
                            AsyncResult::Sleep(ts) => {
                                slot.baseline = None;
                                slot.until = None;
                                max_sleep = max_sleep.min(i64::from(ts.relative(t)));
                                next_active.push_back(id);
                            }
                            AsyncResult::Delay(ts) => {
                                inner.stats.delays += 1;
                                let slot = inner.slots[id.index].as_mut().expect("slot");
                                let (until, chains) = match ts {
                                    TimeSpec::Until(u) => (u, false),
                                    TimeSpec::After(to) if to.is_absolute() => {
                                        (to.to_monotonic(t), false)
                                    }
                                    rel => {
                                        let base = slot.baseline.unwrap_or(t);
                                        (base + rel.relative(t) as u32, true)
                                    }
                                };
                                // The deadline is never allowed into the past.
                                let until = if until.is_before(t) { t } else { until };
                                slot.until = Some(until);
                                slot.baseline = chains.then_some(until);
                                inner.delayed.push_back(id);
                            }
                            AsyncResult::Wait(request) | AsyncResult::WaitMultiple(request) => {
                                inner.stats.waits += 1;
                                let until = Self::wait_deadline(request.timeout, t);
                                let slot = inner.slots[id.index].as_mut().expect("slot");
                                slot.baseline = None;
                                slot.until = None;
                                slot.wait = Some(ArmedWait { request, until });
                                inner.waiting.push_back(id);
                            }
                        }
                    }
                }
            }
            self.inner.borrow_mut().active = next_active;

            // Reconcile the time spent running tasks so due delayed tasks are
            // not out-slept.
            let now = platform.now();
            max_sleep -= i64::from(now - t);
            t = now;

            // Delayed pass: promote everything that is due.
            {
                let mut inner = self.inner.borrow_mut();
                let mut remaining = VecDeque::new();
                while let Some(id) = inner.delayed.pop_front() {
                    inner.stats.delay_checks += 1;
                    let slot = inner.slots[id.index]
                        .as_mut()
                        .expect("delayed task has a slot");
                    let until = slot.until.expect("delayed task has a deadline");
                    let sleep = i64::from(until - t);
                    if sleep <= 0 {
                        slot.until = None;
                        inner.stats.delay_ends += 1;
                        inner.active.push_back(id);
                    } else {
                        remaining.push_back(id);
                    }
                    max_sleep = max_sleep.min(sleep);
                }
                inner.delayed = remaining;
            }

            let mut irq_off = false;
            if max_sleep > 0 {
                // Nothing runnable right now; if nothing is pending at all,
                // the loop is done (this avoids sleeping forever after the
                // last task completes).
                let all_empty = {
                    let inner = self.inner.borrow();
                    inner.active.is_empty()
                        && inner.delayed.is_empty()
                        && inner.waiting.is_empty()
                };
                if all_empty {
                    return t;
                }

                platform.disable_interrupts();
                irq_off = true;

                // Pre-sleep guard: each callback may cancel the sleep.
                max_sleep = self.consume_pre_sleep(&*platform, t, max_sleep);
            }

            // Waiting pass, in FIFO arming order: the first matching waiter
            // wins contested acquire bits.
            {
                let mut inner = self.inner.borrow_mut();
                let mut remaining = VecDeque::new();
                while let Some(id) = inner.waiting.pop_front() {
                    inner.stats.wait_checks += 1;
                    let slot = inner.slots[id.index]
                        .as_mut()
                        .expect("waiting task has a slot");
                    let armed = slot.wait.as_ref().expect("waiting task is armed");

                    if armed.request.matches() {
                        if irq_off && max_sleep > 0 {
                            // Abort the sleep and unmask immediately to keep
                            // wake latency low.
                            max_sleep = 0;
                            platform.enable_interrupts();
                            irq_off = false;
                        }
                        if armed.request.acquire {
                            armed.request.target.xor(armed.request.mask);
                        }
                        armed.request.outcome.set(Some(true));
                        slot.wait = None;
                        slot.baseline = None;
                        inner.stats.wait_ends += 1;
                        inner.active.push_back(id);
                        continue;
                    }

                    if let Some(until) = armed.until {
                        let sleep = i64::from(until - t);
                        if sleep <= 0 {
                            if irq_off && max_sleep > 0 {
                                max_sleep = 0;
                                platform.enable_interrupts();
                                irq_off = false;
                            }
                            armed.request.outcome.set(Some(false));
                            slot.wait = None;
                            slot.baseline = None;
                            inner.stats.wait_timeouts += 1;
                            inner.active.push_back(id);
                            continue;
                        }
                        max_sleep = max_sleep.min(sleep);
                    }
                    remaining.push_back(id);
                }
                inner.waiting = remaining;
            }

            if max_sleep > 0 {
                self.inner.borrow_mut().stats.sleeps += 1;
                platform.sleep(t, max_sleep as u32);
            }
            if irq_off {
                platform.enable_interrupts();
            }
        }
    }

    fn complete_task(&self, id: TaskId, exit: &TaskExitValue) {
        let (hook, exception_hook) = {
            let mut inner = self.inner.borrow_mut();
            let task = inner.slots[id.index].take().expect("completed task slot");
            inner.free.push(id.index);
            inner.stats.completions += 1;
            (task.on_complete, inner.exception_hook.clone())
        };
        if let Err(e) = exit {
            tracing::warn!(target: "kernel", exception = %e, "uncaught exception reached task root");
            if let Some(report) = exception_hook {
                report(e);
            }
        }
        if let Some(hook) = hook {
            hook(exit);
        }
    }

    fn wait_deadline(timeout: Timeout, t: Tick) -> Option<Tick> {
        if timeout.is_infinite() {
            return None;
        }
        let until = timeout.to_monotonic(t);
        Some(if until.is_before(t) { t } else { until })
    }

    fn consume_pre_sleep(&self, platform: &dyn Platform, mut t: Tick, mut max_sleep: i64) -> i64 {
        let mut callbacks = std::mem::take(&mut self.inner.borrow_mut().pre_sleep);
        let mut cancelled_at: Option<usize> = None;
        for (i, callback) in callbacks.iter_mut().enumerate() {
            if callback(t, max_sleep.min(i64::from(i32::MAX)) as i32) {
                self.inner.borrow_mut().stats.sleep_aborts += 1;
                cancelled_at = Some(i);
                max_sleep = 0;
                break;
            }
            let now = platform.now();
            max_sleep -= i64::from(now - t);
            t = now;
            if max_sleep <= 0 {
                self.inner.borrow_mut().stats.sleep_aborts += 1;
                break;
            }
        }
        if let Some(i) = cancelled_at {
            let _cancelled = callbacks.remove(i);
        }
        let mut inner = self.inner.borrow_mut();
        // Callbacks registered while consuming stay behind the survivors.
        callbacks.append(&mut inner.pre_sleep);
        inner.pre_sleep = callbacks;
        max_sleep
    }

    fn maybe_dump_stats(inner: &mut SchedInner, t: Tick) {
        let epoch = *inner.stats_epoch.get_or_insert(t);
        if (t - epoch) < TICK_FREQUENCY as i32 {
            return;
        }
        let s = &inner.stats;
        tracing::debug!(
            target: "kstat",
            iterations = s.iterations,
            polls = s.polls,
            completions = s.completions,
            delays = s.delays,
            delay_checks = s.delay_checks,
            delay_ends = s.delay_ends,
            waits = s.waits,
            wait_checks = s.wait_checks,
            wait_ends = s.wait_ends,
            wait_timeouts = s.wait_timeouts,
            sleeps = s.sleeps,
            sleep_aborts = s.sleep_aborts,
            "scheduler second"
        );
        inner.stats_epoch = Some(epoch + TICK_FREQUENCY);
    }
}

impl Default for Scheduler {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("active", &inner.active.len())
            .field("delayed", &inner.delayed.len())
            .field("waiting", &inner.waiting.len())
            .finish()
    }
}

/// Observer handle for a scheduled task.
///
/// The task itself may complete (and its slot be reused) at any iteration, so
/// the handle never exposes the task; it only lets the creator attach a
/// completion hook.
#[derive(Debug)]
pub struct TaskHandle {
    scheduler: std::rc::Weak<RefCell<SchedInner>>,
    id: TaskId,
}

impl TaskHandle {
    /// Attaches a hook invoked with the task's exit value when it completes.
    /// A hook attached after the task already completed is dropped silently.
    pub fn on_complete(&self, hook: impl FnOnce(&TaskExitValue) + 'static) {
        let Some(inner) = self.scheduler.upgrade() else {
            return;
        };
        let mut inner = inner.borrow_mut();
        if let Some(slot) = inner.slots[self.id.index].as_mut() {
            if slot.generation == self.id.generation {
                slot.on_complete = Some(Box::new(hook));
            }
        }
    }
}

/// Adds a task to the scheduler driving the current task (the main scheduler
/// when called from outside a `run`).
pub fn spawn<F, T>(fut: F) -> TaskHandle
where
    F: Future<Output = T> + 'static,
    T: TaskExit,
{
    Scheduler::current().add(fut)
}

/// Current monotonic time of the current scheduler's platform.
#[must_use]
pub fn now() -> Tick { Scheduler::current().time() }
