// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Scheduler behavior on the virtual clock: start order, delay accumulation,
//! masked waits, signal waits, nested calls, child join, acquire handoff.

use std::{cell::Cell, rc::Rc, sync::Arc};

use coros_kernel::{PeriodicWakeup, Signal, Tick, Timeout, WaitWord, delay_ms, join_all,
                   run_all, sleep_ms, test_fixtures::{SequenceRecorder, VirtualPlatform},
                   ticks_from_millis, wait_acquire, wait_mask, wait_mask_not, wait_signal,
                   wait_signal_off, yield_now};
use pretty_assertions::assert_eq;

#[test]
fn test_simple_task_runs_on_schedule() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();

    let r = recorder.clone();
    scheduler.add(async move {
        r.mark('a');
        delay_ms(10).await;
        r.mark('b');
        delay_ms(10).await;
        r.mark('c');
    });
    let end = scheduler.run();

    assert_eq!(recorder.take(), "a@0,b@10,c@20");
    assert!(end - Tick::ZERO >= ticks_from_millis(20) as i32);
    assert!(end - Tick::ZERO < ticks_from_millis(21) as i32);
}

#[test]
fn test_delay_counts_from_task_creation() {
    let scheduler = VirtualPlatform::scheduler();
    let a = Rc::new(Cell::new(Tick::ZERO));
    let b = Rc::new(Cell::new(Tick::ZERO));

    let (ta, tb) = (a.clone(), b.clone());
    let probe = scheduler.clone();
    scheduler.add(async move {
        ta.set(probe.time());
        delay_ms(10).await;
        tb.set(probe.time());
    });
    let end = scheduler.run();

    assert_eq!(a.get(), Tick(0));
    assert_eq!(b.get(), Tick(ticks_from_millis(10)));
    assert_eq!(end, b.get());
}

#[test]
fn test_interleaved_tasks() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();

    let r = recorder.clone();
    scheduler.add(async move {
        r.mark('1');
        delay_ms(8).await;
        r.mark('1');
        // This sleep is cut short by task 2's delay; task 1 still runs first.
        sleep_ms(20).await;
        r.mark('1');
        delay_ms(4).await;
        r.mark('1');
    });
    let r = recorder.clone();
    scheduler.add(async move {
        r.mark('2');
        delay_ms(5).await;
        r.mark('2');
        delay_ms(10).await;
        r.mark('2');
        delay_ms(5).await;
        r.mark('2');
    });
    let end = scheduler.run();

    assert_eq!(recorder.take(), "1@0,2@0,2@5,1@8,1@15,2@15,1@19,2@20");
    assert!(end - Tick::ZERO >= ticks_from_millis(20) as i32);
    assert!(end - Tick::ZERO < ticks_from_millis(21) as i32);
}

#[test]
fn test_tasks_start_in_insertion_order() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();

    for mark in ['a', 'b', 'c', 'd', 'e'] {
        let r = recorder.clone();
        scheduler.add(async move {
            r.mark(mark);
            yield_now().await;
            r.mark(mark.to_ascii_uppercase());
        });
    }
    scheduler.run();

    assert_eq!(recorder.take(), "a@0,b@0,c@0,d@0,e@0,A@0,B@0,C@0,D@0,E@0");
}

#[test]
fn test_relative_delays_accumulate_without_drift() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();

    // Task b forces wake-ups at 3 ms multiples; task a's 10 ms cadence must
    // stay exact regardless.
    let r = recorder.clone();
    scheduler.add(async move {
        for _ in 0..3 {
            delay_ms(10).await;
            r.mark('a');
        }
    });
    scheduler.add(async move {
        for _ in 0..7 {
            delay_ms(3).await;
        }
    });
    scheduler.run();

    assert_eq!(recorder.take(), "a@10,a@20,a@30");
}

#[test]
fn test_masked_waits() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();
    let x = Arc::new(WaitWord::new(0));

    let (r, word) = (recorder.clone(), x.clone());
    scheduler.add(async move {
        word.fetch_or(1);
        if wait_mask(&word, 2, 2, Timeout::millis(100)).await {
            r.mark('1');
        } else {
            r.mark('X');
        }
        word.fetch_and(!1);
    });
    let (r, word) = (recorder.clone(), x.clone());
    scheduler.add(async move {
        delay_ms(10).await;
        word.fetch_or(2);
        r.mark('2');
    });
    let (r, word) = (recorder.clone(), x.clone());
    scheduler.add(async move {
        if wait_mask_not(&word, 1, 1, Timeout::millis(5)).await {
            r.mark('X');
        } else {
            r.mark('3');
        }
    });
    let end = scheduler.run();

    assert_eq!(recorder.take(), "3@5,2@10,1@10");
    assert!(end - Tick::ZERO >= ticks_from_millis(10) as i32);
    assert!(end - Tick::ZERO < ticks_from_millis(11) as i32);
}

#[test]
fn test_signal_waits() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();
    let busy = Arc::new(Signal::new(0));
    let go = Arc::new(Signal::new(0));

    let (r, busy_flag, go_flag) = (recorder.clone(), busy.clone(), go.clone());
    scheduler.add(async move {
        busy_flag.set(1);
        if wait_signal(&go_flag, Timeout::millis(100)).await {
            r.mark('1');
        } else {
            r.mark('X');
        }
        busy_flag.set(0);
    });
    let (r, go_flag) = (recorder.clone(), go.clone());
    scheduler.add(async move {
        delay_ms(10).await;
        go_flag.set(1);
        r.mark('2');
    });
    let (r, busy_flag) = (recorder.clone(), busy.clone());
    scheduler.add(async move {
        if wait_signal_off(&busy_flag, Timeout::millis(5)).await {
            r.mark('X');
        } else {
            r.mark('3');
        }
    });
    scheduler.run();

    assert_eq!(recorder.take(), "3@5,2@10,1@10");
}

#[test]
fn test_nested_async_calls() {
    async fn leaf(recorder: SequenceRecorder, delay: u32) {
        recorder.mark('B');
        delay_ms(delay).await;
        recorder.mark('B');
    }

    async fn middle(recorder: SequenceRecorder) {
        recorder.mark('A');
        delay_ms(10).await;
        leaf(recorder.clone(), 10).await;
        recorder.mark('A');
    }

    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();

    let r = recorder.clone();
    scheduler.add(async move {
        r.mark('T');
        middle(r.clone()).await;
        r.mark('T');
    });
    scheduler.run();

    assert_eq!(recorder.take(), "T@0,A@0,B@10,B@20,A@20,T@20");
}

#[test]
fn test_join_all_waits_for_every_child() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();

    async fn child(recorder: SequenceRecorder, mark: char, delay: u32) {
        delay_ms(delay).await;
        recorder.mark(mark);
    }

    let r = recorder.clone();
    scheduler.add(async move {
        let done = run_all![
            child(r.clone(), 'a', 5),
            child(r.clone(), 'b', 15),
            child(r.clone(), 'c', 10),
        ]
        .await;
        assert!(done);
        r.mark('p');
    });
    scheduler.run();

    assert_eq!(recorder.take(), "a@5,c@10,b@15,p@15");
}

#[test]
fn test_join_all_with_no_children_completes_synchronously() {
    let scheduler = VirtualPlatform::scheduler();
    let done = Rc::new(Cell::new(false));

    let flag = done.clone();
    scheduler.add(async move {
        assert!(join_all(Vec::new()).await);
        flag.set(true);
    });
    scheduler.run();
    assert!(done.get());
}

#[test]
fn test_acquire_hands_bits_to_one_waiter_per_window() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();
    // Bit 0 set = claimed. Both waiters arm while it is claimed.
    let lock = Arc::new(WaitWord::new(1));

    for mark in ['1', '2'] {
        let (r, word) = (recorder.clone(), lock.clone());
        scheduler.add(async move {
            assert!(wait_acquire(&word, 1, Timeout::INFINITE).await);
            r.mark(mark);
            delay_ms(5).await;
            word.fetch_xor(1); // release
        });
    }
    let word = lock.clone();
    scheduler.add(async move {
        delay_ms(5).await;
        word.fetch_xor(1); // first release opens the first match window
    });
    scheduler.run();

    // FIFO: the first armed waiter wins the first window; the second only
    // wakes once the first releases again.
    assert_eq!(recorder.take(), "1@5,2@10");
    assert_eq!(lock.get(), 0);
}

#[test]
fn test_wait_timeout_leaves_task_with_false_result() {
    let scheduler = VirtualPlatform::scheduler();
    let word = Arc::new(WaitWord::new(0));
    let outcome = Rc::new(Cell::new(true));

    let (w, o) = (word.clone(), outcome.clone());
    let probe = scheduler.clone();
    scheduler.add(async move {
        let start = probe.time();
        let result = wait_mask(&w, 1, 1, Timeout::millis(7)).await;
        o.set(result);
        assert!(probe.time() - start >= ticks_from_millis(7) as i32);
    });
    scheduler.run();
    assert!(!outcome.get());
}

#[test]
fn test_already_true_condition_completes_synchronously() {
    let scheduler = VirtualPlatform::scheduler();
    let recorder = SequenceRecorder::new();
    let word = Arc::new(WaitWord::new(0xFF));

    let (r, w) = (recorder.clone(), word.clone());
    scheduler.add(async move {
        // Matches at arm time: must not travel through the waiting queue.
        assert!(wait_mask(&w, 0xFF, 0xFF, Timeout::INFINITE).await);
        r.mark('s');
    });
    scheduler.run();

    assert_eq!(recorder.take(), "s@0");
    assert_eq!(scheduler.stats().waits, 0);
}

#[test]
fn test_pre_sleep_callback_can_cancel_sleep() {
    let scheduler = VirtualPlatform::scheduler();
    let fired = Rc::new(Cell::new(0u32));

    let count = fired.clone();
    scheduler.add_pre_sleep(Box::new(move |_now, max_sleep| {
        assert!(max_sleep > 0);
        count.set(count.get() + 1);
        true
    }));
    scheduler.add(async {
        delay_ms(5).await;
    });
    scheduler.run();

    // Cancelled exactly once, then removed.
    assert_eq!(fired.get(), 1);
    assert_eq!(scheduler.stats().sleep_aborts, 1);
}

#[test]
fn test_reset_drops_queued_tasks() {
    let scheduler = VirtualPlatform::scheduler();
    let ran = Rc::new(Cell::new(false));

    let flag = ran.clone();
    scheduler.add_with("doomed", async move {
        delay_ms(10).await;
        flag.set(true);
    });
    assert_eq!(scheduler.task_count(), 1);

    // The orphan-removal warning names the task.
    scheduler.reset();
    assert_eq!(scheduler.task_count(), 0);
    scheduler.run();
    assert!(!ran.get());
}

#[test]
fn test_periodic_wakeup_pays_back_division_error() {
    let scheduler = VirtualPlatform::scheduler();
    let probe = scheduler.clone();
    scheduler.add(async move {
        let start = probe.time();
        let mut wake = PeriodicWakeup::new(3, 700);
        wake.next().await;
        assert_ne!(wake.error(), 0);
        wake.next().await;
        assert_ne!(wake.error(), 0);
        wake.next().await;
        assert_eq!(wake.error(), 0);
        assert_eq!(probe.time() - start, 700);
    });
    scheduler.run();
}

#[test]
fn test_completion_hook_receives_exit_value() {
    let scheduler = VirtualPlatform::scheduler();
    let seen = Rc::new(Cell::new(0isize));

    let observed = seen.clone();
    let handle = scheduler.add(async {
        yield_now().await;
        17isize
    });
    handle.on_complete(move |exit| {
        observed.set(*exit.as_ref().expect("task completed cleanly"));
    });
    scheduler.run();
    assert_eq!(seen.get(), 17);
}
