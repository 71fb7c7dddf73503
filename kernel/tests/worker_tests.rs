// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Workers: blocking bodies off the cooperative loop, and the synchronous
//! fallback. These run on the hosted platform because real threads are
//! involved.

use std::{cell::Cell, rc::Rc, time::Duration};

use coros_kernel::{DuplexPipe, Scheduler, Timeout, Worker, test_fixtures::VirtualPlatform};
use pretty_assertions::assert_eq;

#[test]
fn test_worker_runs_off_the_loop_and_returns_its_value() {
    let scheduler = Scheduler::new();
    let result = Rc::new(Cell::new(0i32));

    let out = result.clone();
    scheduler.add(async move {
        let value = Worker::run(|| {
            std::thread::sleep(Duration::from_millis(5));
            6 * 7
        })
        .await;
        out.set(value);
    });
    scheduler.run();

    assert_eq!(result.get(), 42);
}

#[test]
fn test_worker_result_interleaves_with_other_tasks() {
    let scheduler = Scheduler::new();
    let order = Rc::new(std::cell::RefCell::new(String::new()));

    let log = order.clone();
    scheduler.add(async move {
        let value = Worker::run(|| {
            std::thread::sleep(Duration::from_millis(10));
            'x'
        })
        .await;
        log.borrow_mut().push(value);
    });
    let log = order.clone();
    scheduler.add(async move {
        // Finishes while the worker is still busy.
        coros_kernel::delay_ms(1).await;
        log.borrow_mut().push('a');
    });
    scheduler.run();

    assert_eq!(*order.borrow(), "ax");
}

#[test]
fn test_run_inline_degrades_to_synchronous_execution() {
    let scheduler = VirtualPlatform::scheduler();
    let result = Rc::new(Cell::new(0i32));

    let out = result.clone();
    scheduler.add(async move {
        out.set(Worker::run_inline(|| 21 * 2).await);
    });
    scheduler.run();

    assert_eq!(result.get(), 42);
}

#[test]
fn test_duplex_pair_crosses_pipes() {
    let scheduler = VirtualPlatform::scheduler();
    let ((a, b), (a_to_b, b_to_a)) = DuplexPipe::pair();

    scheduler.add(async move {
        a.writer().write(b"ping", Timeout::INFINITE).await;
        let n = a.reader().require(4, Timeout::INFINITE).await;
        assert_eq!(n, 4);
        assert!(a.reader().matches(b"pong", 0));
        a.reader().advance(4);
        a.close();
    });
    scheduler.add(async move {
        let n = b.reader().require(4, Timeout::INFINITE).await;
        assert_eq!(n, 4);
        assert!(b.reader().matches(b"ping", 0));
        b.reader().advance(4);
        b.writer().write(b"pong", Timeout::INFINITE).await;
        b.close();
    });
    scheduler.run();

    assert!(a_to_b.is_completed());
    assert!(b_to_a.is_completed());
}
