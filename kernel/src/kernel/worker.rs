// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Blocking computations off the cooperative loop.
//!
//! [`Worker::run`] moves a blocking closure onto a host thread and resolves
//! to its return value. Completion is published by storing into a [`Signal`]
//! byte (the same plain-store discipline an interrupt handler would use),
//! which the kernel awaits like any other wait-on-memory condition. On
//! targets without threads the body degrades to running synchronously under
//! [`switch`](super::task::switch).

use std::sync::{Arc, Mutex, PoisonError};

use super::{task::switch,
            wait::{Signal, wait_signal}};
use crate::time::Timeout;

#[derive(Debug)]
pub struct Worker;

impl Worker {
    /// Runs `work` on a host thread; the awaiting task suspends until the
    /// worker signals completion and then takes the result.
    pub async fn run<T, F>(work: F) -> T
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let done = Arc::new(Signal::new(0));
        let result: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

        let thread_done = done.clone();
        let thread_result = result.clone();
        let handle = std::thread::Builder::new()
            .name("kernel-worker".into())
            .spawn(move || {
                let value = work();
                *thread_result
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(value);
                // The completion "interrupt": a plain store the scheduler
                // observes under its interrupt-off bracket.
                thread_done.set(1);
            })
            .expect("failed to spawn worker thread");

        wait_signal(&done, Timeout::INFINITE).await;
        let _joined = handle.join();

        result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .expect("worker signalled completion without a result")
    }

    /// Thread-less fallback: runs the body synchronously under the current
    /// task.
    pub async fn run_inline<T>(work: impl FnOnce() -> T) -> T {
        switch(async move { work() }).await
    }
}
