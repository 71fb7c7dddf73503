// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Task-level helpers: child-task join and in-task delegation.

use std::{pin::Pin, sync::Arc};

use super::{scheduler::{Scheduler, TaskExitValue},
            wait::{WaitWord, wait_mask}};
use crate::time::Timeout;

/// Largest child set [`join_all`] accepts.
pub const MAX_JOIN_ALL: usize = 32;

/// A boxed child task body for [`join_all`]. The [`run_all!`] macro adapts
/// plain and throwing futures alike.
pub type ChildFuture = Pin<Box<dyn Future<Output = TaskExitValue>>>;

/// Spawns every child on the current scheduler and waits until all of them
/// have completed. Completion order of the children is irrelevant; each one
/// decrements a shared counter through its completion hook, and the caller
/// waits for the counter to reach zero.
///
/// # Panics
///
/// Panics when handed more than [`MAX_JOIN_ALL`] children.
pub async fn join_all(children: Vec<ChildFuture>) -> bool {
    assert!(children.len() <= MAX_JOIN_ALL);
    if children.is_empty() {
        return true;
    }

    let scheduler = Scheduler::current();
    let remaining = Arc::new(WaitWord::new(children.len()));
    for child in children {
        let counter = remaining.clone();
        scheduler.add(child).on_complete(move |_exit| {
            counter.fetch_sub(1);
        });
    }
    wait_mask(&remaining, usize::MAX, 0, Timeout::INFINITE)
        .multiple()
        .await
}

/// Boxes each future and joins them via [`join_all`]:
///
/// ```rust,ignore
/// run_all![work_a(), work_b(), work_c()].await;
/// ```
#[macro_export]
macro_rules! run_all {
    ($($fut:expr),+ $(,)?) => {
        $crate::kernel::task::join_all(vec![
            $({
                let fut = $fut;
                Box::pin(async move {
                    $crate::kernel::scheduler::TaskExit::into_exit(fut.await)
                }) as $crate::kernel::task::ChildFuture
            }),+
        ])
    };
}

/// Drives `fut` as if it were the current task's own body: when the future is
/// immediately ready control returns synchronously, otherwise its remaining
/// state continues under the same task. With composable futures this is plain
/// awaiting; the operation exists as a named seam so call sites (notably the
/// worker's thread-less fallback) read the same on every platform.
pub async fn switch<F: Future>(fut: F) -> F::Output { fut.await }
