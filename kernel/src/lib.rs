// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! # Cooperative kernel and zero-copy pipes
//!
//! A tiny cooperative operating-system library for resource-constrained
//! targets: a single-threaded scheduler that runs user code as stackless
//! async state machines, and a segmented byte pipe that moves data between
//! tasks without copying payloads.
//!
//! ## Scheduler
//!
//! Tasks are ordinary Rust futures driven one poll at a time by
//! [`Scheduler::run`]. There is no preemption: a task runs until it suspends,
//! and the way it suspends tells the scheduler what to do next:
//!
//! - [`yield_now`] / `sleep_*` let the system sleep but continue on the next
//!   iteration;
//! - `delay_*` park the task until a deadline, with consecutive relative
//!   delays accumulating drift-free;
//! - `wait_*` park the task until a masked memory condition holds, optionally
//!   claiming the matched bits ([`wait_acquire`]) and optionally bounded by a
//!   [`Timeout`];
//! - [`join_all`] forks child tasks and waits for all of them.
//!
//! Between two suspension points a task effectively holds an implicit mutex
//! over all process state; nothing else runs. Exceptions
//! ([`Exception`], [`throw`], [`catch`]) unwind across await boundaries as
//! `Result`s, running frame destructors LIFO on the way out.
//!
//! ```rust
//! use coros_kernel::{Scheduler, delay_ms};
//!
//! let scheduler = Scheduler::new();
//! scheduler.add(async {
//!     delay_ms(1).await;
//!     delay_ms(1).await;
//! });
//! scheduler.run();
//! ```
//!
//! ## Pipes
//!
//! A [`Pipe`] is a chain of reference-counted segments with one write cursor
//! and one read cursor. Producers [`PipeWriter::write`] (or format, or fill
//! buffers in place); consumers [`PipeReader::require`] and advance.
//! [`PipeReader::copy_to`] and [`PipeReader::move_to`] ship bytes between
//! pipes by inserting segments that *reference* the source; no payload byte
//! is ever copied. Backpressure falls out of the segment pools: a writer that
//! cannot allocate suspends on the pool's watch word until a reader releases
//! a segment.

// Attach sources.
pub mod io;
pub mod kernel;
pub mod mem;
pub mod platform;
pub mod test_fixtures;
pub mod time;

// Re-export.
pub use io::*;
pub use kernel::*;
pub use mem::*;
pub use platform::*;
pub use time::*;
