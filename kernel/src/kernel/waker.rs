// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The scheduler polls by scanning its queues every iteration, so wakers have
//! nothing to deliver; every poll runs under a no-op waker.

use std::task::{Context, Waker};

pub(crate) fn noop_context() -> Context<'static> { Context::from_waker(Waker::noop()) }
