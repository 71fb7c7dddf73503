// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Segment allocation for pipes.
//!
//! The allocator decides segment sizes from the writer's hint and is allowed
//! to suspend: when every acceptable pool is exhausted the requesting task
//! parks on the pool's watch word and wakes when a segment is released
//! anywhere in the process.

use std::{cell::RefCell, pin::Pin, rc::Rc};

use super::segment::Segment;
use crate::{kernel::{now, wait::wait_changed},
            mem::{PoolBlock, PoolSet},
            time::Timeout};

pub type SegmentFuture<'a> = Pin<Box<dyn Future<Output = Option<Rc<Segment>>> + 'a>>;

/// Supplier of pipe segments. `allocate_segment` resolves to `None` when the
/// timeout elapses before memory frees up.
pub trait PipeAllocator {
    fn allocate_segment(&self, hint: usize, timeout: Timeout) -> SegmentFuture<'_>;
}

/// The default allocator: pooled 32/64/256-byte classes, host-allocator
/// fallback for larger hints.
#[derive(Debug)]
pub struct DefaultPipeAllocator {
    pools: PoolSet,
}

impl DefaultPipeAllocator {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            pools: PoolSet::new(),
        })
    }

    /// An allocator whose pools are bounded to `blocks_per_class` live
    /// blocks; exhaustion then exercises the suspend-on-watch-word path.
    #[must_use]
    pub fn bounded(blocks_per_class: usize) -> Rc<Self> {
        Rc::new(Self {
            pools: PoolSet::bounded(blocks_per_class),
        })
    }

    fn try_allocate(
        &self,
        hint: usize,
    ) -> Result<Rc<Segment>, std::sync::Arc<crate::kernel::wait::WaitWord>> {
        match self.pools.class_for(hint) {
            Some(pool) => match pool.alloc() {
                Some(block) => Ok(Segment::from_block(block)),
                None => Err(pool.watch().clone()),
            },
            None => {
                // Oversized: straight from the host allocator, rounded up to
                // whole words.
                let size = hint.next_multiple_of(size_of::<usize>());
                Ok(Segment::from_block(PoolBlock::oversized(size)))
            }
        }
    }
}

impl PipeAllocator for DefaultPipeAllocator {
    fn allocate_segment(&self, hint: usize, timeout: Timeout) -> SegmentFuture<'_> {
        Box::pin(async move {
            let timeout = timeout.make_absolute(now());
            loop {
                match self.try_allocate(hint) {
                    Ok(seg) => return Some(seg),
                    Err(watch) => {
                        tracing::trace!(target: "pipe", hint, "allocator waiting for pool memory");
                        let snapshot = watch.get();
                        if !wait_changed(&watch, snapshot, timeout).await {
                            return None;
                        }
                    }
                }
            }
        })
    }
}

thread_local! {
    static DEFAULT: RefCell<Option<Rc<DefaultPipeAllocator>>> = const { RefCell::new(None) };
}

/// The process-default allocator instance (per thread).
#[must_use]
pub fn default_allocator() -> Rc<DefaultPipeAllocator> {
    DEFAULT.with(|slot| {
        slot.borrow_mut()
            .get_or_insert_with(DefaultPipeAllocator::new)
            .clone()
    })
}
