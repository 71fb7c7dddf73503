// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Reference-counted pipe segments.
//!
//! A segment is a contiguous byte run. *Owned* segments carry their own block
//! (from a pool or the host allocator; dropping the block is the release
//! hook). *Referenced* segments alias a range of another segment and keep it
//! alive through their `Rc`, which is what makes pipe-to-pipe copy and move
//! free of payload copies. The `Rc` strong count is the segment refcount:
//! every clone pairs with exactly one drop.
//!
//! # Aliasing invariant
//!
//! Access goes through raw pointers captured at construction, under one rule
//! the owning pipe maintains: bytes below the pipe's write cursor are frozen
//! (only ever read), and the writable tail is touched by exactly one writer
//! call at a time. Referenced segments only ever alias frozen bytes or (for
//! a split-off tail) bytes the outer pipe has not yet handed to readers.
//! Pipes and segments are single-threaded (`!Send`/`!Sync` via `Rc` and the
//! raw pointer), so the two sides can never run concurrently.

use std::{cell::Cell, rc::Rc};

use crate::mem::PoolBlock;

pub struct Segment {
    storage: Storage,
    len: Cell<usize>,
}

enum Storage {
    Owned {
        /// Keeps the block alive (and routes it back to its pool on drop);
        /// accessed only through `data`.
        _block: PoolBlock,
        data: *mut u8,
    },
    Referenced { inner: Rc<Segment>, offset: usize },
}

impl Segment {
    /// An owned segment over the whole block.
    #[must_use]
    pub fn from_block(mut block: PoolBlock) -> Rc<Segment> {
        let data = block.as_mut_slice().as_mut_ptr();
        let len = block.len();
        Rc::new(Segment {
            storage: Storage::Owned { _block: block, data },
            len: Cell::new(len),
        })
    }

    /// An owned segment pre-filled with `bytes`, for injecting caller data
    /// via [`PipeWriter::insert`](super::writer::PipeWriter::insert).
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Rc<Segment> {
        let mut block = PoolBlock::oversized(bytes.len());
        block.as_mut_slice().copy_from_slice(&bytes);
        Segment::from_block(block)
    }

    /// A segment aliasing `inner[offset..offset + len]`, retaining `inner`.
    #[must_use]
    pub fn referenced(inner: Rc<Segment>, offset: usize, len: usize) -> Rc<Segment> {
        assert!(offset + len <= inner.len());
        Rc::new(Segment {
            storage: Storage::Referenced { inner, offset },
            len: Cell::new(len),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize { self.len.get() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len.get() == 0 }

    /// Truncates the segment. Used when a partially written tail is cut at an
    /// insertion point; never grows.
    pub(crate) fn set_len(&self, len: usize) {
        debug_assert!(len <= self.len.get());
        self.len.set(len);
    }

    fn base(&self) -> *mut u8 {
        match &self.storage {
            Storage::Owned { data, .. } => *data,
            Storage::Referenced { inner, offset } => unsafe { inner.base().add(*offset) },
        }
    }

    /// Borrows frozen bytes. Callers must only pass ranges below the owning
    /// pipe's write cursor (see the module aliasing invariant).
    pub(crate) fn read_slice(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= self.len.get());
        unsafe { std::slice::from_raw_parts(self.base().add(offset), len) }
    }

    /// Writes into not-yet-frozen bytes. Callers must only pass ranges at or
    /// above the owning pipe's write cursor.
    pub(crate) fn write_at(&self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.len.get());
        unsafe {
            std::slice::from_raw_parts_mut(self.base().add(offset), src.len())
                .copy_from_slice(src);
        }
    }

    /// Hands the not-yet-frozen range `[offset, offset + len)` to `fill`,
    /// which returns how many bytes it produced.
    pub(crate) fn write_via(
        &self,
        offset: usize,
        len: usize,
        fill: impl FnOnce(&mut [u8]) -> usize,
    ) -> usize {
        assert!(offset + len <= self.len.get());
        let written =
            fill(unsafe { std::slice::from_raw_parts_mut(self.base().add(offset), len) });
        debug_assert!(written <= len);
        written
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.storage {
            Storage::Owned { .. } => "owned",
            Storage::Referenced { .. } => "referenced",
        };
        f.debug_struct("Segment")
            .field("kind", &kind)
            .field("len", &self.len.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mem::MemPool;

    #[test]
    fn test_owned_round_trip() {
        let pool = MemPool::new(32);
        let seg = Segment::from_block(pool.alloc().unwrap());
        assert_eq!(seg.len(), 32);
        seg.write_at(0, b"hello");
        assert_eq!(seg.read_slice(0, 5), b"hello");
    }

    #[test]
    fn test_referenced_aliases_inner_bytes() {
        let pool = MemPool::new(32);
        let seg = Segment::from_block(pool.alloc().unwrap());
        seg.write_at(0, b"abcdef");

        let sub = Segment::referenced(seg.clone(), 2, 3);
        assert_eq!(sub.read_slice(0, 3), b"cde");
        // Zero-copy: the same bytes, not a copy of them.
        assert_eq!(sub.read_slice(0, 3).as_ptr(), seg.read_slice(2, 3).as_ptr());
    }

    #[test]
    fn test_release_returns_block_to_pool() {
        let pool = MemPool::with_capacity(32, 1);
        let seg = Segment::from_block(pool.alloc().unwrap());
        let sub = Segment::referenced(seg.clone(), 0, 8);
        drop(seg);
        // The referenced segment still holds the block alive.
        assert_eq!(pool.live(), 1);
        drop(sub);
        assert_eq!(pool.live(), 0);
        assert!(pool.alloc().is_some());
    }
}
