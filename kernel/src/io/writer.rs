// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The producing end of a [`Pipe`](super::pipe::Pipe).

use std::rc::Rc;

use super::{pipe::PipeShared, position::PipePosition, segment::Segment};
use crate::time::Timeout;

/// Write view of a pipe. Cloneable; all clones share the same write cursor.
pub struct PipeWriter {
    pub(crate) shared: Rc<PipeShared>,
}

impl PipeWriter {
    pub(crate) fn new(shared: Rc<PipeShared>) -> Self {
        shared.writer_views.set(shared.writer_views.get() + 1);
        Self { shared }
    }

    /// Appends a fresh segment sized by the allocator from `hint`; returns
    /// its length, or 0 when the pipe is closed or the timeout elapses.
    /// Suspends while the buffering bound or the segment pools hold the
    /// writer back.
    pub async fn allocate(&self, hint: usize, timeout: Timeout) -> usize {
        self.shared.writer_allocate(hint, timeout).await
    }

    /// Copies `data` into the pipe, allocating as needed. Returns the bytes
    /// written; a short write due to timeout or close is sign-encoded as
    /// `-written`.
    pub async fn write(&self, data: &[u8], timeout: Timeout) -> isize {
        self.shared.writer_write(data, timeout).await
    }

    /// Formats directly into pipe buffers; same return convention as
    /// [`PipeWriter::write`]. Use with `format_args!`:
    ///
    /// ```rust,ignore
    /// w.write_fmt(format_args!("{} {}\n", name, value), Timeout::INFINITE).await;
    /// ```
    pub async fn write_fmt(&self, args: std::fmt::Arguments<'_>, timeout: Timeout) -> isize {
        self.shared.writer_write_fmt(args, timeout).await
    }

    /// Injects a caller-built segment (typically a referenced one) at the
    /// write cursor.
    pub fn insert(&self, seg: Rc<Segment>) { self.shared.writer_insert(seg); }

    /// Length of the contiguous writable run at the write cursor.
    #[must_use]
    pub fn buffer_len(&self) -> usize { self.shared.writer_buffer_len() }

    /// Zero-copy write: hands the contiguous writable run to `fill`, commits
    /// however many bytes it reports, and returns that count.
    pub fn write_in_place(&self, fill: impl FnOnce(&mut [u8]) -> usize) -> usize {
        self.shared.writer_write_in_place(fill)
    }

    /// Commits `count` bytes the caller wrote through
    /// [`PipeWriter::write_in_place`] buffers.
    pub fn advance(&self, count: usize) { self.shared.writer_advance(count); }

    /// Allocated-but-unwritten bytes.
    #[must_use]
    pub fn available(&self) -> usize { self.shared.writer_available() }

    #[must_use]
    pub fn position(&self) -> PipePosition { self.shared.writer_position() }

    /// Marks the pipe closed; no further allocations or writes succeed.
    pub fn close(&self) { self.shared.writer_close(); }
}

impl Clone for PipeWriter {
    fn clone(&self) -> Self { Self::new(self.shared.clone()) }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.shared
            .writer_views
            .set(self.shared.writer_views.get() - 1);
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter")
            .field("available", &self.available())
            .finish()
    }
}
