// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! The consuming end of a [`Pipe`](super::pipe::Pipe).

use std::{ops::Deref, rc::Rc};

use super::{pipe::{PipeShared, copy_between, move_between},
            position::PipePosition,
            segment::Segment,
            writer::PipeWriter};
use crate::time::Timeout;

/// Read view of a pipe. Cloneable; all clones drain the same cursor.
pub struct PipeReader {
    pub(crate) shared: Rc<PipeShared>,
}

impl PipeReader {
    pub(crate) fn new(shared: Rc<PipeShared>) -> Self {
        shared.reader_views.set(shared.reader_views.get() + 1);
        Self { shared }
    }

    /// Suspends until at least `count` bytes are readable or the pipe is
    /// closed; returns the bytes actually available.
    pub async fn require(&self, count: usize, timeout: Timeout) -> usize {
        self.shared.reader_require(count, timeout).await
    }

    /// Suspends until byte `b` is observed; returns the length up to and
    /// including it, or 0 when the pipe closes without one.
    pub async fn require_until(&self, b: u8, timeout: Timeout) -> usize {
        self.shared.reader_require_until(b, timeout).await
    }

    /// Incrementally fills `buf`; returns the bytes read (short at
    /// end-of-stream or timeout).
    pub async fn read(&self, buf: &mut [u8], timeout: Timeout) -> usize {
        self.shared.reader_read(buf, timeout).await
    }

    /// Copies `length` bytes starting `offset` past the read cursor into
    /// `writer`'s pipe as referenced segments, consuming nothing here and
    /// copying no payload. Returns 0 when the destination closes or the
    /// timeout elapses while throttled.
    pub async fn copy_to(
        &self,
        writer: &PipeWriter,
        offset: usize,
        length: usize,
        timeout: Timeout,
    ) -> usize {
        copy_between(&self.shared, &writer.shared, offset, length, timeout).await
    }

    /// Moves `length` bytes into `writer`'s pipe, consuming them here;
    /// whole segments transfer by reference.
    pub async fn move_to(&self, writer: &PipeWriter, length: usize, timeout: Timeout) -> usize {
        move_between(&self.shared, &writer.shared, length, timeout).await
    }

    /// Bytes available without suspending.
    #[must_use]
    pub fn available(&self) -> usize { self.shared.reader_available() }

    #[must_use]
    pub fn position(&self) -> PipePosition { self.shared.reader_position() }

    /// Whether the writer side has closed; the remaining available bytes are
    /// the end of the stream.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.shared.is_closed() }

    /// Non-consuming byte access `offset` past the read cursor.
    #[must_use]
    pub fn peek(&self, offset: usize) -> Option<u8> { self.shared.reader_peek(offset) }

    /// Non-consuming copy out of the visible window; returns the bytes
    /// copied.
    pub fn peek_into(&self, buf: &mut [u8], offset: usize) -> usize {
        self.shared.reader_peek_into(buf, offset)
    }

    /// Compares `data` against the visible window without consuming.
    #[must_use]
    pub fn matches(&self, data: &[u8], offset: usize) -> bool {
        self.shared.reader_matches(data, offset)
    }

    /// The largest contiguous readable slice starting `offset` bytes past
    /// the read cursor. Empty when nothing is readable there.
    #[must_use]
    pub fn span(&self, offset: usize) -> PipeSpan {
        match self.shared.reader_span_parts(offset) {
            Some((seg, start, len)) => PipeSpan {
                seg: Some(seg),
                start,
                len,
            },
            None => PipeSpan {
                seg: None,
                start: 0,
                len: 0,
            },
        }
    }

    /// Releases `count` consumed bytes.
    pub fn advance(&self, count: usize) { self.shared.reader_advance(count); }

    /// Releases everything up to `position`.
    pub fn advance_to(&self, position: PipePosition) {
        self.advance(self.position().length_until(position));
    }

    /// Bytes between the read cursor and `position`.
    #[must_use]
    pub fn length_until(&self, position: PipePosition) -> usize {
        self.position().length_until(position)
    }

    /// Iterates the currently visible bytes without consuming them.
    #[must_use]
    pub fn iter(&self) -> PipeBytes {
        let (segs, roff, remaining) = self.shared.reader_snapshot();
        PipeBytes {
            segs,
            idx: 0,
            offset: roff,
            remaining,
        }
    }
}

impl Clone for PipeReader {
    fn clone(&self) -> Self { Self::new(self.shared.clone()) }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared
            .reader_views
            .set(self.shared.reader_views.get() - 1);
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader")
            .field("available", &self.available())
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl<'a> IntoIterator for &'a PipeReader {
    type Item = u8;
    type IntoIter = PipeBytes;

    fn into_iter(self) -> PipeBytes { self.iter() }
}

/// A contiguous readable slice, keeping its segment alive. Dereferences to
/// `&[u8]`.
pub struct PipeSpan {
    seg: Option<Rc<Segment>>,
    start: usize,
    len: usize,
}

impl Deref for PipeSpan {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.seg {
            Some(seg) => seg.read_slice(self.start, self.len),
            None => &[],
        }
    }
}

impl std::fmt::Debug for PipeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PipeSpan({} bytes)", self.len)
    }
}

/// Forward byte iterator over the visible window, crossing segment
/// boundaries.
#[derive(Debug)]
pub struct PipeBytes {
    segs: Vec<Rc<Segment>>,
    idx: usize,
    offset: usize,
    remaining: usize,
}

impl Iterator for PipeBytes {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        while self.offset >= self.segs[self.idx].len() {
            self.offset -= self.segs[self.idx].len();
            self.idx += 1;
        }
        let byte = self.segs[self.idx].read_slice(self.offset, 1)[0];
        self.offset += 1;
        self.remaining -= 1;
        Some(byte)
    }

    fn size_hint(&self) -> (usize, Option<usize>) { (self.remaining, Some(self.remaining)) }
}

impl ExactSizeIterator for PipeBytes {}
