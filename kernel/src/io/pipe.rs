// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Zero-copy segmented byte pipe.
//!
//! A pipe is a bounded single-writer/single-reader FIFO over a chain of
//! reference-counted [`Segment`]s. The writer fills the tail, the reader
//! drains the head, and three monotonic positions describe the window:
//! `rpos <= wpos <= apos` (read, written, allocated). Pipe-to-pipe copy and
//! move never touch payload bytes; they insert *referenced* segments that
//! alias the source.
//!
//! Every visible change bumps the pipe's state counter, a [`WaitWord`] that
//! suspended peers await: readers waiting for data, writers throttled by the
//! buffering bound or by segment-pool exhaustion, and tasks awaiting
//! completion all wake through it.

use std::{cell::{Cell, RefCell},
          collections::VecDeque,
          rc::Rc,
          sync::Arc};

use super::{allocator::{PipeAllocator, default_allocator},
            position::PipePosition,
            reader::PipeReader,
            segment::Segment,
            writer::PipeWriter};
use crate::{kernel::{now,
                     wait::{WaitWord, wait_changed}},
            time::Timeout};

/// A split-off tail smaller than the bookkeeping it would need is discarded
/// instead of re-linked.
const SPLIT_MIN: usize = size_of::<Segment>();

pub(crate) struct PipeState {
    pub(crate) segs: VecDeque<Rc<Segment>>,
    /// Offset of the read cursor into the first segment.
    pub(crate) roff: usize,
    /// Index of the segment holding the write cursor; `segs.len()` when every
    /// allocated byte is written (the tail slot).
    pub(crate) widx: usize,
    /// Offset of the write cursor into `segs[widx]`.
    pub(crate) woff: usize,
    pub(crate) rpos: PipePosition,
    pub(crate) wpos: PipePosition,
    pub(crate) apos: PipePosition,
    closed: bool,
    capacity: usize,
    total: u64,
}

pub(crate) struct PipeShared {
    allocator: Rc<dyn PipeAllocator>,
    pub(crate) state: Arc<WaitWord>,
    pub(crate) st: RefCell<PipeState>,
    pub(crate) reader_views: Cell<usize>,
    pub(crate) writer_views: Cell<usize>,
}

impl PipeShared {
    fn new(allocator: Rc<dyn PipeAllocator>, capacity: usize) -> Rc<Self> {
        Rc::new(Self {
            allocator,
            state: Arc::new(WaitWord::default()),
            st: RefCell::new(PipeState {
                segs: VecDeque::new(),
                roff: 0,
                widx: 0,
                woff: 0,
                rpos: PipePosition::ZERO,
                wpos: PipePosition::ZERO,
                apos: PipePosition::ZERO,
                closed: false,
                capacity,
                total: 0,
            }),
            reader_views: Cell::new(0),
            writer_views: Cell::new(0),
        })
    }

    // ------------------------------------------------------------------
    // Shared predicates.
    // ------------------------------------------------------------------

    pub(crate) fn is_closed(&self) -> bool { self.st.borrow().closed }

    pub(crate) fn is_empty(&self) -> bool {
        let st = self.st.borrow();
        st.rpos == st.wpos
    }

    pub(crate) fn is_completed(&self) -> bool {
        let st = self.st.borrow();
        st.rpos == st.wpos && st.closed
    }

    pub(crate) fn reader_available(&self) -> usize {
        let st = self.st.borrow();
        (st.wpos - st.rpos) as usize
    }

    pub(crate) fn writer_available(&self) -> usize {
        let st = self.st.borrow();
        (st.apos - st.wpos) as usize
    }

    pub(crate) fn reader_position(&self) -> PipePosition { self.st.borrow().rpos }

    pub(crate) fn writer_position(&self) -> PipePosition { self.st.borrow().wpos }

    fn can_allocate(&self) -> bool {
        let st = self.st.borrow();
        !st.closed && ((st.apos - st.rpos) as usize) < st.capacity
    }

    /// Waits for the state counter to move past `snapshot`.
    async fn changed(&self, snapshot: usize, timeout: Timeout) -> bool {
        wait_changed(&self.state, snapshot, timeout).await
    }

    pub(crate) async fn completed(&self, timeout: Timeout) -> bool {
        let timeout = timeout.make_absolute(now());
        while !self.is_completed() {
            let snapshot = self.state.get();
            if !self.changed(snapshot, timeout).await {
                break;
            }
        }
        self.is_completed()
    }

    // ------------------------------------------------------------------
    // Writer side.
    // ------------------------------------------------------------------

    /// Appends a fresh segment chosen by the allocator; returns its length,
    /// or 0 when the pipe is closed or the timeout elapses first. Suspends
    /// while the pipe is over its buffering bound or the allocator is out of
    /// memory.
    pub(crate) async fn writer_allocate(&self, hint: usize, timeout: Timeout) -> usize {
        let timeout = timeout.make_absolute(now());
        loop {
            if self.is_closed() {
                tracing::trace!(target: "pipe", "no allocation on closed pipe");
                return 0;
            }
            if self.can_allocate() {
                break;
            }
            tracing::trace!(target: "pipe", total = self.st.borrow().total, "writer throttling");
            let snapshot = self.state.get();
            if !self.changed(snapshot, timeout).await {
                return 0;
            }
        }

        let Some(seg) = self.allocator.allocate_segment(hint, timeout).await else {
            tracing::trace!(target: "pipe", "could not allocate new segment");
            return 0;
        };

        let len = seg.len();
        {
            let mut st = self.st.borrow_mut();
            debug_assert!(st.widx < st.segs.len() || st.woff == 0);
            st.segs.push_back(seg);
            st.apos += len;
        }
        self.state.bump();
        tracing::trace!(target: "pipe", len, "allocated segment");
        len
    }

    /// Commits `count` bytes written at the write cursor.
    pub(crate) fn writer_advance(&self, count: usize) {
        if count == 0 {
            return;
        }
        {
            let mut st = self.st.borrow_mut();
            assert!(st.widx < st.segs.len(), "advance without an allocated buffer");
            debug_assert!((st.apos - st.wpos) as usize >= count);
            st.woff += count;
            st.wpos += count;
            st.total += count as u64;
            while st.widx < st.segs.len() && st.woff >= st.segs[st.widx].len() {
                st.woff -= st.segs[st.widx].len();
                st.widx += 1;
            }
        }
        self.state.bump();
    }

    /// Copies `data` into the pipe, allocating as needed. Returns the byte
    /// count on success and the sign-encoded short count (`-written`) when
    /// the timeout elapses or the pipe closes under the writer.
    pub(crate) async fn writer_write(&self, data: &[u8], timeout: Timeout) -> isize {
        let timeout = timeout.make_absolute(now());
        let mut written = 0usize;
        while written < data.len() {
            let exhausted = {
                let st = self.st.borrow();
                st.wpos == st.apos
            };
            if exhausted && self.writer_allocate(data.len() - written, timeout).await == 0 {
                return -(written as isize);
            }

            let count = {
                let st = self.st.borrow();
                debug_assert!(st.widx < st.segs.len());
                let seg = &st.segs[st.widx];
                let count = (data.len() - written).min(seg.len() - st.woff);
                seg.write_at(st.woff, &data[written..written + count]);
                count
            };
            written += count;
            self.writer_advance(count);
        }
        written as isize
    }

    /// Formats directly into pipe buffers. Re-runs the formatting with the
    /// already-written prefix skipped whenever it runs out of allocated
    /// space, so nothing is staged in a side buffer.
    pub(crate) async fn writer_write_fmt(
        &self,
        args: std::fmt::Arguments<'_>,
        timeout: Timeout,
    ) -> isize {
        let timeout = timeout.make_absolute(now());
        let mut written = 0usize;
        loop {
            let exhausted = {
                let st = self.st.borrow();
                st.wpos == st.apos
            };
            if exhausted {
                let hint = 16.max(written / 2);
                if self.writer_allocate(hint, timeout).await == 0 {
                    return -(written as isize);
                }
            }

            let (length, wrote_now) = {
                let st = self.st.borrow();
                let mut sink = FmtSink {
                    skip: written,
                    length: 0,
                    seg_idx: st.widx,
                    seg_off: st.woff,
                    written_now: 0,
                    st: &*st,
                };
                let _infallible = std::fmt::write(&mut sink, args);
                (sink.length, sink.written_now)
            };
            self.writer_advance(wrote_now);
            written += wrote_now;
            if written >= length {
                return written as isize;
            }
        }
    }

    /// Injects a caller-built segment at the write cursor. A partially
    /// written tail segment is cut: its remainder is re-linked behind the
    /// inserted segment as a referenced split, or discarded when too small to
    /// be worth the bookkeeping.
    pub(crate) fn writer_insert(&self, seg: Rc<Segment>) {
        {
            let mut st = self.st.borrow_mut();
            assert!(!st.closed, "insert into a closed pipe");

            if st.woff > 0 {
                debug_assert!(st.widx + 1 >= st.segs.len(), "insert below allocated segments");
                let cur = st.segs[st.widx].clone();
                let remaining = cur.len() - st.woff;
                if remaining > 0 {
                    if remaining > SPLIT_MIN {
                        tracing::trace!(target: "pipe", remaining, "splitting current write segment");
                        let rest = Segment::referenced(cur.clone(), st.woff, remaining);
                        cur.set_len(st.woff);
                        let at = st.widx + 1;
                        st.segs.insert(at, rest);
                    } else {
                        tracing::trace!(target: "pipe", remaining, "discarding current write segment tail");
                        cur.set_len(st.woff);
                        st.apos -= remaining;
                    }
                }
                st.widx += 1;
                st.woff = 0;
            }

            let len = seg.len();
            let at = st.widx;
            st.segs.insert(at, seg);
            st.widx += 1;
            st.wpos += len;
            st.apos += len;
            st.total += len as u64;
            tracing::trace!(target: "pipe", len, "inserted segment");
        }
        self.state.bump();
    }

    /// Closes the pipe: trims the unwritten allocation so `wpos == apos`, and
    /// releases everything early when the pipe is already drained.
    pub(crate) fn writer_close(&self) {
        {
            let mut st = self.st.borrow_mut();
            if st.closed {
                return;
            }
            st.closed = true;
            if st.widx < st.segs.len() {
                if st.woff > 0 {
                    let cur = st.segs[st.widx].clone();
                    let extra = cur.len() - st.woff;
                    cur.set_len(st.woff);
                    st.apos -= extra;
                    st.widx += 1;
                }
                while st.segs.len() > st.widx {
                    let seg = st.segs.pop_back().expect("tail segment");
                    st.apos -= seg.len();
                }
            }
            st.woff = 0;
            tracing::trace!(target: "pipe", "pipe closed");
        }
        self.state.bump();
        if self.is_empty() {
            self.cleanup();
        }
    }

    /// Largest contiguous writable run at the write cursor.
    pub(crate) fn writer_buffer_len(&self) -> usize {
        let st = self.st.borrow();
        if st.widx < st.segs.len() {
            st.segs[st.widx].len() - st.woff
        } else {
            0
        }
    }

    /// Zero-copy write: hands the contiguous writable run to `fill` and
    /// commits however many bytes it reports.
    pub(crate) fn writer_write_in_place(&self, fill: impl FnOnce(&mut [u8]) -> usize) -> usize {
        let written = {
            let st = self.st.borrow();
            if st.widx >= st.segs.len() {
                return 0;
            }
            let seg = &st.segs[st.widx];
            seg.write_via(st.woff, seg.len() - st.woff, fill)
        };
        self.writer_advance(written);
        written
    }

    // ------------------------------------------------------------------
    // Reader side.
    // ------------------------------------------------------------------

    /// Suspends until at least `count` bytes are readable or the pipe closes;
    /// returns what is actually available.
    pub(crate) async fn reader_require(&self, count: usize, timeout: Timeout) -> usize {
        let timeout = timeout.make_absolute(now());
        loop {
            let (available, closed) = {
                let st = self.st.borrow();
                ((st.wpos - st.rpos) as usize, st.closed)
            };
            if available >= count || closed {
                return available;
            }
            let snapshot = self.state.get();
            if !self.changed(snapshot, timeout).await {
                return self.reader_available();
            }
        }
    }

    /// Suspends until byte `b` shows up; returns the length up to and
    /// including it, or 0 when the pipe closes without one.
    pub(crate) async fn reader_require_until(&self, b: u8, timeout: Timeout) -> usize {
        let timeout = timeout.make_absolute(now());
        let mut searched = 0usize;
        loop {
            let available = self.reader_available();
            if searched == available {
                let got = self.reader_require(available + 1, timeout).await;
                if got <= searched {
                    return 0;
                }
                continue;
            }

            let st = self.st.borrow();
            let mut offset = st.roff + searched;
            let mut idx = 0;
            while offset >= st.segs[idx].len() {
                offset -= st.segs[idx].len();
                idx += 1;
            }
            while searched < available {
                let seg = &st.segs[idx];
                let chunk = (seg.len() - offset).min(available - searched);
                let bytes = seg.read_slice(offset, chunk);
                if let Some(found) = bytes.iter().position(|&x| x == b) {
                    return searched + found + 1;
                }
                searched += chunk;
                idx += 1;
                offset = 0;
            }
        }
    }

    /// Releases `count` consumed bytes; fully consumed segments drop their
    /// reference (which runs their release hook).
    pub(crate) fn reader_advance(&self, count: usize) {
        if count == 0 {
            return;
        }
        {
            let mut st = self.st.borrow_mut();
            assert!((st.wpos - st.rpos) as usize >= count, "advance past written data");
            st.rpos += count;
            st.roff += count;
            loop {
                let len = match st.segs.front() {
                    Some(first) => first.len(),
                    None => break,
                };
                if st.roff < len {
                    break;
                }
                debug_assert!(st.widx > 0, "read cursor overran the write segment");
                let released = st.segs.pop_front().expect("front segment");
                st.roff -= len;
                st.widx -= 1;
                tracing::trace!(target: "pipe", len, "released segment");
                drop(released);
            }
            if st.segs.is_empty() {
                debug_assert_eq!(st.roff, 0);
                st.widx = 0;
                st.woff = 0;
            }
        }
        self.state.bump();
    }

    /// Copies up to `buf.len()` already-available bytes and consumes them.
    pub(crate) fn reader_read_into(&self, buf: &mut [u8]) -> usize {
        let count = {
            let st = self.st.borrow();
            let count = buf.len().min((st.wpos - st.rpos) as usize);
            let mut copied = 0;
            let mut offset = st.roff;
            let mut idx = 0;
            while copied < count {
                let seg = &st.segs[idx];
                let chunk = (seg.len() - offset).min(count - copied);
                buf[copied..copied + chunk].copy_from_slice(seg.read_slice(offset, chunk));
                copied += chunk;
                idx += 1;
                offset = 0;
            }
            count
        };
        self.reader_advance(count);
        count
    }

    /// Incremental require-and-copy until `buf` is full or the stream ends.
    pub(crate) async fn reader_read(&self, buf: &mut [u8], timeout: Timeout) -> usize {
        let timeout = timeout.make_absolute(now());
        let mut read = 0usize;
        while read < buf.len() {
            let mut available = self.reader_available();
            if available == 0 {
                let _available = self.reader_require(1, timeout).await;
                available = self.reader_available();
                if available == 0 {
                    break;
                }
            }
            let take = (buf.len() - read).min(available);
            read += self.reader_read_into(&mut buf[read..read + take]);
        }
        read
    }

    /// Non-consuming random access into the visible window.
    pub(crate) fn reader_peek(&self, offset: usize) -> Option<u8> {
        let st = self.st.borrow();
        if offset >= (st.wpos - st.rpos) as usize {
            return None;
        }
        let mut offset = st.roff + offset;
        for seg in &st.segs {
            if offset < seg.len() {
                return Some(seg.read_slice(offset, 1)[0]);
            }
            offset -= seg.len();
        }
        None
    }

    /// Non-consuming copy out of the visible window.
    pub(crate) fn reader_peek_into(&self, buf: &mut [u8], offset: usize) -> usize {
        let st = self.st.borrow();
        let available = (st.wpos - st.rpos) as usize;
        if offset >= available {
            return 0;
        }
        let count = buf.len().min(available - offset);
        let mut skipped = st.roff + offset;
        let mut copied = 0;
        for seg in &st.segs {
            if copied == count {
                break;
            }
            if skipped >= seg.len() {
                skipped -= seg.len();
                continue;
            }
            let chunk = (seg.len() - skipped).min(count - copied);
            buf[copied..copied + chunk].copy_from_slice(seg.read_slice(skipped, chunk));
            copied += chunk;
            skipped = 0;
        }
        count
    }

    /// Compares without consuming, chunk-at-a-time across segment boundaries.
    pub(crate) fn reader_matches(&self, data: &[u8], offset: usize) -> bool {
        let st = self.st.borrow();
        let available = (st.wpos - st.rpos) as usize;
        if offset + data.len() > available {
            return false;
        }
        let mut skipped = st.roff + offset;
        let mut matched = 0;
        for seg in &st.segs {
            if matched == data.len() {
                break;
            }
            if skipped >= seg.len() {
                skipped -= seg.len();
                continue;
            }
            let chunk = (seg.len() - skipped).min(data.len() - matched);
            if seg.read_slice(skipped, chunk) != &data[matched..matched + chunk] {
                return false;
            }
            matched += chunk;
            skipped = 0;
        }
        matched == data.len()
    }

    /// The segment and in-segment range holding the largest contiguous
    /// readable run starting `offset` bytes past the read cursor.
    pub(crate) fn reader_span_parts(&self, offset: usize) -> Option<(Rc<Segment>, usize, usize)> {
        let st = self.st.borrow();
        let available = (st.wpos - st.rpos) as usize;
        if offset >= available {
            return None;
        }
        let mut skipped = st.roff + offset;
        let remaining = available - offset;
        for seg in &st.segs {
            if skipped < seg.len() {
                let len = (seg.len() - skipped).min(remaining);
                return Some((seg.clone(), skipped, len));
            }
            skipped -= seg.len();
        }
        None
    }

    /// Snapshot of the readable window for iteration.
    pub(crate) fn reader_snapshot(&self) -> (Vec<Rc<Segment>>, usize, usize) {
        let st = self.st.borrow();
        (
            st.segs.iter().cloned().collect(),
            st.roff,
            (st.wpos - st.rpos) as usize,
        )
    }

    // ------------------------------------------------------------------
    // Lifecycle.
    // ------------------------------------------------------------------

    fn cleanup(&self) {
        let mut st = self.st.borrow_mut();
        tracing::trace!(target: "pipe", "cleanup");
        st.segs.clear();
        st.roff = 0;
        st.woff = 0;
        st.widx = 0;
        let wpos = st.wpos;
        st.rpos = wpos;
        st.apos = wpos;
    }

    fn reset(&self) {
        debug_assert!(
            self.reader_views.get() == 0 && self.writer_views.get() == 0,
            "pipe reset while reader or writer views are live"
        );
        self.cleanup();
        {
            let mut st = self.st.borrow_mut();
            st.rpos = PipePosition::ZERO;
            st.wpos = PipePosition::ZERO;
            st.apos = PipePosition::ZERO;
            st.closed = false;
            st.total = 0;
        }
        self.state.bump();
    }
}

/// Re-runs formatting into pipe segments, skipping the prefix written by
/// earlier rounds and counting the total length wanted.
struct FmtSink<'a> {
    st: &'a PipeState,
    skip: usize,
    length: usize,
    seg_idx: usize,
    seg_off: usize,
    written_now: usize,
}

impl FmtSink<'_> {
    fn push(&mut self, byte: u8) {
        self.length += 1;
        if self.length <= self.skip {
            return;
        }
        if self.seg_idx >= self.st.segs.len() {
            return;
        }
        let seg = &self.st.segs[self.seg_idx];
        seg.write_at(self.seg_off, &[byte]);
        self.seg_off += 1;
        self.written_now += 1;
        if self.seg_off >= seg.len() {
            self.seg_idx += 1;
            self.seg_off = 0;
        }
    }
}

impl std::fmt::Write for FmtSink<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        for &byte in s.as_bytes() {
            self.push(byte);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Pipe-to-pipe transfers.
// ----------------------------------------------------------------------

/// Inserts into `to` referenced segments spanning `[offset, offset + length)`
/// of `from`'s readable window, without consuming from `from` and without
/// copying a byte. Returns the byte count, or 0 when `to` closes or the
/// timeout elapses while throttled.
pub(crate) async fn copy_between(
    from: &PipeShared,
    to: &PipeShared,
    offset: usize,
    length: usize,
    timeout: Timeout,
) -> usize {
    let timeout = timeout.make_absolute(now());
    assert!(
        from.reader_available() >= offset + length,
        "copy range not yet readable"
    );

    let mut written = 0usize;
    while written < length {
        if !throttle_destination(to, timeout).await {
            tracing::trace!(target: "pipe", written, "copy stopping");
            return 0;
        }

        let seg = {
            let st = from.st.borrow();
            let mut skipped = st.roff + offset + written;
            let mut idx = 0;
            while skipped >= st.segs[idx].len() {
                skipped -= st.segs[idx].len();
                idx += 1;
            }
            let src = &st.segs[idx];
            let len = (length - written).min(src.len() - skipped);
            Segment::referenced(src.clone(), skipped, len)
        };
        written += seg.len();
        to.writer_insert(seg);
    }
    written
}

/// Moves `length` bytes from `from` into `to`. A head segment that starts at
/// the read cursor and fits entirely is handed over by reference; otherwise a
/// referenced sub-segment is created. The source cursor advances only after
/// the segment is inserted, so its refcount never dips.
pub(crate) async fn move_between(
    from: &PipeShared,
    to: &PipeShared,
    length: usize,
    timeout: Timeout,
) -> usize {
    let timeout = timeout.make_absolute(now());
    assert!(from.reader_available() >= length, "move range not yet readable");

    let mut written = 0usize;
    while written < length {
        if !throttle_destination(to, timeout).await {
            tracing::trace!(target: "pipe", written, "move stopping");
            return 0;
        }

        let (seg, consumed) = {
            let st = from.st.borrow();
            let first = st.segs.front().expect("source pipe has data").clone();
            if st.roff == 0 && first.len() < length - written {
                // The whole segment transfers; no new handle needed.
                debug_assert!(st.widx > 0);
                let len = first.len();
                (first, len)
            } else {
                let len = (length - written).min(first.len() - st.roff);
                (Segment::referenced(first, st.roff, len), len)
            }
        };
        to.writer_insert(seg);
        from.reader_advance(consumed);
        written += consumed;
    }
    written
}

/// Waits out the destination's buffering bound; `false` when the destination
/// closes or the timeout elapses.
async fn throttle_destination(to: &PipeShared, timeout: Timeout) -> bool {
    loop {
        if to.is_closed() {
            return false;
        }
        if to.can_allocate() {
            return true;
        }
        tracing::trace!(target: "pipe", total = to.st.borrow().total, "transfer throttling");
        let snapshot = to.state.get();
        if !to.changed(snapshot, timeout).await {
            return false;
        }
    }
}

// ----------------------------------------------------------------------
// Public pipe type.
// ----------------------------------------------------------------------

/// A zero-copy segmented byte pipe. Hand out I/O ends with [`Pipe::reader`]
/// and [`Pipe::writer`].
pub struct Pipe {
    pub(crate) shared: Rc<PipeShared>,
}

impl Pipe {
    /// A pipe on the default segment allocator, with an effectively unbounded
    /// buffering window.
    #[must_use]
    pub fn new() -> Self { Self::with_allocator(default_allocator()) }

    #[must_use]
    pub fn with_allocator(allocator: Rc<dyn PipeAllocator>) -> Self {
        Self {
            shared: PipeShared::new(allocator, usize::MAX),
        }
    }

    /// A pipe that throttles writers once `capacity` bytes are buffered.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            shared: PipeShared::new(default_allocator(), capacity),
        }
    }

    #[must_use]
    pub fn reader(&self) -> PipeReader { PipeReader::new(self.shared.clone()) }

    #[must_use]
    pub fn writer(&self) -> PipeWriter { PipeWriter::new(self.shared.clone()) }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.shared.is_empty() }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.is_closed() }

    /// Empty and closed: the terminal state of a drained stream.
    #[must_use]
    pub fn is_completed(&self) -> bool { self.shared.is_completed() }

    /// Bytes written but not yet read.
    #[must_use]
    pub fn unprocessed(&self) -> usize { self.shared.reader_available() }

    /// Suspends until the pipe is completed; `false` when the timeout elapses
    /// first.
    pub async fn completed(&self, timeout: Timeout) -> bool {
        self.shared.completed(timeout).await
    }

    /// Returns the pipe to its initial state. Calling this while any reader
    /// or writer view is live is a programmer error.
    pub fn reset(&self) { self.shared.reset(); }
}

impl Default for Pipe {
    fn default() -> Self { Self::new() }
}

impl Clone for Pipe {
    /// Another handle to the same pipe (not a new pipe).
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.shared.st.borrow();
        f.debug_struct("Pipe")
            .field("segments", &st.segs.len())
            .field("unprocessed", &(st.wpos - st.rpos))
            .field("closed", &st.closed)
            .finish()
    }
}
