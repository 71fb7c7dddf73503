// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Pipe behavior end to end: framing, close semantics, zero-copy transfers,
//! allocator backpressure, and in-place writes.

use std::{cell::{Cell, RefCell},
          rc::Rc};

use coros_kernel::{DefaultPipeAllocator, Pipe, Segment, Timeout, delay_ms,
                   test_fixtures::{SequenceRecorder, VirtualPlatform}, yield_now};
use pretty_assertions::assert_eq;

#[test]
fn test_simple_write_then_read() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let r = pipe.reader();
    scheduler.add(async move {
        let n = r.require(1, Timeout::INFINITE).await;
        assert_eq!(n, 4);
        assert_eq!(r.available(), 4);
        assert!(r.is_complete());
        assert!(r.matches(b"TEST", 0));
        r.advance(n);
    });
    let w = pipe.writer();
    scheduler.add(async move {
        assert_eq!(w.write(b"TEST", Timeout::INFINITE).await, 4);
        w.close();
    });
    scheduler.run();

    assert!(pipe.is_completed());
}

#[test]
fn test_incremental_writes_accumulate() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let r = pipe.reader();
    scheduler.add(async move {
        let n = r.require(1, Timeout::INFINITE).await;
        assert_eq!(n, 2);
        assert!(!r.is_complete());
        assert!(r.matches(b"TE", 0));
        let n = r.require(3, Timeout::INFINITE).await;
        assert_eq!(n, 4);
        assert!(r.is_complete());
        assert!(r.matches(b"TEST", 0));
        r.advance(n);
    });
    let w = pipe.writer();
    scheduler.add(async move {
        w.write(b"TE", Timeout::INFINITE).await;
        yield_now().await;
        w.write(b"ST", Timeout::INFINITE).await;
        w.close();
    });
    scheduler.run();

    assert!(pipe.is_completed());
}

#[test]
fn test_require_until_frames_lines() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let r = pipe.reader();
    scheduler.add(async move {
        let n = r.require_until(b'\n', Timeout::INFINITE).await;
        assert_eq!(n, 7);
        assert!(r.matches(b"Line 1\n", 0));
        r.advance(n);

        // No separator before close: 0, with the tail still readable.
        let n = r.require_until(b'\n', Timeout::INFINITE).await;
        assert_eq!(n, 0);
        assert!(r.is_complete());
        assert_eq!(r.available(), 6);
        assert!(r.matches(b"Line 2", 0));
        r.advance(6);
    });
    let w = pipe.writer();
    scheduler.add(async move {
        w.write(b"Line 1\nLine 2", Timeout::INFINITE).await;
        w.close();
    });
    scheduler.run();

    assert!(pipe.is_completed());
}

#[test]
fn test_copy_reorders_without_touching_payload() {
    let scheduler = VirtualPlatform::scheduler();
    let src = Pipe::new();
    let dst = Pipe::new();

    let r = dst.reader();
    scheduler.add(async move {
        let n = r.require_until(b'\n', Timeout::INFINITE).await;
        assert_eq!(n, 7);
        assert!(r.matches(b"Line 2\n", 0));
        r.advance(n);
        let n = r.require_until(b'\n', Timeout::INFINITE).await;
        assert_eq!(n, 0);
        assert!(r.is_complete());
        assert_eq!(r.available(), 6);
        assert!(r.matches(b"Line 1", 0));
        r.advance(6);
    });
    let w = src.writer();
    scheduler.add(async move {
        w.write(b"Line 1\nLine 2", Timeout::INFINITE).await;
        w.close();
    });
    let (from, to) = (src.reader(), dst.writer());
    scheduler.add(async move {
        let n = from.require(1, Timeout::INFINITE).await;
        assert_eq!(n, 13);
        // Mix things up for fun.
        assert_eq!(from.copy_to(&to, 7, 6, Timeout::INFINITE).await, 6);
        assert_eq!(from.copy_to(&to, 6, 1, Timeout::INFINITE).await, 1);
        assert_eq!(from.copy_to(&to, 0, 6, Timeout::INFINITE).await, 6);
        to.close();
        from.advance(13);
    });
    scheduler.run();

    assert!(src.is_completed());
    assert!(dst.is_completed());
}

#[test]
fn test_copy_aliases_source_bytes() {
    let scheduler = VirtualPlatform::scheduler();
    let src = Pipe::new();
    let dst = Pipe::new();

    let (w, from, to, peek) = (src.writer(), src.reader(), dst.writer(), dst.reader());
    scheduler.add(async move {
        w.write(b"Line 1\nLine 2", Timeout::INFINITE).await;
        let src_ptr = from.span(7).as_ptr();
        assert_eq!(from.copy_to(&to, 7, 6, Timeout::INFINITE).await, 6);

        let span = peek.span(0);
        assert_eq!(&*span, b"Line 2");
        // Zero-copy: the destination window is the source's bytes.
        assert_eq!(span.as_ptr(), src_ptr);
    });
    scheduler.run();
}

#[test]
fn test_move_transfers_ownership_without_copying() {
    let scheduler = VirtualPlatform::scheduler();
    let src = Pipe::new();
    let dst = Pipe::new();

    let r = dst.reader();
    scheduler.add(async move {
        let n = r.require_until(b'\n', Timeout::INFINITE).await;
        assert_eq!(n, 7);
        assert!(r.matches(b"Line 1\n", 0));
        r.advance(n);
        let n = r.require_until(b'\n', Timeout::INFINITE).await;
        assert_eq!(n, 0);
        assert_eq!(r.available(), 6);
        assert!(r.matches(b"Line 2", 0));
        r.advance(6);
    });
    let w = src.writer();
    scheduler.add(async move {
        w.write(b"Line 1\nLine 2", Timeout::INFINITE).await;
        w.close();
    });
    let (from, to, peek) = (src.reader(), dst.writer(), dst.reader());
    scheduler.add(async move {
        let n = from.require(1, Timeout::INFINITE).await;
        assert_eq!(n, 13);
        let src_before = from.position();
        let dst_before = to.position();
        let src_ptr = from.span(0).as_ptr();

        assert_eq!(from.move_to(&to, 13, Timeout::INFINITE).await, 13);

        // Both cursors advanced by the moved length...
        assert_eq!(src_before.length_until(from.position()), 13);
        assert_eq!(dst_before.length_until(to.position()), 13);
        // ...and the destination window aliases the original bytes.
        assert_eq!(peek.span(0).as_ptr(), src_ptr);
        to.close();
    });
    scheduler.run();

    assert!(src.is_completed());
    assert!(dst.is_completed());
}

const CHUNKS: &[&[u8]] = &[b"alpha ", b"beta ", b"gamma ", b"delta"];

#[test]
fn test_byte_conservation_across_many_writes() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();
    let expected: Vec<u8> = CHUNKS.concat();

    let w = pipe.writer();
    scheduler.add(async move {
        for chunk in CHUNKS {
            w.write(chunk, Timeout::INFINITE).await;
            yield_now().await;
        }
        w.close();
    });
    let r = pipe.reader();
    let collected: Rc<RefCell<Vec<u8>>> = Rc::default();
    let sink = collected.clone();
    scheduler.add(async move {
        let mut buf = [0u8; 7];
        loop {
            let n = r.read(&mut buf, Timeout::INFINITE).await;
            if n == 0 {
                break;
            }
            sink.borrow_mut().extend_from_slice(&buf[..n]);
        }
        assert!(r.is_complete());
        assert_eq!(r.available(), 0);
    });
    scheduler.run();

    assert_eq!(*collected.borrow(), expected);
    assert!(pipe.is_completed());
}

/// Run with `RUST_LOG`-style filtering to watch the pipe trace output.
fn init_tracing() {
    let _already_set = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_exhausted_pool_backpressures_the_writer() {
    init_tracing();
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::with_allocator(DefaultPipeAllocator::bounded(1));
    let recorder = SequenceRecorder::new();
    let payload = [0x5Au8; 200];

    let (w, r) = (pipe.writer(), recorder.clone());
    scheduler.add(async move {
        assert_eq!(w.write(&payload, Timeout::INFINITE).await, 200);
        r.mark('w');
        // The single 256-byte block fills after 56 more bytes; the rest
        // waits for the reader to release it.
        assert_eq!(w.write(&payload, Timeout::INFINITE).await, 200);
        r.mark('W');
        w.close();
    });
    let (reader, r) = (pipe.reader(), recorder.clone());
    scheduler.add(async move {
        delay_ms(5).await;
        r.mark('r');
        let mut buf = vec![0u8; 400];
        let n = reader.read(&mut buf, Timeout::INFINITE).await;
        assert_eq!(n, 400);
        assert!(buf.iter().all(|&b| b == 0x5A));
    });
    scheduler.run();

    // The second write could only finish after the reader drained a block.
    assert_eq!(recorder.take(), "w@0,r@5,W@5");
    assert!(pipe.is_completed());
}

#[test]
fn test_write_timeout_reports_sign_encoded_short_count() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::with_allocator(DefaultPipeAllocator::bounded(1));
    let payload = [1u8; 200];

    let w = pipe.writer();
    scheduler.add(async move {
        assert_eq!(w.write(&payload, Timeout::INFINITE).await, 200);
        // 56 bytes still fit in the block; the rest times out with nobody
        // reading.
        assert_eq!(w.write(&payload, Timeout::millis(5)).await, -56);
    });
    scheduler.run();
}

#[test]
fn test_write_on_closed_pipe_short_writes_zero() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();
    pipe.writer().close();

    let w = pipe.writer();
    scheduler.add(async move {
        assert_eq!(w.allocate(16, Timeout::INFINITE).await, 0);
        assert_eq!(w.write(b"late", Timeout::INFINITE).await, 0);
    });
    scheduler.run();
    assert!(pipe.is_completed());
}

#[test]
fn test_require_timeout_returns_short() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let r = pipe.reader();
    let probe = scheduler.clone();
    scheduler.add(async move {
        let start = probe.time();
        let n = r.require(5, Timeout::millis(5)).await;
        assert_eq!(n, 0);
        assert!(probe.time() - start >= 5_000);
    });
    scheduler.run();
}

#[test]
fn test_completed_await_and_timeout() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();
    let done = Rc::new(Cell::new(false));

    let (w, r) = (pipe.writer(), pipe.reader());
    scheduler.add(async move {
        w.write(b"xy", Timeout::INFINITE).await;
        delay_ms(10).await;
        r.advance(2);
        w.close();
    });
    let observer = pipe.clone();
    let flag = done.clone();
    scheduler.add(async move {
        // Not completed yet at 5 ms.
        assert!(!observer.completed(Timeout::millis(5)).await);
        assert!(observer.completed(Timeout::INFINITE).await);
        flag.set(true);
    });
    scheduler.run();
    assert!(done.get());
}

#[test]
fn test_peek_span_and_iteration() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let (w, r) = (pipe.writer(), pipe.reader());
    scheduler.add(async move {
        w.write(b"abcdef", Timeout::INFINITE).await;

        assert_eq!(r.peek(0), Some(b'a'));
        assert_eq!(r.peek(2), Some(b'c'));
        assert_eq!(r.peek(6), None);

        let mut head = [0u8; 3];
        assert_eq!(r.peek_into(&mut head, 1), 3);
        assert_eq!(&head, b"bcd");

        assert_eq!(&*r.span(1), b"bcdef");
        let collected: Vec<u8> = r.iter().collect();
        assert_eq!(collected, b"abcdef");
        // Nothing consumed by any of the above.
        assert_eq!(r.available(), 6);
    });
    scheduler.run();
}

#[test]
fn test_insert_splits_a_partially_written_segment() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let (w, r) = (pipe.writer(), pipe.reader());
    scheduler.add(async move {
        // A big segment, partially written, forces the split path.
        assert!(w.allocate(100, Timeout::INFINITE).await >= 100);
        w.write(b"AB", Timeout::INFINITE).await;
        w.insert(Segment::from_vec(b"XY".to_vec()));
        w.write(b"CD", Timeout::INFINITE).await;
        w.close();

        assert_eq!(r.available(), 6);
        assert!(r.matches(b"ABXYCD", 0));
        r.advance(6);
    });
    scheduler.run();
    assert!(pipe.is_completed());
}

#[test]
fn test_write_in_place_commits_through_advance() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let (w, r) = (pipe.writer(), pipe.reader());
    scheduler.add(async move {
        assert_eq!(w.allocate(32, Timeout::INFINITE).await, 32);
        assert_eq!(w.buffer_len(), 32);
        let n = w.write_in_place(|buf| {
            buf[..5].copy_from_slice(b"hello");
            5
        });
        assert_eq!(n, 5);
        assert_eq!(w.available(), 27);
        assert!(r.matches(b"hello", 0));
    });
    scheduler.run();
}

#[test]
fn test_write_fmt_formats_into_segments() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    let (w, r) = (pipe.writer(), pipe.reader());
    scheduler.add(async move {
        let n = w
            .write_fmt(format_args!("Line {}\n", 1), Timeout::INFINITE)
            .await;
        assert_eq!(n, 7);
        assert!(r.matches(b"Line 1\n", 0));

        // Long enough to span several pooled segments.
        let long = "x".repeat(500);
        let n = w
            .write_fmt(format_args!("{long}!"), Timeout::INFINITE)
            .await;
        assert_eq!(n, 501);
        r.advance(7);
        assert_eq!(r.available(), 501);
        let tail: Vec<u8> = r.iter().collect();
        assert!(tail[..500].iter().all(|&b| b == b'x'));
        assert_eq!(tail[500], b'!');
    });
    scheduler.run();
}

#[test]
fn test_reset_returns_pipe_to_initial_state() {
    let scheduler = VirtualPlatform::scheduler();
    let pipe = Pipe::new();

    {
        let (w, r) = (pipe.writer(), pipe.reader());
        scheduler.add(async move {
            w.write(b"scrap", Timeout::INFINITE).await;
            r.advance(3);
            w.close();
        });
        scheduler.run();
    }

    // All views are gone; the pipe may be reused.
    pipe.reset();
    assert!(pipe.is_empty());
    assert!(!pipe.is_closed());

    let (w, r) = (pipe.writer(), pipe.reader());
    scheduler.add(async move {
        w.write(b"fresh", Timeout::INFINITE).await;
        assert!(r.matches(b"fresh", 0));
        r.advance(5);
        w.close();
    });
    scheduler.run();
    assert!(pipe.is_completed());
}
