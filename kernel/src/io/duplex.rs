// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! A bidirectional endpoint over two pipes.

use super::{pipe::Pipe, reader::PipeReader, writer::PipeWriter};

/// One end of a bidirectional byte channel: reads from one pipe, writes the
/// other. [`DuplexPipe::pair`] builds the two crossed ends.
#[derive(Debug, Clone)]
pub struct DuplexPipe {
    reader: PipeReader,
    writer: PipeWriter,
}

impl DuplexPipe {
    #[must_use]
    pub fn new(reader: PipeReader, writer: PipeWriter) -> Self { Self { reader, writer } }

    /// Two pipes crossed into a connected pair of endpoints, like a socket
    /// pair. Each returned value also carries the backing [`Pipe`]s so the
    /// caller can observe completion.
    #[must_use]
    pub fn pair() -> ((DuplexPipe, DuplexPipe), (Pipe, Pipe)) {
        let a_to_b = Pipe::new();
        let b_to_a = Pipe::new();
        let a = DuplexPipe::new(b_to_a.reader(), a_to_b.writer());
        let b = DuplexPipe::new(a_to_b.reader(), b_to_a.writer());
        ((a, b), (a_to_b, b_to_a))
    }

    #[must_use]
    pub fn reader(&self) -> &PipeReader { &self.reader }

    #[must_use]
    pub fn writer(&self) -> &PipeWriter { &self.writer }

    /// Closes the outgoing side.
    pub fn close(&self) { self.writer.close(); }
}
