//! Line reassembly over an arbitrarily fragmented byte stream.
//!
//! Upstream chunks carry no framing guarantee: one chunk may hold many lines,
//! none, or stop in the middle of a line (or of a multi-byte character). The
//! reassembler keeps the unterminated tail between chunks and only ever hands
//! out lines whose terminating `\n` has been seen.

use bytes::{Bytes, BytesMut};
use memchr::memchr;
use smallvec::SmallVec;

/// The only line terminator. `\r` is ordinary line content.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Complete lines split out of one chunk, terminator excluded.
pub type Lines = SmallVec<[Bytes; 8]>;

/// Incremental line splitter holding the pending tail of the stream.
#[derive(Debug, Default)]
pub struct LineReassembler {
    pending: BytesMut,
}

impl LineReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes, in order.
    ///
    /// The bytes after the last terminator become the new pending tail, which
    /// is empty when the chunk ended exactly on a terminator.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines {
        let mut lines = Lines::new();
        self.feed_into(chunk, &mut lines);
        lines
    }

    /// Feed one chunk and append completed lines into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Lines) {
        // Only the new bytes can hold a terminator; the pending tail never does.
        let mut search_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        while let Some(rel_pos) = memchr(LINE_TERMINATOR, &self.pending[search_from..]) {
            let line_len = search_from + rel_pos;
            let mut line = self.pending.split_to(line_len + 1);
            line.truncate(line_len);
            out.push(line.freeze());
            search_from = 0;
        }
    }

    /// The unterminated remainder after the last complete line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Drop the pending tail; it is never flushed as a line.
    pub fn discard(&mut self) {
        self.pending.clear();
    }
}

/// Functional form: `(pending, chunk) -> (complete lines, new pending)`.
#[must_use]
pub fn feed(pending: &[u8], chunk: &[u8]) -> (Lines, Bytes) {
    let mut reassembler = LineReassembler {
        pending: BytesMut::from(pending),
    };
    let lines = reassembler.feed(chunk);
    (lines, reassembler.pending.freeze())
}
