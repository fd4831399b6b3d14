use std::{cmp, io};

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

/// Longest accepted request line.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// One unit handed out by [`LineCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its terminator. Bytes that are not UTF-8 are replaced with
    /// U+FFFD so the request decoder can still report them.
    Line(String),
    /// A line longer than the limit was skipped up to and including its terminator.
    Oversized(usize),
}

/// Newline framing for request lines.
///
/// Lines are handed out only once their terminator arrives. A line over the length limit is
/// discarded and reported as [`Frame::Oversized`]; reading carries on with the next line.
/// Bytes left without a terminator when the stream ends are dropped.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
    /// Where to resume the newline scan in the buffer.
    next_index: usize,
    /// Bytes thrown away so far from an oversized line.
    discarding: Option<usize>,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: None,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn line_text(mut line: &[u8]) -> String {
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }
    String::from_utf8_lossy(line).into_owned()
}

impl Decoder for LineCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            let read_to = cmp::min(self.max_length.saturating_add(1), buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (Some(discarded), Some(at)) => {
                    buf.advance(at + 1);
                    self.discarding = None;
                    self.next_index = 0;
                    return Ok(Some(Frame::Oversized(discarded + at)));
                }
                (Some(discarded), None) => {
                    buf.advance(read_to);
                    self.discarding = Some(discarded + read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (None, Some(at)) => {
                    let line = buf.split_to(at + 1);
                    self.next_index = 0;
                    return Ok(Some(Frame::Line(line_text(&line[..at]))));
                }
                (None, None) if buf.len() > self.max_length => {
                    self.discarding = Some(0);
                    self.next_index = 0;
                }
                (None, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if !buf.is_empty() || self.discarding.is_some() {
            debug!(bytes = buf.len(), "dropping unterminated frame at end of stream");
            buf.clear();
        }
        self.next_index = 0;
        self.discarding = None;
        Ok(None)
    }
}
