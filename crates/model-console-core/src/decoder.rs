//! Incremental decoding of the chat byte stream into frames.
//!
//! Bytes arrive in arbitrary chunks. [`Utf8Decoder`] carries an incomplete
//! multi-byte sequence over to the next chunk, and [`FrameDecoder`] keeps the
//! unterminated tail of the text until its newline arrives. A chunk boundary
//! can therefore fall anywhere, including inside a character, without changing
//! the frames that come out.

use crate::frame::{Frame, Rejected};

/// SSE-style prefix stripped from a record before parsing.
pub const DATA_PREFIX: &str = "data: ";

/// Stateful UTF-8 decoder.
///
/// Invalid sequences become U+FFFD. A truncated sequence at the end of a
/// chunk is held back until more bytes arrive.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk` and append the text to `out`.
    pub fn decode(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(
                        std::str::from_utf8(&self.pending[start..valid_end]).unwrap_or_default(),
                    );
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        // Truncated sequence: wait for the rest of it.
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
    }

    /// Number of bytes waiting for the rest of their character.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Splits a chunked byte stream into [`Frame`]s.
///
/// Feed chunks with [`push`](Self::push) and pull frames with
/// [`next_frame`](Self::next_frame), or do both at once with
/// [`decode`](Self::decode). Records that are blank, not JSON, or of an
/// unknown kind are dropped and never abort decoding.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    /// Byte offset of the first line in `buffer` not yet handed out.
    consumed: usize,
}

impl FrameDecoder {
    /// Create a decoder for a new stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of the response body.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.consumed > 0 {
            self.buffer.drain(..self.consumed);
            self.consumed = 0;
        }
        self.utf8.decode(chunk, &mut self.buffer);
    }

    /// Next frame from the complete lines buffered so far.
    ///
    /// Returns `None` once only an unterminated fragment remains.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let rest = &self.buffer[self.consumed..];
            let newline = rest.find('\n')?;
            let line_end = self.consumed + newline;
            let frame = decode_record(&self.buffer[self.consumed..line_end]);
            self.consumed = line_end + 1;
            if frame.is_some() {
                return frame;
            }
        }
    }

    /// Push `chunk` and iterate over the frames it completes.
    pub fn decode(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.push(chunk);
        Frames { decoder: self }
    }

    /// Text received but not yet terminated by a newline.
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.buffer[self.consumed..]
    }

    /// End of stream. Any unterminated fragment is discarded.
    pub fn finish(self) {
        let remainder = self.remainder();
        if !remainder.trim().is_empty() || self.utf8.pending_len() > 0 {
            tracing::debug!(
                fragment_len = remainder.len(),
                pending_bytes = self.utf8.pending_len(),
                "Discarding unterminated tail of chat stream"
            );
        }
    }
}

/// Iterator over the frames completed by one chunk.
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.next_frame()
    }
}

/// Turn one line of the stream into a frame, or drop it.
fn decode_record(line: &str) -> Option<Frame> {
    let record = line.trim();
    if record.is_empty() {
        return None;
    }

    let payload = record.strip_prefix(DATA_PREFIX).map_or(record, str::trim);
    if payload.is_empty() {
        return None;
    }

    match Frame::parse(payload) {
        Ok(frame) => Some(frame),
        Err(Rejected::Malformed(error)) => {
            tracing::warn!(record = %payload, error = %error, "Dropping malformed chat frame");
            None
        }
        Err(Rejected::UnknownKind(kind)) => {
            tracing::debug!(kind = ?kind, "Ignoring chat frame of unknown kind");
            None
        }
    }
}
