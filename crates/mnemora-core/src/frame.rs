//! Incremental `data:` frame decoder.
//!
//! Turns raw byte chunks, split at arbitrary offsets by the transport, into
//! complete decoded records. A single record may span several chunks and a
//! single chunk may carry any number of records; the output does not depend
//! on where the chunk boundaries fall.
//!
//! # Rules
//!
//! - Bytes are buffered until a `\n` arrives, so a multi-byte UTF-8
//!   sequence split across chunks is reassembled before decoding.
//! - A trailing `\r` is stripped from every line.
//! - Only lines starting with `data:` carry a record; one optional space
//!   after the marker is stripped. Blank separators, `:` comments and any
//!   other SSE field lines are discarded.
//! - A line that is not UTF-8 or does not parse as `T` is dropped with a
//!   warning. Decoding continues with the next line.
//! - [`FrameDecoder::finish`] discards a trailing line that never received
//!   its newline.
//!
//! ```rust
//! use mnemora_core::events::QueryEvent;
//! use mnemora_core::frame::FrameDecoder;
//!
//! let mut decoder = FrameDecoder::<QueryEvent>::new();
//! assert!(decoder.push(b"data: {\"type\":\"tok").is_empty());
//! let events = decoder.push(b"en\",\"content\":\"Hi\"}\n\n");
//! assert_eq!(events, vec![QueryEvent::Token { content: "Hi".into() }]);
//! assert_eq!(decoder.finish(), 0);
//! ```

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

/// Marker that prefixes every record line.
pub const DATA_MARKER: &[u8] = b"data:";

/// Single-use decoder bound to one stream.
pub struct FrameDecoder<T> {
    buffer: Vec<u8>,
    decoded: u64,
    dropped: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> FrameDecoder<T> {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            decoded: 0,
            dropped: 0,
            _marker: PhantomData,
        }
    }

    /// Feed one chunk and return every record completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<T> {
        let mut out = Vec::new();
        if chunk.is_empty() {
            return out;
        }

        // Only the new bytes can contain a newline we have not seen yet.
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer[scan_from..]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| scan_from + i)
        else {
            return out;
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        for line in complete.split(|&b| b == b'\n') {
            if let Some(record) = self.decode_line(line) {
                out.push(record);
            }
        }
        out
    }

    /// End of data. Returns the number of buffered bytes that were
    /// discarded because their line never terminated.
    pub fn finish(self) -> usize {
        let residual = self.buffer.len();
        if residual > 0 {
            tracing::debug!(bytes = residual, "discarding unterminated trailing frame");
        }
        residual
    }

    /// Records successfully decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.decoded
    }

    /// `data:` lines dropped because they failed to decode.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped
    }

    /// Bytes currently waiting for a newline.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<T> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let payload = line.strip_prefix(DATA_MARKER)?;
        let payload = payload.strip_prefix(b" ").unwrap_or(payload);

        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(error = %e, "dropping frame with invalid UTF-8");
                return None;
            }
        };

        match serde_json::from_str::<T>(text) {
            Ok(record) => {
                self.decoded += 1;
                Some(record)
            }
            Err(e) => {
                self.dropped += 1;
                tracing::warn!(error = %e, frame = %truncate(text, 120), "dropping malformed frame");
                None
            }
        }
    }
}

impl<T: DeserializeOwned> Default for FrameDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a complete body in one go. Equivalent to a single `push` of
/// the whole body followed by `finish`.
pub fn decode_all<T: DeserializeOwned>(body: &[u8]) -> Vec<T> {
    let mut decoder = FrameDecoder::new();
    let records = decoder.push(body);
    decoder.finish();
    records
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
