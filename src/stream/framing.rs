//! `data: <json>` frame decoding over an arbitrarily chunked byte stream.
//!
//! Bytes are buffered until a blank-line terminator arrives, so frames
//! split across reads (including mid UTF-8 sequence) decode exactly once.

use tracing::{trace, warn};

use super::events::StreamEvent;
use crate::types::PipelineError;

const DATA_PREFIX: &str = "data:";

/// Longest unterminated frame held in memory.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// `buf[..scanned]` is known to hold no terminator.
    scanned: usize,
    max_frame: usize,
    /// Dropping the remainder of an oversized frame.
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_frame,
            discarding: false,
        }
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Feed one chunk; returns every frame completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent, PipelineError>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            // a terminator may straddle the previous scan boundary
            let from = self.scanned.saturating_sub(3);
            let Some((offset, term_len)) = find_terminator(&self.buf[from..]) else {
                self.scanned = self.buf.len();
                break;
            };
            let end = from + offset;
            let block: Vec<u8> = self.buf.drain(..end + term_len).take(end).collect();
            self.scanned = 0;

            if std::mem::take(&mut self.discarding) {
                trace!(bytes = block.len(), "Dropped tail of oversized frame");
                continue;
            }
            if let Some(frame) = decode_block(&block) {
                out.push(frame);
            }
        }

        if self.buf.len() > self.max_frame {
            let keep = self.buf.len().min(3);
            self.buf.drain(..self.buf.len() - keep);
            self.scanned = self.buf.len();
            if !self.discarding {
                self.discarding = true;
                warn!(max_bytes = self.max_frame, "Frame too large, discarding");
                out.push(Err(PipelineError::ParseFailure(format!(
                    "frame exceeds {} bytes",
                    self.max_frame
                ))));
            }
        }
        out
    }

    /// Flush at end of stream: a leftover fragment is parsed once as a
    /// final frame.
    pub fn finish(&mut self) -> Option<Result<StreamEvent, PipelineError>> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) || rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        decode_block(&rest)
    }
}

/// Earliest `\n\n` or `\r\n\r\n`, as (offset, terminator length).
fn find_terminator(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Decode one block. Blocks without a data line are keep-alives or
/// comments and yield nothing.
fn decode_block(block: &[u8]) -> Option<Result<StreamEvent, PipelineError>> {
    let text = match std::str::from_utf8(block) {
        Ok(t) => t,
        Err(e) => return Some(Err(PipelineError::ParseFailure(format!("invalid UTF-8: {e}")))),
    };

    let mut data = text
        .lines()
        .filter_map(|l| l.trim_end_matches('\r').strip_prefix(DATA_PREFIX));

    let Some(payload) = data.next() else {
        trace!(block = text, "Skipping frame without data line");
        return None;
    };
    if data.next().is_some() {
        return Some(Err(PipelineError::ParseFailure(
            "frame carries more than one data line".to_string(),
        )));
    }

    let payload = payload.trim();
    Some(serde_json::from_str::<StreamEvent>(payload).map_err(|e| {
        let preview: String = payload.chars().take(120).collect();
        PipelineError::ParseFailure(format!("{e}: {preview}"))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(results: Vec<Result<StreamEvent, PipelineError>>) -> Vec<StreamEvent> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut d = FrameDecoder::new();
        let events = ok(d.push(
            b"data: {\"type\":\"status\",\"phase\":\"fetching_odds\",\"message\":\"x\"}\n\ndata: {\"type\":\"complete\"}\n\n",
        ));
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::Complete);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"data: {\"type\":\"com").is_empty());
        assert!(d.push(b"plete\"}\n").is_empty());
        let events = ok(d.push(b"\n"));
        assert_eq!(events, vec![StreamEvent::Complete]);
    }

    #[test]
    fn test_split_utf8_sequence_survives() {
        let frame = "data: {\"type\":\"error\",\"message\":\"caf\u{e9} \u{2212} down\"}\n\n".as_bytes();
        let cut = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut d = FrameDecoder::new();
        assert!(d.push(&frame[..cut]).is_empty());
        let events = ok(d.push(&frame[cut..]));
        assert!(matches!(&events[0], StreamEvent::Error { message, .. } if message == "caf\u{e9} \u{2212} down"));
    }

    #[test]
    fn test_crlf_terminator() {
        let mut d = FrameDecoder::new();
        let events = ok(d.push(b"data: {\"type\":\"complete\"}\r\n\r\n"));
        assert_eq!(events, vec![StreamEvent::Complete]);
    }

    #[test]
    fn test_keepalive_ignored_and_bad_json_reported() {
        let mut d = FrameDecoder::new();
        let out = d.push(b": keep-alive\n\ndata: {not json}\n\ndata: {\"type\":\"complete\"}\n\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(PipelineError::ParseFailure(_))));
        assert_eq!(out[1], Ok(StreamEvent::Complete));
    }

    #[test]
    fn test_two_data_lines_is_parse_failure() {
        let mut d = FrameDecoder::new();
        let out = d.push(b"data: {\"type\":\"complete\"}\ndata: {\"type\":\"complete\"}\n\n");
        assert!(matches!(out.as_slice(), [Err(PipelineError::ParseFailure(_))]));
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut d = FrameDecoder::new();
        let mut events = Vec::new();
        for b in b"data: {\"type\":\"complete\"}\r\n\r\n: ping\n\ndata: {\"type\":\"complete\"}\n\n" {
            events.extend(ok(d.push(&[*b])));
        }
        assert_eq!(events, vec![StreamEvent::Complete, StreamEvent::Complete]);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut d = FrameDecoder::with_max_frame(64);
        let big = format!("data: {{\"type\":\"error\",\"message\":\"{}\"}}", "x".repeat(200));
        let out = d.push(big.as_bytes());
        assert!(matches!(out.as_slice(), [Err(PipelineError::ParseFailure(_))]));
        assert!(d.pending() <= 3);

        // rest of the same frame is swallowed without a second error
        assert!(d.push(&[b'y'; 100]).is_empty());
        let out = d.push(b"\n\ndata: {\"type\":\"complete\"}\n\n");
        assert_eq!(ok(out), vec![StreamEvent::Complete]);
    }

    #[test]
    fn test_finish_parses_trailing_fragment_once() {
        let mut d = FrameDecoder::new();
        assert!(d.push(b"data: {\"type\":\"complete\"}").is_empty());
        assert_eq!(d.finish(), Some(Ok(StreamEvent::Complete)));
        assert_eq!(d.finish(), None);
    }
}
