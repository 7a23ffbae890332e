// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Buffering, tolerant frame decoder.
//!
//! Input is buffered bytewise until a `\n` is seen, so records and multi-byte
//! UTF-8 sequences split across transport chunks are reassembled before
//! parsing. A line that fails to parse is dropped and counted; decoding
//! carries on with the next line.

use std::str::FromStr;

use quill_core::{Frame, FrameKind};
use serde::Deserialize;
use tracing::debug;

/// Envelope read before dispatching on the frame kind.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: serde_json::Value,
}

enum Line {
    Blank,
    Frame(Frame),
    UnknownKind(String),
    Malformed(String),
}

/// Incremental decoder for newline-delimited frame records.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    skipped: usize,
    ignored: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(chunk);

        let buf = std::mem::take(&mut self.buf);
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            if let Some(frame) = self.record(parse_line(&buf[start..end])) {
                frames.push(frame);
            }
            start = end + 1;
        }
        self.buf = buf[start..].to_vec();
        frames
    }

    /// Flushes a trailing record that was not newline-terminated.
    ///
    /// Called at end of stream. A truncated trailing record is counted as
    /// skipped.
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.buf);
        self.record(parse_line(&rest)).into_iter().collect()
    }

    /// Malformed lines dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Well-formed records with an unrecognised `type`, dropped so far.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    /// Bytes held waiting for a line terminator.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn record(&mut self, line: Line) -> Option<Frame> {
        match line {
            Line::Blank => None,
            Line::Frame(frame) => Some(frame),
            Line::UnknownKind(kind) => {
                self.ignored += 1;
                debug!(kind = %kind, "ignoring frame with unknown type");
                None
            }
            Line::Malformed(reason) => {
                self.skipped += 1;
                debug!(reason = %reason, skipped = self.skipped, "dropping malformed frame");
                None
            }
        }
    }
}

fn parse_line(bytes: &[u8]) -> Line {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.trim(),
        Err(e) => return Line::Malformed(format!("invalid utf-8: {e}")),
    };
    if text.is_empty() {
        return Line::Blank;
    }

    let raw: RawRecord = match serde_json::from_str(text) {
        Ok(raw) => raw,
        Err(e) => return Line::Malformed(e.to_string()),
    };
    let kind = match FrameKind::from_str(&raw.kind) {
        Ok(kind) => kind,
        Err(_) => return Line::UnknownKind(raw.kind),
    };

    let decoded = match kind {
        FrameKind::Status => serde_json::from_value(raw.content).map(Frame::Status),
        FrameKind::Thinking => serde_json::from_value(raw.content).map(Frame::Thinking),
        FrameKind::Text => serde_json::from_value(raw.content).map(Frame::Text),
        FrameKind::Products => serde_json::from_value(raw.content).map(Frame::Products),
    };
    match decoded {
        Ok(frame) => Line::Frame(frame),
        Err(e) => Line::Malformed(format!("bad {kind} content: {e}")),
    }
}

/// Decodes a complete blob of protocol lines.
pub fn decode_lines(raw: &str) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = decoder.push(raw.as_bytes());
    frames.extend(decoder.finish());
    frames
}
