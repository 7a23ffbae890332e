// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame encoding.

use quill_core::{Frame, QuillError};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encodes one frame as a complete newline-terminated record.
pub fn encode_frame(frame: &Frame) -> Result<String, QuillError> {
    let mut line = serde_json::to_string(frame).map_err(|e| QuillError::Protocol {
        message: format!("failed to encode {} frame: {e}", frame.kind()),
    })?;
    line.push('\n');
    Ok(line)
}

/// Encodes a sequence of frames into one blob, in order.
pub fn encode_frames<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> Result<String, QuillError> {
    let mut out = String::new();
    for frame in frames {
        out.push_str(&encode_frame(frame)?);
    }
    Ok(out)
}

/// Writes whole records to an async sink, flushing after each one.
pub struct FrameEncoder<W> {
    writer: W,
    frames_written: u64,
}

impl<W: AsyncWrite + Unpin> FrameEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            frames_written: 0,
        }
    }

    /// Writes a single record with one `write_all` and flushes it.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), QuillError> {
        let line = encode_frame(frame)?;
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| QuillError::Protocol {
                message: format!("failed to write frame: {e}"),
            })?;
        self.writer.flush().await.map_err(|e| QuillError::Protocol {
            message: format!("failed to flush frame: {e}"),
        })?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::GenerationStatus;

    #[test]
    fn each_record_ends_with_exactly_one_newline() {
        let line = encode_frame(&Frame::text("line one\nline two")).unwrap();
        assert!(line.ends_with('\n'));
        // Embedded newlines are escaped, so the record is still one line.
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn encode_frames_preserves_order() {
        let frames = vec![
            Frame::Status(GenerationStatus::Generating),
            Frame::text("a"),
            Frame::text("b"),
        ];
        let blob = encode_frames(&frames).unwrap();
        let lines: Vec<&str> = blob.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(r#""content":"a""#));
        assert!(lines[2].contains(r#""content":"b""#));
    }

    #[tokio::test]
    async fn encoder_writes_complete_records() {
        let mut encoder = FrameEncoder::new(Vec::new());
        encoder.write_frame(&Frame::thinking("hmm")).await.unwrap();
        encoder.write_frame(&Frame::text("ok")).await.unwrap();
        assert_eq!(encoder.frames_written(), 2);

        let written = String::from_utf8(encoder.into_inner()).unwrap();
        assert_eq!(
            written,
            "{\"type\":\"thinking\",\"content\":\"hmm\"}\n{\"type\":\"text\",\"content\":\"ok\"}\n"
        );
    }
}
