// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapts a byte stream into an ordered frame stream.

use std::collections::VecDeque;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use quill_core::{Frame, FrameStream, QuillError};
use tracing::debug;

use crate::decoder::FrameDecoder;

struct DecodeState<S> {
    input: Pin<Box<S>>,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    finished: bool,
}

/// Decodes frames from a chunked byte stream (e.g. an HTTP response body).
///
/// Frames are yielded in write order regardless of chunk boundaries. A
/// transport error is forwarded once as [`QuillError::Generation`] and ends
/// the stream.
pub fn decode_stream<S, B, E>(input: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = DecodeState {
        input: Box::pin(input),
        decoder: FrameDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.pending.pop_front() {
                return Some((Ok(frame), st));
            }
            if st.finished {
                return None;
            }
            match st.input.next().await {
                Some(Ok(chunk)) => {
                    let frames = st.decoder.push(chunk.as_ref());
                    st.pending.extend(frames);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((
                        Err(QuillError::Generation {
                            message: format!("frame transport error: {e}"),
                            source: Some(Box::new(e)),
                        }),
                        st,
                    ));
                }
                None => {
                    st.finished = true;
                    let tail = st.decoder.finish();
                    st.pending.extend(tail);
                    debug!(
                        skipped = st.decoder.skipped(),
                        ignored = st.decoder.ignored(),
                        "frame stream ended"
                    );
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn chunks(parts: &[&str]) -> Vec<Result<Vec<u8>, std::io::Error>> {
        parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect()
    }

    #[tokio::test]
    async fn frames_arrive_in_order_across_chunks() {
        let input = stream::iter(chunks(&[
            "{\"type\":\"text\",\"content\":\"Hel\"}\n{\"type\":\"te",
            "xt\",\"content\":\"lo\"}",
            "\n{\"type\":\"thinking\",\"content\":\"done\"}",
        ]));
        let frames: Vec<Frame> = decode_stream(input)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            frames,
            vec![Frame::text("Hel"), Frame::text("lo"), Frame::thinking("done")]
        );
    }

    #[tokio::test]
    async fn transport_error_is_forwarded_after_decoded_frames() {
        let input = stream::iter(vec![
            Ok(b"{\"type\":\"text\",\"content\":\"a\"}\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
            Ok(b"{\"type\":\"text\",\"content\":\"never\"}\n".to_vec()),
        ]);
        let items: Vec<Result<Frame, QuillError>> = decode_stream(input).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Frame::text("a"));
        let err = items[1].as_ref().unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("connection reset"));
    }
}
