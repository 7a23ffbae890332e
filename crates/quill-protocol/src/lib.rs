// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame protocol codec for Quill generation streams.
//!
//! The wire format is newline-delimited JSON, one self-describing record per
//! line:
//!
//! ```text
//! {"type":"status","content":"analyzing"}
//! {"type":"text","content":"Hel"}
//! {"type":"text","content":"lo"}
//! ```
//!
//! Decoding is tolerant: a malformed line is dropped without losing frames
//! already decoded, and records with an unknown `type` are ignored.

pub mod accumulator;
pub mod decoder;
pub mod encoder;
pub mod stream;

pub use accumulator::FrameAccumulator;
pub use decoder::{FrameDecoder, decode_lines};
pub use encoder::{FrameEncoder, encode_frame, encode_frames};
pub use stream::decode_stream;
