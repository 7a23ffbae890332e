// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP adapters for Quill.
//!
//! - [`HttpGenerator`] posts a job to a generation endpoint and decodes the
//!   NDJSON frame stream it answers with.
//! - [`HttpFrameSource`] reopens a job's live stream on a Quill gateway at a
//!   frame offset, for the resumable reader.
//! - [`HttpEnricher`] resolves `context_refs` against a lookup service.

pub mod client;
pub mod enricher;
pub mod generator;
pub mod source;

pub use enricher::HttpEnricher;
pub use generator::HttpGenerator;
pub use source::HttpFrameSource;
