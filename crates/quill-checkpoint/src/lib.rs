// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side checkpoints for Quill generation streams.
//!
//! A reader applies live frames to visible state and periodically saves a
//! [`quill_core::Checkpoint`]. After a reload or dropped connection the
//! [`ResumableReader`] restores that state and reopens the stream at the
//! saved frame offset instead of starting over.

pub mod manager;
pub mod memory;
pub mod reader;
pub mod sqlite;

pub use manager::{CheckpointManager, DEFAULT_FLUSH_EVERY, DEFAULT_TTL, RecoveredState};
pub use memory::MemoryCheckpointStore;
pub use reader::{
    DEFAULT_RENDER_INTERVAL, FrameSource, OpenedStream, ReaderObserver, ReaderOutcome, ReaderReport,
    ReaderTarget, ResumableReader,
};
pub use sqlite::SqliteCheckpointStore;
