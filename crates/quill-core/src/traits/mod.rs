// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Storage, generation, and checkpoint backends are pluggable behind these
//! traits and use `#[async_trait]` so they can be held as trait objects.

pub mod adapter;
pub mod checkpoint;
pub mod enrich;
pub mod generator;
pub mod queue;
pub mod sink;

pub use adapter::PluginAdapter;
pub use checkpoint::CheckpointStore;
pub use enrich::ContextEnricher;
pub use generator::{FrameStream, GenerationProvider};
pub use queue::JobQueue;
pub use sink::{MessageSink, Notifier};
