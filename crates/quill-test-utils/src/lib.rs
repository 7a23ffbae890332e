// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Quill integration tests.
//!
//! Scripted adapters and a temp-database harness for fast, deterministic
//! tests without a model endpoint.
//!
//! - [`MockGenerator`] - generation provider replaying scripted frame streams
//! - [`RecordingNotifier`] - notifier that keeps what it was asked to send
//! - [`TestHarness`] - SQLite queue in a temp dir wired to a [`quill_dispatch::Dispatcher`]

pub mod harness;
pub mod mock_generator;
pub mod recording_notifier;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_generator::{MockGenerator, Script};
pub use recording_notifier::RecordingNotifier;
