// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Quill job queue.
//!
//! Exposes enqueue, status query, cancel, and a live NDJSON frame stream
//! that a client can reopen at any frame offset.

pub mod handlers;
pub mod server;
pub mod stream;

pub use server::{GatewayState, router, start_server};
