// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Quill job queue.
//!
//! WAL-mode SQLite with embedded migrations, holding the job queue, final
//! assistant messages and the owner notification outbox.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
