// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notifier that records deliveries for assertions.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use quill_core::{JobId, Notification, NotificationKind, Notifier, QuillError};

/// Keeps every delivered notification, at most one per (job, kind).
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_job(&self, job_id: &JobId) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| &n.job_id == job_id)
            .collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.notifications()
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<bool, QuillError> {
        let mut delivered = self
            .delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let duplicate = delivered
            .iter()
            .any(|n| n.job_id == notification.job_id && n.kind == notification.kind);
        if duplicate {
            return Ok(false);
        }
        delivered.push(notification.clone());
        Ok(true)
    }
}
