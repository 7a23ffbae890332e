// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellation tokens of jobs running in this process.

use dashmap::DashMap;
use quill_core::JobId;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: DashMap<JobId, CancellationToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the token a job runs under, replacing any stale entry.
    pub fn register(&self, job_id: &JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(job_id.clone(), token.clone());
        token
    }

    /// Trips the local token. Returns `false` if the job is not running here.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.tokens.get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, job_id: &JobId) {
        self.tokens.remove(job_id);
    }

    /// Trips every registered token.
    pub fn cancel_all(&self) {
        for entry in self.tokens.iter() {
            entry.value().cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_trips_registered_token() {
        let registry = CancelRegistry::new();
        let token = registry.register(&"j-1".into());
        assert!(registry.cancel(&"j-1".into()));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unknown_job_is_false() {
        let registry = CancelRegistry::new();
        assert!(!registry.cancel(&"nope".into()));
    }

    #[test]
    fn removed_job_is_forgotten() {
        let registry = CancelRegistry::new();
        let token = registry.register(&"j-1".into());
        registry.remove(&"j-1".into());
        assert!(registry.is_empty());
        assert!(!registry.cancel(&"j-1".into()));
        assert!(!token.is_cancelled());
    }
}
