// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Quill generation pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelt key is
//! rejected at startup instead of silently falling back to a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Quill configuration.
///
/// Every section is optional and defaults to values suitable for a single
/// local process.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuillConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Job database settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dispatcher pool and retry settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Upstream generation endpoint.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Client-side checkpoint settings used by `quill tail`.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// HTTP API settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Context enrichment settings.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name reported by the health endpoint.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "quill".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite job database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the database file. Several dispatcher processes may share it.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// How long a writer waits for a competing process's lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_database_path() -> String {
    data_file("quill.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Global cap on jobs in `processing` or `streaming`.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Delay between claim attempts when the last batch found no work.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often a running job checks the queue for an external cancel.
    #[serde(default = "default_cancel_poll_interval_ms")]
    pub cancel_poll_interval_ms: u64,

    /// Retries granted to jobs enqueued without an explicit limit.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay. Zero disables backoff.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Upper bound on the retry delay.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Active jobs untouched for longer than this are treated as abandoned.
    #[serde(default = "default_stale_lease_secs")]
    pub stale_lease_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            poll_interval_ms: default_poll_interval_ms(),
            cancel_poll_interval_ms: default_cancel_poll_interval_ms(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            stale_lease_secs: default_stale_lease_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_interval_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }

    pub fn stale_lease(&self) -> Duration {
        Duration::from_secs(self.stale_lease_secs)
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_cancel_poll_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    2_000
}

fn default_retry_max_ms() -> u64 {
    60_000
}

fn default_stale_lease_secs() -> u64 {
    900
}

/// Upstream generation endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// URL that accepts a job payload and answers with an NDJSON frame stream.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent with each request.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for a whole generation call.
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_generator_timeout_secs(),
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generator_timeout_secs() -> u64 {
    300
}

/// Client-side checkpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Client-local checkpoint database.
    #[serde(default = "default_checkpoint_path")]
    pub path: String,

    /// Checkpoints older than this are discarded on load.
    #[serde(default = "default_checkpoint_ttl_secs")]
    pub ttl_secs: u64,

    /// Frames applied between checkpoint writes.
    #[serde(default = "default_flush_every")]
    pub flush_every: u64,

    /// Minimum spacing between UI updates.
    #[serde(default = "default_render_interval_ms")]
    pub render_interval_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
            ttl_secs: default_checkpoint_ttl_secs(),
            flush_every: default_flush_every(),
            render_interval_ms: default_render_interval_ms(),
        }
    }
}

impl CheckpointConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }
}

fn default_checkpoint_path() -> String {
    data_file("checkpoints.db")
}

fn default_checkpoint_ttl_secs() -> u64 {
    3_600
}

fn default_flush_every() -> u64 {
    100
}

fn default_render_interval_ms() -> u64 {
    50
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Whether `quill serve` starts the HTTP API.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a finished job's frame log stays available for late readers.
    #[serde(default = "default_stream_grace_secs")]
    pub stream_grace_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            host: default_host(),
            port: default_port(),
            stream_grace_secs: default_stream_grace_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn stream_grace(&self) -> Duration {
        Duration::from_secs(self.stream_grace_secs)
    }

    /// Base URL clients use to reach this gateway.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7311
}

fn default_stream_grace_secs() -> u64 {
    300
}

/// Context enrichment configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// Lookup service for `context_refs`. Enrichment is skipped when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// How long a resolved context stays cached.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl EnrichmentConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn data_file(name: &str) -> String {
    dirs::data_dir()
        .map(|p| p.join("quill").join(name))
        .unwrap_or_else(|| std::path::PathBuf::from(name))
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_end_with_file_names() {
        let config = QuillConfig::default();
        assert!(config.storage.database_path.ends_with("quill.db"));
        assert!(config.checkpoint.path.ends_with("checkpoints.db"));
    }

    #[test]
    fn duration_helpers_use_configured_units() {
        let dispatch = DispatchConfig {
            poll_interval_ms: 250,
            stale_lease_secs: 2,
            ..DispatchConfig::default()
        };
        assert_eq!(dispatch.poll_interval(), Duration::from_millis(250));
        assert_eq!(dispatch.stale_lease(), Duration::from_secs(2));
    }

    #[test]
    fn gateway_base_url() {
        let gateway = GatewayConfig::default();
        assert_eq!(gateway.base_url(), "http://127.0.0.1:7311");
    }
}
