// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::QuillConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Checks semantic constraints serde cannot express.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &QuillConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let dispatch = &config.dispatch;
    if dispatch.max_concurrent == 0 {
        fail("dispatch.max_concurrent must be at least 1".to_string());
    }
    if dispatch.poll_interval_ms == 0 {
        fail("dispatch.poll_interval_ms must be greater than 0".to_string());
    }
    if dispatch.cancel_poll_interval_ms == 0 {
        fail("dispatch.cancel_poll_interval_ms must be greater than 0".to_string());
    }
    if dispatch.retry_base_ms > dispatch.retry_max_ms {
        fail(format!(
            "dispatch.retry_base_ms ({}) must not exceed dispatch.retry_max_ms ({})",
            dispatch.retry_base_ms, dispatch.retry_max_ms
        ));
    }
    if dispatch.stale_lease_secs == 0 {
        fail("dispatch.stale_lease_secs must be greater than 0".to_string());
    }

    for (key, url) in [
        ("generator.endpoint", &config.generator.endpoint),
        ("enrichment.endpoint", &config.enrichment.endpoint),
    ] {
        if let Some(url) = url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            fail(format!("{key} `{url}` must be an http:// or https:// URL"));
        }
    }
    if config.generator.timeout_secs == 0 {
        fail("generator.timeout_secs must be greater than 0".to_string());
    }

    if config.checkpoint.path.trim().is_empty() {
        fail("checkpoint.path must not be empty".to_string());
    }
    if config.checkpoint.ttl_secs == 0 {
        fail("checkpoint.ttl_secs must be greater than 0".to_string());
    }
    if config.checkpoint.flush_every == 0 {
        fail("checkpoint.flush_every must be at least 1".to_string());
    }

    let host = config.gateway.host.trim();
    let is_ip = host.parse::<std::net::IpAddr>().is_ok();
    let is_hostname = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
    if !is_ip && !is_hostname {
        fail(format!(
            "gateway.host `{host}` is not a valid IP address or hostname"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &QuillConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&QuillConfig::default()).is_ok());
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let mut config = QuillConfig::default();
        config.dispatch.max_concurrent = 0;
        assert!(messages(&config)[0].contains("max_concurrent"));
    }

    #[test]
    fn retry_base_above_cap_fails_validation() {
        let mut config = QuillConfig::default();
        config.dispatch.retry_base_ms = 10_000;
        config.dispatch.retry_max_ms = 1_000;
        assert!(messages(&config)[0].contains("retry_base_ms"));
    }

    #[test]
    fn zero_retry_base_is_allowed() {
        let mut config = QuillConfig::default();
        config.dispatch.retry_base_ms = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn non_http_endpoint_fails_validation() {
        let mut config = QuillConfig::default();
        config.generator.endpoint = Some("ftp://models.local".into());
        assert!(messages(&config)[0].contains("generator.endpoint"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = QuillConfig::default();
        config.service.log_level = "loud".into();
        config.checkpoint.flush_every = 0;
        config.gateway.host = "bad host!".into();
        assert_eq!(messages(&config).len(), 3);
    }
}
