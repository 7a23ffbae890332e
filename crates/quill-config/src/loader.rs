// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./quill.toml` > `~/.config/quill/quill.toml` > `/etc/quill/quill.toml`,
//! with environment variable overrides via the `QUILL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::QuillConfig;

const SYSTEM_CONFIG: &str = "/etc/quill/quill.toml";
const LOCAL_CONFIG: &str = "quill.toml";

/// Top-level sections, used to split `QUILL_<SECTION>_<KEY>` variables.
const SECTIONS: &[&str] = &[
    "service",
    "storage",
    "dispatch",
    "generator",
    "checkpoint",
    "gateway",
    "enrichment",
];

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/quill/quill.toml`
/// 3. `~/.config/quill/quill.toml`
/// 4. `./quill.toml`
/// 5. `QUILL_*` environment variables
pub fn load_config() -> Result<QuillConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults only.
pub fn load_config_from_str(toml_content: &str) -> Result<QuillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<QuillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

pub(crate) fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("quill").join("quill.toml"))
}

pub(crate) fn candidate_paths() -> Vec<std::path::PathBuf> {
    let mut paths = vec![std::path::PathBuf::from(SYSTEM_CONFIG)];
    paths.extend(user_config_path());
    paths.push(
        std::env::current_dir()
            .map(|d| d.join(LOCAL_CONFIG))
            .unwrap_or_else(|_| LOCAL_CONFIG.into()),
    );
    paths
}

/// Maps `QUILL_DISPATCH_MAX_CONCURRENT` to `dispatch.max_concurrent`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys that contain underscores survive intact.
fn env_provider() -> Env {
    Env::prefixed("QUILL_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key
}
