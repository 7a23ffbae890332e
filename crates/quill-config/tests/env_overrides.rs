// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `QUILL_*` environment overrides. Serialized because they mutate the
//! process environment.

use quill_config::QuillConfig;
use quill_config::loader::build_figment;
use serial_test::serial;

struct EnvGuard(&'static [&'static str]);

impl EnvGuard {
    fn set(vars: &'static [(&'static str, &'static str)], keys: &'static [&'static str]) -> Self {
        for (key, value) in vars {
            // SAFETY: tests touching the environment run under #[serial].
            unsafe { std::env::set_var(key, value) };
        }
        Self(keys)
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in self.0 {
            // SAFETY: see EnvGuard::set.
            unsafe { std::env::remove_var(key) };
        }
    }
}

#[test]
#[serial]
fn env_overrides_nested_keys() {
    let _env = EnvGuard::set(
        &[
            ("QUILL_DISPATCH_MAX_CONCURRENT", "9"),
            ("QUILL_GENERATOR_API_KEY", "k-1"),
        ],
        &["QUILL_DISPATCH_MAX_CONCURRENT", "QUILL_GENERATOR_API_KEY"],
    );

    let config: QuillConfig = build_figment().extract().unwrap();
    assert_eq!(config.dispatch.max_concurrent, 9);
    assert_eq!(config.generator.api_key.as_deref(), Some("k-1"));
}

#[test]
#[serial]
fn unknown_env_key_is_rejected() {
    let _env = EnvGuard::set(
        &[("QUILL_DISPATCH_MAX_CONCURENT", "9")],
        &["QUILL_DISPATCH_MAX_CONCURENT"],
    );

    assert!(build_figment().extract::<QuillConfig>().is_err());
}
