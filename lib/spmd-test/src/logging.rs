// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic logging for harness internals.
//!
//! Events go to stderr so that stdout carries only the test report. Filters
//! are read from the `SPMD_TEST_LOG` environment variable using the usual
//! `EnvFilter` directive syntax, e.g. `SPMD_TEST_LOG=spmd_test=debug`. The
//! default level is `warn`.
//!
//! Set `SPMD_TEST_DISABLE_ANSI_LOGGING=1` to turn off colored output.

use std::sync::Once;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// ENV used to set the log filter
const FILTER_ENV: &str = "SPMD_TEST_LOG";

/// ENV used to disable ANSI escape codes
const DISABLE_ANSI_ENV: &str = "SPMD_TEST_DISABLE_ANSI_LOGGING";

static INIT: Once = Once::new();

/// Initialize the logger. Later calls are no-ops, as are calls made after
/// another global subscriber was installed.
pub fn init() {
    INIT.call_once(setup_logging);
}

fn setup_logging() {
    let layer = fmt::layer()
        .with_ansi(!disable_ansi_logging())
        .event_format(fmt::format().compact().with_thread_names(true))
        .with_writer(std::io::stderr)
        .with_filter(filters());

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        tracing::debug!("global subscriber already installed");
    }
}

fn filters() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var(FILTER_ENV)
        .from_env_lossy()
}

fn disable_ansi_logging() -> bool {
    std::env::var(DISABLE_ANSI_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("1", true)]
    #[case("true", true)]
    #[case("YES", true)]
    #[case(" on ", true)]
    #[case("0", false)]
    #[case("false", false)]
    #[case("", false)]
    fn test_is_truthy(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(is_truthy(value), expected);
    }

    #[test]
    fn test_disable_ansi_from_env() {
        temp_env::with_var(DISABLE_ANSI_ENV, Some("1"), || {
            assert!(disable_ansi_logging());
        });
        temp_env::with_var_unset(DISABLE_ANSI_ENV, || {
            assert!(!disable_ansi_logging());
        });
    }

    #[test]
    fn test_default_filter_is_warn() {
        temp_env::with_var_unset(FILTER_ENV, || {
            assert_eq!(filters().max_level_hint(), Some(LevelFilter::WARN));
        });
    }

    #[test]
    fn test_filter_from_env() {
        temp_env::with_var(FILTER_ENV, Some("debug"), || {
            assert_eq!(filters().max_level_hint(), Some(LevelFilter::DEBUG));
        });
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
    }
}
