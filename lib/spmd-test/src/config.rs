// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Harness configuration.
//!
//! Sources in priority order (lowest to highest):
//! 1. Code defaults
//! 2. TOML file from the `SPMD_TEST_CONFIG_PATH` environment variable
//! 3. Environment variables (`SPMD_TEST_MESSAGE_SIZE`, `SPMD_TEST_STRICT_EXIT`)
//!
//! Every process of a run must resolve the same configuration; in particular
//! all ranks have to agree on `message_size`.

use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::channel::DEFAULT_MESSAGE_SIZE;

/// ENV holding the path of an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "SPMD_TEST_CONFIG_PATH";

const ENV_PREFIX: &str = "SPMD_TEST_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to extract configuration: {0}")]
    Extraction(#[from] Box<figment::Error>),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HarnessConfig {
    /// Fixed size in bytes of one failure message on the wire. Longer
    /// messages are truncated.
    #[validate(range(min = 64, max = 65536))]
    pub message_size: usize,

    /// Exit with a non-zero status when any test failed.
    pub strict_exit: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            message_size: DEFAULT_MESSAGE_SIZE,
            strict_exit: false,
        }
    }
}

impl HarnessConfig {
    /// Create a Figment configuration with all sources merged.
    pub fn figment() -> Figment {
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_default();

        Figment::new()
            .merge(Serialized::defaults(HarnessConfig::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).only(&["message_size", "strict_exit"]))
    }

    /// Load configuration from the default figment (file and env).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::extract_from(Self::figment())
    }

    /// Extract and validate configuration from any provider.
    ///
    /// ```rust,ignore
    /// let config = HarnessConfig::extract_from(
    ///     HarnessConfig::figment().merge(("message_size", 4096usize)),
    /// )?;
    /// ```
    pub fn extract_from<T: Provider>(provider: T) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(provider)
            .extract()
            .map_err(|e| ConfigError::Extraction(Box::new(e)))?;
        config.validate()?;
        Ok(config)
    }
}
