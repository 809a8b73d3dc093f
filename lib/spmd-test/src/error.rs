// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use spmd_comm::CommError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort a harness run.
///
/// Assertion failures are never errors; they are data reported through the
/// failure channel.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("transport failure: {0}")]
    Transport(#[from] CommError),

    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
