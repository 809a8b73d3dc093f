// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Test orchestration for SPMD process groups.
//!
//! Every process of a group runs the same program. Each one builds the same
//! ordered [`Registry`] of test cases, then the [`Driver`] walks it in lock
//! step: for every case the lowest `size` ranks are split off into a
//! sub-group, run the body, and converge their failures on sub-group rank 0,
//! which writes the report.
//!
//! ```rust,ignore
//! use spmd_test::{Registry, expect_eq, require_true};
//!
//! fn register(registry: &mut Registry) {
//!     registry.register("rank_sum", [1, 2, 4], |ctx| {
//!         let counts = ctx.comm().gather_u64(ctx.rank() as u64, 0);
//!         require_true!(ctx, counts.is_ok());
//!         if let Ok(Some(counts)) = counts {
//!             let n = ctx.size() as u64;
//!             expect_eq!(ctx, counts.iter().sum::<u64>(), n * (n - 1) / 2);
//!         }
//!     });
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     spmd_test::main_local(4, register)
//! }
//! ```
//!
//! Output on stdout:
//!
//! ```text
//! [ RUNNING ] rank_sum (1 proc)
//! [ SUCCESS ] rank_sum
//! [ RUNNING ] rank_sum (2 procs)
//! [ SUCCESS ] rank_sum
//! ...
//! ```

pub mod channel;
pub mod comparator;
pub mod config;
mod context;
mod driver;
mod error;
mod launch;
pub mod logging;
mod macros;
mod registry;
pub mod report;
mod scope;

pub use spmd_comm;
pub use spmd_comm::{Communicator, Rank};

pub use channel::{FailureChannel, TestVerdict};
pub use config::{ConfigError, HarnessConfig};
pub use context::TestContext;
pub use driver::{Driver, RunStatus, RunSummary};
pub use error::HarnessError;
pub use launch::{main_local, run_local, run_local_with, run_on};
pub use registry::{AssertionSite, FailureRecord, Registry, TestBody, TestCase, TestHandle};
pub use report::{ReportBuffer, Reporter};
pub use scope::{CommunicatorScope, is_active};
