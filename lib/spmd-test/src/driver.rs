// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Orchestration loop.
//!
//! ```text
//! INIT -> (per case: SELECT -> SPLIT -> EXECUTE -> AGGREGATE -> REPORT -> RESYNC) -> DONE
//! ```
//!
//! Every process runs the same loop over the same registry. Only the processes
//! selected for a case execute its body and take part in aggregation; all of
//! them meet again at the barrier that closes the case.

use std::fmt;

use spmd_comm::{Communicator, Rank};
use tracing::{debug, trace, warn};

use crate::channel::{FailureChannel, TestVerdict};
use crate::config::HarnessConfig;
use crate::scope::CommunicatorScope;
use crate::{HarnessError, Registry, Reporter, TestContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Select,
    Split,
    Execute,
    Aggregate,
    Report,
    Resync,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Select => "select",
            Phase::Split => "split",
            Phase::Execute => "execute",
            Phase::Aggregate => "aggregate",
            Phase::Report => "report",
            Phase::Resync => "resync",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a run ended on one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// All cases went through the loop. Counts are only meaningful on global
    /// rank 0, which coordinates every case; other ranks report zeros.
    Completed { passed: usize, failed: usize },
    /// The world is smaller than the largest case; nothing ran.
    InsufficientProcs { required: usize, launched: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub rank: Rank,
    pub status: RunStatus,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        match self.status {
            RunStatus::Completed { failed, .. } => failed,
            RunStatus::InsufficientProcs { .. } => 0,
        }
    }

    /// Process exit status for this summary.
    ///
    /// A launch that is too small is not an error. Failed tests only turn
    /// into a non-zero status when `strict` is set.
    pub fn exit_code(&self, strict: bool) -> u8 {
        if strict && self.failed() > 0 { 1 } else { 0 }
    }
}

/// Runs every registered case over a world communicator.
#[derive(Debug)]
pub struct Driver {
    registry: Registry,
    channel: FailureChannel,
    reporter: Reporter,
}

impl Driver {
    pub fn new(registry: Registry, config: &HarnessConfig, reporter: Reporter) -> Self {
        Self {
            registry,
            channel: FailureChannel::new(config.message_size),
            reporter,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the whole registry. Collective over `world`.
    pub fn run(&mut self, world: &dyn Communicator) -> Result<RunSummary, HarnessError> {
        let Self {
            registry,
            channel,
            reporter,
        } = self;
        let rank = world.rank();
        let launched = world.size();

        debug!(phase = %Phase::Init, rank, size = launched, cases = registry.len(), "starting run");
        world.barrier()?;

        let required = registry.max_required_size();
        if launched < required {
            if rank == 0 {
                reporter.insufficient_procs(required)?;
            }
            warn!(rank, required, launched, "world too small, no test will run");
            return Ok(RunSummary {
                rank,
                status: RunStatus::InsufficientProcs { required, launched },
            });
        }
        world.barrier()?;

        let mut passed = 0;
        let mut failed = 0;

        for index in 0..registry.len() {
            let case = registry.case_mut(index);
            let name = case.shared_name();
            let size = case.size();
            if size == 0 {
                warn!(rank, test = %name, "test registered with zero processes never runs");
            }

            trace!(phase = %Phase::Select, rank, test = %name, size, selected = rank < size);
            trace!(phase = %Phase::Split, rank, test = %name, size);
            let scope = CommunicatorScope::enter(world, size)?;

            if scope.is_active() {
                let comm = scope.comm();
                let body = case.body();

                trace!(phase = %Phase::Execute, rank, test = %name, size);
                if comm.rank() == 0 {
                    reporter.running(&name, size)?;
                }
                {
                    let mut ctx = TestContext::new(comm, &name, case.reset());
                    body(&mut ctx);
                }

                trace!(phase = %Phase::Aggregate, rank, test = %name, size, local = case.failures().len());
                let verdict = channel.aggregate(comm, &name, case.failures(), reporter)?;

                if let Some(verdict) = verdict {
                    trace!(phase = %Phase::Report, rank, test = %name, ?verdict);
                    match verdict {
                        TestVerdict::Passed => {
                            reporter.success(&name)?;
                            passed += 1;
                        }
                        TestVerdict::Failed { failures } => {
                            reporter.fail(&name)?;
                            debug!(test = %name, failures, "test failed");
                            failed += 1;
                        }
                    }
                }
            }

            trace!(phase = %Phase::Resync, rank, test = %name, size);
            world.barrier()?;
            drop(scope);
        }

        debug!(phase = %Phase::Done, rank, passed, failed, "run finished");
        Ok(RunSummary {
            rank,
            status: RunStatus::Completed { passed, failed },
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(RunStatus::Completed { passed: 3, failed: 0 }, false, 0)]
    #[case(RunStatus::Completed { passed: 3, failed: 0 }, true, 0)]
    #[case(RunStatus::Completed { passed: 1, failed: 2 }, false, 0)]
    #[case(RunStatus::Completed { passed: 1, failed: 2 }, true, 1)]
    #[case(RunStatus::InsufficientProcs { required: 4, launched: 2 }, true, 0)]
    fn test_exit_code(#[case] status: RunStatus, #[case] strict: bool, #[case] expected: u8) {
        let summary = RunSummary { rank: 0, status };
        assert_eq!(summary.exit_code(strict), expected);
    }

    #[test]
    fn test_phase_display() {
        let phases = [
            Phase::Init,
            Phase::Select,
            Phase::Split,
            Phase::Execute,
            Phase::Aggregate,
            Phase::Report,
            Phase::Resync,
            Phase::Done,
        ];
        let names: Vec<_> = phases.iter().map(Phase::to_string).collect();
        assert_eq!(
            names,
            ["init", "select", "split", "execute", "aggregate", "report", "resync", "done"]
        );
    }
}
