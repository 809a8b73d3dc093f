// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use spmd_comm::{Communicator, Rank};
use tracing::debug;

use crate::comparator::Verdict;
use crate::{AssertionSite, FailureRecord};

/// Per-test handle passed to a test body.
///
/// It pairs the test's sub-group communicator with the failure list of the
/// one test that is currently running on this process. Assertions record
/// into it, so a failure can only ever be attributed to the active test.
pub struct TestContext<'a> {
    comm: &'a dyn Communicator,
    test: &'a str,
    failures: &'a mut Vec<FailureRecord>,
}

impl<'a> TestContext<'a> {
    pub fn new(
        comm: &'a dyn Communicator,
        test: &'a str,
        failures: &'a mut Vec<FailureRecord>,
    ) -> Self {
        Self {
            comm,
            test,
            failures,
        }
    }

    /// The test's sub-group. Ranks start at 0 and follow global rank order.
    pub fn comm(&self) -> &'a dyn Communicator {
        self.comm
    }

    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn test_name(&self) -> &str {
        self.test
    }

    /// Record `verdict` against `site`. Returns whether the check passed.
    pub fn check(&mut self, site: AssertionSite, verdict: Verdict) -> bool {
        match verdict {
            Ok(()) => true,
            Err(reason) => {
                self.fail(site, reason);
                false
            }
        }
    }

    /// Record an unconditional failure.
    pub fn fail(&mut self, site: AssertionSite, reason: impl Into<String>) {
        let record = FailureRecord::new(site, reason);
        debug!(
            test = self.test,
            rank = self.comm.rank(),
            line = site.line(),
            reason = record.reason(),
            "assertion failed"
        );
        self.failures.push(record);
    }

    /// Failures recorded so far in this run of the test.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}
