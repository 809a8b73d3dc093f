// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use spmd_comm::{CommError, Communicator, Rank};
use tracing::trace;

/// Whether global `rank` takes part in a test that needs `test_size` processes.
///
/// The active subset is always the lowest-ranked `test_size` processes.
pub fn is_active(rank: Rank, test_size: usize) -> bool {
    rank < test_size
}

/// The sub-group a single test runs on.
///
/// Entering a scope is collective over the world: every process splits by
/// "am I active", keyed by its global rank so the active group keeps the
/// global ordering. Inactive processes hold a handle on the other partition
/// and never use it. The sub-group is released when the scope drops.
pub struct CommunicatorScope {
    comm: Box<dyn Communicator>,
    active: bool,
    test_size: usize,
}

impl CommunicatorScope {
    pub fn enter(world: &dyn Communicator, test_size: usize) -> Result<Self, CommError> {
        let active = is_active(world.rank(), test_size);
        let comm = world.split(active as u32, world.rank())?;
        trace!(
            rank = world.rank(),
            test_size,
            active,
            sub_rank = comm.rank(),
            sub_size = comm.size(),
            "entered test scope"
        );
        Ok(Self {
            comm,
            active,
            test_size,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn test_size(&self) -> usize {
        self.test_size
    }

    /// The sub-group handle. Only meaningful for active processes.
    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }
}

impl Drop for CommunicatorScope {
    fn drop(&mut self) {
        trace!(test_size = self.test_size, "released test scope");
    }
}
