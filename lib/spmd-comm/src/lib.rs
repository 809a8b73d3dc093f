// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! Message-passing communicator abstraction for SPMD process groups.
//!
//! `spmd-comm` describes the small set of primitives an SPMD harness needs from
//! its transport behind a single object-safe [`Communicator`] trait: barriers,
//! gathers to a root, tagged non-blocking sends with completion tracking,
//! tagged blocking receives, and group splitting.
//!
//! # Local world
//!
//! [`LocalWorld`] is an in-process implementation where every rank is an OS
//! thread owning a private mailbox. It follows MPI matching rules: messages
//! are matched on `(communicator, source, tag)` in arrival order, collectives
//! travel in their own message class so they never satisfy a user receive,
//! and [`Communicator::split`] preserves relative rank order by key.
//!
//! ```rust,ignore
//! let sums = LocalWorld::run(4, |comm| {
//!     let counts = comm.gather_u64(comm.rank() as u64, 0)?;
//!     Ok::<_, CommError>(counts.map(|c| c.iter().sum::<u64>()))
//! })?;
//! ```

mod error;
mod local;
mod request;

use bytes::{Buf, Bytes};

pub use error::CommError;
pub use local::{LocalComm, LocalWorld};
pub use request::{SendRequest, wait_all};

/// Index of a process within a group (0-based).
pub type Rank = usize;

/// Label disambiguating point-to-point messages between the same pair of ranks.
pub type Tag = u32;

/// A handle on a group of cooperating processes.
///
/// Collective operations ([`barrier`](Self::barrier), [`gather`](Self::gather),
/// [`split`](Self::split)) must be called by every member of the group, in the
/// same order, for any member to proceed. A member that diverges blocks its
/// peers forever; there is no timeout.
pub trait Communicator: Send {
    /// This process's rank within the group.
    fn rank(&self) -> Rank;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Block until every member of the group has entered the barrier.
    fn barrier(&self) -> Result<(), CommError>;

    /// Collect one payload per member at `root`.
    ///
    /// Returns `Some(payloads)` ordered by rank on the root and `None` elsewhere.
    fn gather(&self, payload: Bytes, root: Rank) -> Result<Option<Vec<Bytes>>, CommError>;

    /// Start a synchronous-mode send of `payload` to `dest` under `tag`.
    ///
    /// The call returns immediately. The returned [`SendRequest`] completes once
    /// the matching receive has consumed the message.
    fn isend(&self, dest: Rank, tag: Tag, payload: Bytes) -> Result<SendRequest, CommError>;

    /// Block until a message from `source` carrying `tag` arrives and return it.
    fn recv(&self, source: Rank, tag: Tag) -> Result<Bytes, CommError>;

    /// Partition the group by `color`.
    ///
    /// Members passing the same color end up in the same new group, ranked by
    /// ascending `key` (ties broken by rank in this group).
    fn split(&self, color: u32, key: usize) -> Result<Box<dyn Communicator>, CommError>;

    /// Tear down the whole world this group belongs to.
    ///
    /// Every member of every group of the world that is blocked in, or later
    /// enters, a receive, a collective or a send wait fails with
    /// [`CommError::WorldAborted`]. Calling it more than once has no effect.
    fn abort(&self);

    /// Blocking send; equivalent to [`isend`](Self::isend) followed by a wait.
    fn send(&self, dest: Rank, tag: Tag, payload: Bytes) -> Result<(), CommError> {
        self.isend(dest, tag, payload)?.wait()
    }

    /// Gather a single `u64` per member at `root`.
    fn gather_u64(&self, value: u64, root: Rank) -> Result<Option<Vec<u64>>, CommError> {
        let payload = Bytes::copy_from_slice(&value.to_le_bytes());
        let Some(payloads) = self.gather(payload, root)? else {
            return Ok(None);
        };

        payloads
            .into_iter()
            .map(|mut payload| {
                if payload.len() != size_of::<u64>() {
                    return Err(CommError::MalformedPayload {
                        expected: size_of::<u64>(),
                        actual: payload.len(),
                    });
                }
                Ok(payload.get_u64_le())
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

impl std::fmt::Debug for dyn Communicator + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}
