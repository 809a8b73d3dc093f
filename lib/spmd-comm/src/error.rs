// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{Rank, Tag};

/// Errors returned by [`Communicator`](crate::Communicator) operations.
///
/// Every variant is fatal to the process group: collective semantics require
/// all members to agree, so there is no partial recovery.
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// A rank argument was outside the group.
    #[error("rank {rank} is out of range for a group of size {size}")]
    InvalidRank {
        /// The offending rank.
        rank: Rank,
        /// Size of the group it was checked against.
        size: usize,
    },

    /// The mailbox of the destination rank is gone.
    #[error("rank {rank} is no longer reachable")]
    Disconnected {
        /// The unreachable rank (within the sending communicator).
        rank: Rank,
    },

    /// A pending send can never complete because its receiver went away.
    #[error("send to rank {dest} with tag {tag} was abandoned before completion")]
    SendAbandoned {
        /// Destination rank of the send.
        dest: Rank,
        /// Tag of the send.
        tag: Tag,
    },

    /// Another member of the world aborted (for example its thread panicked).
    #[error("world aborted by global rank {origin}")]
    WorldAborted {
        /// Global rank that triggered the abort.
        origin: Rank,
    },

    /// An internal payload did not have the expected layout.
    #[error("malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload {
        /// Expected length in bytes.
        expected: usize,
        /// Actual length in bytes.
        actual: usize,
    },

    /// A world must contain at least one rank.
    #[error("a world needs at least one rank")]
    EmptyWorld,

    /// The thread hosting a rank could not be spawned.
    #[error("failed to spawn rank {rank}: {source}")]
    Spawn {
        /// Rank whose thread failed to start.
        rank: Rank,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The thread hosting a rank panicked.
    #[error("rank {rank} panicked: {message}")]
    RankPanicked {
        /// Rank whose thread panicked.
        rank: Rank,
        /// Panic payload, when it was a string.
        message: String,
    },
}
