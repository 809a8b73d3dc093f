// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Failure aggregation.
//!
//! After a test body returns, the active sub-group converges its failures on
//! sub-group rank 0 (the coordinator):
//!
//! 1. Local failure counts are gathered to the coordinator.
//! 2. A zero total ends the exchange.
//! 3. Otherwise each process sends every failure as one fixed-size message,
//!    tagged with the failure's index in its local list.
//! 4. The coordinator receives rank by rank, tag by tag, printing each message
//!    as it arrives.
//!
//! The verdict line itself is left to the caller.
//!
//! Senders keep their requests until all of them completed, so a process never
//! leaves the exchange before the coordinator has consumed its messages.

use bytes::{BufMut, Bytes, BytesMut};
use spmd_comm::{Communicator, Rank, SendRequest, Tag, wait_all};
use tracing::{debug, trace};

use crate::{FailureRecord, HarnessError, Reporter};

/// Wire size of a failure message unless configured otherwise.
pub const DEFAULT_MESSAGE_SIZE: usize = 1024;

const COORDINATOR: Rank = 0;

/// Outcome of one test as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    Passed,
    Failed { failures: u64 },
}

/// Fixed-size message codec plus the aggregation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureChannel {
    message_size: usize,
}

impl Default for FailureChannel {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_SIZE)
    }
}

impl FailureChannel {
    /// `message_size` must be at least 1; one byte is always reserved for the
    /// terminating NUL.
    pub fn new(message_size: usize) -> Self {
        Self {
            message_size: message_size.max(1),
        }
    }

    pub fn message_size(&self) -> usize {
        self.message_size
    }

    /// Pack `text` into exactly `message_size` bytes.
    ///
    /// Text that does not fit is cut at the last character boundary that
    /// leaves room for the NUL terminator; the rest is NUL padding.
    pub fn encode(&self, text: &str) -> Bytes {
        let limit = self.message_size - 1;
        let mut end = text.len().min(limit);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        let mut buf = BytesMut::with_capacity(self.message_size);
        buf.put_slice(&text.as_bytes()[..end]);
        buf.put_bytes(0, self.message_size - end);
        buf.freeze()
    }

    /// Recover the text of a message: everything before the first NUL.
    pub fn decode(&self, message: &[u8]) -> String {
        let end = message
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(message.len());
        String::from_utf8_lossy(&message[..end]).into_owned()
    }

    /// Run the aggregation protocol for one test over its sub-group.
    ///
    /// Must be called by every member of `comm`. Returns the verdict on the
    /// coordinator and `None` elsewhere. Only the coordinator writes to
    /// `reporter`.
    pub fn aggregate(
        &self,
        comm: &dyn Communicator,
        name: &str,
        failures: &[FailureRecord],
        reporter: &mut Reporter,
    ) -> Result<Option<TestVerdict>, HarnessError> {
        let rank = comm.rank();
        let counts = comm.gather_u64(failures.len() as u64, COORDINATOR)?;
        let total = counts.as_ref().map(|c| c.iter().sum::<u64>());
        trace!(test = name, rank, local = failures.len(), ?total, "gathered failure counts");

        // The total is only known on the coordinator; everyone else acts on
        // its local count, which is zero whenever the total is.
        let pending = if failures.is_empty() {
            Vec::new()
        } else {
            self.send_failures(comm, failures)?
        };

        let verdict = match counts {
            Some(counts) => Some(self.collect(comm, name, &counts, reporter)?),
            None => None,
        };

        wait_all(pending)?;
        Ok(verdict)
    }

    fn send_failures(
        &self,
        comm: &dyn Communicator,
        failures: &[FailureRecord],
    ) -> Result<Vec<SendRequest>, HarnessError> {
        let rank = comm.rank();
        let mut pending = Vec::with_capacity(failures.len());
        for (index, failure) in failures.iter().enumerate() {
            let message = self.encode(&failure.render(rank));
            pending.push(comm.isend(COORDINATOR, index as Tag, message)?);
        }
        debug!(rank, sent = pending.len(), "posted failure messages");
        Ok(pending)
    }

    fn collect(
        &self,
        comm: &dyn Communicator,
        name: &str,
        counts: &[u64],
        reporter: &mut Reporter,
    ) -> Result<TestVerdict, HarnessError> {
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return Ok(TestVerdict::Passed);
        }

        for (source, &count) in counts.iter().enumerate() {
            for tag in 0..count {
                let message = comm.recv(source, tag as Tag)?;
                reporter.failure(&self.decode(&message))?;
            }
        }
        debug!(test = name, failures = total, "collected failures");
        Ok(TestVerdict::Failed { failures: total })
    }
}
