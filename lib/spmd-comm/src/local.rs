// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process transport: one OS thread per rank, one mailbox per thread.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::request::{AbortTrigger, AbortWatch, abort_signal};
use crate::{CommError, Communicator, Rank, SendRequest, Tag};

/// Context id of the world communicator; split groups draw ids above it.
const WORLD_CONTEXT: u64 = 0;

// Tags reserved for collectives. They live in their own message class, so
// they can never collide with user tags.
const BARRIER_ARRIVE: Tag = 1;
const BARRIER_RELEASE: Tag = 2;
const GATHER: Tag = 3;
const SPLIT_ASSIGN: Tag = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageClass {
    User,
    Collective,
    Abort,
}

#[derive(Debug)]
struct Envelope {
    context: u64,
    source: Rank,
    class: MessageClass,
    tag: Tag,
    payload: Bytes,
    ack: Option<flume::Sender<()>>,
}

/// State shared by every rank of one local world.
struct WorldShared {
    inboxes: Vec<flume::Sender<Envelope>>,
    next_context: AtomicU64,
    abort_trigger: AbortTrigger,
    abort_watch: AbortWatch,
}

impl WorldShared {
    fn allocate_context(&self) -> u64 {
        self.next_context.fetch_add(1, Ordering::Relaxed)
    }

    /// Wake every rank with an abort marker. Idempotent.
    fn abort(&self, origin: Rank) {
        if !self.abort_trigger.fire(origin) {
            return;
        }
        warn!(origin, "aborting local world");
        for inbox in &self.inboxes {
            let _ = inbox.send(Envelope {
                context: WORLD_CONTEXT,
                source: origin,
                class: MessageClass::Abort,
                tag: 0,
                payload: Bytes::new(),
                ack: None,
            });
        }
    }
}

/// Messages pulled off the inbox that no receive has matched yet.
#[derive(Default)]
struct Parked {
    queue: VecDeque<Envelope>,
    /// Contexts of communicators this rank has dropped.
    retired: HashSet<u64>,
}

impl Parked {
    fn park(&mut self, envelope: Envelope) {
        if envelope.class != MessageClass::Abort && self.retired.contains(&envelope.context) {
            trace!(
                context = envelope.context,
                source = envelope.source,
                tag = envelope.tag,
                "dropping message for released communicator"
            );
            return;
        }
        self.queue.push_back(envelope);
    }
}

/// Receive side of one rank. Messages that do not match the current receive
/// are parked and considered first by later receives, which keeps matching in
/// arrival order.
struct Mailbox {
    inbox: flume::Receiver<Envelope>,
    parked: Mutex<Parked>,
}

impl Mailbox {
    fn new(inbox: flume::Receiver<Envelope>) -> Self {
        Self {
            inbox,
            parked: Mutex::new(Parked::default()),
        }
    }

    fn take(&self, matches: impl Fn(&Envelope) -> bool) -> Result<Envelope, CommError> {
        {
            let mut parked = self.parked.lock();
            if let Some(abort) = parked.queue.iter().find(|e| e.class == MessageClass::Abort) {
                return Err(CommError::WorldAborted {
                    origin: abort.source,
                });
            }
            if let Some(envelope) = parked
                .queue
                .iter()
                .position(&matches)
                .and_then(|pos| parked.queue.remove(pos))
            {
                return Ok(envelope);
            }
        }

        loop {
            // Every rank holds the world's senders, so this only fails once the
            // whole world has been torn down.
            let envelope = self
                .inbox
                .recv()
                .map_err(|_| CommError::WorldAborted { origin: 0 })?;

            if envelope.class == MessageClass::Abort {
                let origin = envelope.source;
                self.parked.lock().park(envelope);
                return Err(CommError::WorldAborted { origin });
            }
            if matches(&envelope) {
                return Ok(envelope);
            }
            self.parked.lock().park(envelope);
        }
    }

    /// Forget every unreceived message of `context` and drop any that arrive
    /// later. Unacknowledged senders see their request abandoned.
    fn retire(&self, context: u64) {
        let mut parked = self.parked.lock();
        parked.retired.insert(context);
        let before = parked.queue.len();
        parked
            .queue
            .retain(|e| e.context != context || e.class == MessageClass::Abort);
        let dropped = before - parked.queue.len();
        if dropped > 0 {
            debug!(context, dropped, "discarded unreceived messages of released communicator");
        }
    }

    #[cfg(test)]
    fn parked_len(&self) -> usize {
        self.parked.lock().queue.len()
    }
}

/// One rank's handle on a local communicator.
///
/// Created by [`LocalWorld::communicators`] for the world group and by
/// [`Communicator::split`] for sub-groups.
pub struct LocalComm {
    world: Arc<WorldShared>,
    mailbox: Arc<Mailbox>,
    context: u64,
    rank: Rank,
    /// Global rank of every member, indexed by rank in this communicator.
    members: Arc<[Rank]>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("context", &self.context)
            .field("rank", &self.rank)
            .field("members", &self.members)
            .finish()
    }
}

impl LocalComm {
    /// Rank of this process in the world this communicator was split from.
    pub fn global_rank(&self) -> Rank {
        self.members[self.rank]
    }

    /// Identifier separating this communicator's traffic from other groups.
    pub fn context(&self) -> u64 {
        self.context
    }

    fn check_rank(&self, rank: Rank) -> Result<(), CommError> {
        if rank >= self.members.len() {
            return Err(CommError::InvalidRank {
                rank,
                size: self.members.len(),
            });
        }
        Ok(())
    }

    fn post(
        &self,
        dest: Rank,
        class: MessageClass,
        tag: Tag,
        payload: Bytes,
        ack: Option<flume::Sender<()>>,
    ) -> Result<(), CommError> {
        let global = self.members[dest];
        trace!(
            context = self.context,
            source = self.rank,
            dest,
            tag,
            ?class,
            bytes = payload.len(),
            "post"
        );
        self.world.inboxes[global]
            .send(Envelope {
                context: self.context,
                source: self.rank,
                class,
                tag,
                payload,
                ack,
            })
            .map_err(|_| CommError::Disconnected { rank: dest })
    }

    fn take(&self, source: Rank, class: MessageClass, tag: Tag) -> Result<Envelope, CommError> {
        let context = self.context;
        self.mailbox.take(|e| {
            e.context == context && e.class == class && e.source == source && e.tag == tag
        })
    }

    fn take_collective(&self, source: Rank, tag: Tag) -> Result<Bytes, CommError> {
        Ok(self.take(source, MessageClass::Collective, tag)?.payload)
    }

    /// Rank 0 of the parent decides the membership and context of every new
    /// group, so all members agree without any shared counter races.
    fn assign_groups(&self, entries: Vec<Bytes>) -> Result<Vec<Bytes>, CommError> {
        let mut groups: BTreeMap<u32, Vec<(u64, Rank)>> = BTreeMap::new();
        for (parent_rank, mut entry) in entries.into_iter().enumerate() {
            if entry.len() != size_of::<u32>() + size_of::<u64>() {
                return Err(CommError::MalformedPayload {
                    expected: size_of::<u32>() + size_of::<u64>(),
                    actual: entry.len(),
                });
            }
            let color = entry.get_u32_le();
            let key = entry.get_u64_le();
            groups.entry(color).or_default().push((key, parent_rank));
        }

        let mut assignments = vec![Bytes::new(); self.members.len()];
        for (color, mut group) in groups {
            group.sort_unstable();
            let context = self.world.allocate_context();
            debug!(
                parent = self.context,
                context,
                color,
                size = group.len(),
                "assigned split group"
            );

            for (new_rank, &(_, parent_rank)) in group.iter().enumerate() {
                let mut buf = BytesMut::with_capacity(8 * (3 + group.len()));
                buf.put_u64_le(context);
                buf.put_u64_le(new_rank as u64);
                buf.put_u64_le(group.len() as u64);
                for &(_, member) in &group {
                    buf.put_u64_le(self.members[member] as u64);
                }
                assignments[parent_rank] = buf.freeze();
            }
        }
        Ok(assignments)
    }

    fn from_assignment(&self, mut assignment: Bytes) -> Result<LocalComm, CommError> {
        let header = 3 * size_of::<u64>();
        if assignment.len() < header {
            return Err(CommError::MalformedPayload {
                expected: header,
                actual: assignment.len(),
            });
        }
        let context = assignment.get_u64_le();
        let rank = assignment.get_u64_le() as Rank;
        let size = assignment.get_u64_le() as usize;
        if assignment.len() != size * size_of::<u64>() {
            return Err(CommError::MalformedPayload {
                expected: header + size * size_of::<u64>(),
                actual: header + assignment.len(),
            });
        }
        let members = (0..size)
            .map(|_| assignment.get_u64_le() as Rank)
            .collect::<Arc<[Rank]>>();

        Ok(LocalComm {
            world: self.world.clone(),
            mailbox: self.mailbox.clone(),
            context,
            rank,
            members,
        })
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.members.len()
    }

    fn barrier(&self) -> Result<(), CommError> {
        if self.rank == 0 {
            for peer in 1..self.size() {
                self.take_collective(peer, BARRIER_ARRIVE)?;
            }
            for peer in 1..self.size() {
                self.post(peer, MessageClass::Collective, BARRIER_RELEASE, Bytes::new(), None)?;
            }
        } else {
            self.post(0, MessageClass::Collective, BARRIER_ARRIVE, Bytes::new(), None)?;
            self.take_collective(0, BARRIER_RELEASE)?;
        }
        Ok(())
    }

    fn gather(&self, payload: Bytes, root: Rank) -> Result<Option<Vec<Bytes>>, CommError> {
        self.check_rank(root)?;
        if self.rank != root {
            self.post(root, MessageClass::Collective, GATHER, payload, None)?;
            return Ok(None);
        }

        let mut payloads = Vec::with_capacity(self.size());
        for peer in 0..root {
            payloads.push(self.take_collective(peer, GATHER)?);
        }
        payloads.push(payload);
        for peer in root + 1..self.size() {
            payloads.push(self.take_collective(peer, GATHER)?);
        }
        Ok(Some(payloads))
    }

    fn isend(&self, dest: Rank, tag: Tag, payload: Bytes) -> Result<SendRequest, CommError> {
        self.check_rank(dest)?;
        let (ack_tx, ack_rx) = flume::bounded(1);
        self.post(dest, MessageClass::User, tag, payload, Some(ack_tx))?;
        Ok(SendRequest::new(dest, tag, ack_rx).abortable(self.world.abort_watch.clone()))
    }

    fn recv(&self, source: Rank, tag: Tag) -> Result<Bytes, CommError> {
        self.check_rank(source)?;
        let envelope = self.take(source, MessageClass::User, tag)?;
        if let Some(ack) = envelope.ack {
            // The sender may have dropped its request; completion is then moot.
            let _ = ack.send(());
        }
        Ok(envelope.payload)
    }

    fn split(&self, color: u32, key: usize) -> Result<Box<dyn Communicator>, CommError> {
        let mut entry = BytesMut::with_capacity(size_of::<u32>() + size_of::<u64>());
        entry.put_u32_le(color);
        entry.put_u64_le(key as u64);

        let assignment = match self.gather(entry.freeze(), 0)? {
            Some(entries) => {
                let mut assignments = self.assign_groups(entries)?;
                for (peer, assignment) in assignments.iter_mut().enumerate().skip(1) {
                    self.post(
                        peer,
                        MessageClass::Collective,
                        SPLIT_ASSIGN,
                        std::mem::take(assignment),
                        None,
                    )?;
                }
                std::mem::take(&mut assignments[0])
            }
            None => self.take_collective(0, SPLIT_ASSIGN)?,
        };

        let comm = self.from_assignment(assignment)?;
        debug!(
            parent = self.context,
            context = comm.context,
            rank = comm.rank,
            size = comm.size(),
            color,
            "split communicator"
        );
        Ok(Box::new(comm))
    }

    fn abort(&self) {
        self.world.abort(self.global_rank());
    }
}

impl Drop for LocalComm {
    fn drop(&mut self) {
        self.mailbox.retire(self.context);
    }
}

/// Marks the world aborted when the owning rank's thread unwinds, so peers
/// blocked in a receive fail instead of hanging.
struct AbortOnPanic {
    world: Arc<WorldShared>,
    rank: Rank,
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.world.abort(self.rank);
        }
    }
}

/// Factory and launcher for in-process worlds.
pub struct LocalWorld;

impl LocalWorld {
    /// Build the world communicators of a fresh `size`-rank world, in rank order.
    pub fn communicators(size: usize) -> Result<Vec<LocalComm>, CommError> {
        if size == 0 {
            return Err(CommError::EmptyWorld);
        }

        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| flume::unbounded()).unzip();
        let (abort_trigger, abort_watch) = abort_signal();
        let world = Arc::new(WorldShared {
            inboxes: senders,
            next_context: AtomicU64::new(WORLD_CONTEXT + 1),
            abort_trigger,
            abort_watch,
        });
        let members: Arc<[Rank]> = (0..size).collect();

        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalComm {
                world: world.clone(),
                mailbox: Arc::new(Mailbox::new(inbox)),
                context: WORLD_CONTEXT,
                rank,
                members: members.clone(),
            })
            .collect())
    }

    /// Run `f` once per rank of a fresh `size`-rank world, each on its own
    /// thread, and return the results in rank order.
    ///
    /// If a rank panics the world is aborted so its peers unblock, and the
    /// panic is reported as [`CommError::RankPanicked`].
    pub fn run<F, T>(size: usize, f: F) -> Result<Vec<T>, CommError>
    where
        F: Fn(Box<dyn Communicator>) -> T + Sync,
        T: Send,
    {
        let comms = Self::communicators(size)?;
        let world = comms[0].world.clone();
        let f = &f;

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            let mut spawn_error = None;

            for comm in comms {
                let rank = comm.rank;
                let guard = AbortOnPanic {
                    world: world.clone(),
                    rank,
                };
                let spawned = std::thread::Builder::new()
                    .name(format!("spmd-rank-{rank}"))
                    .spawn_scoped(scope, move || {
                        let _guard = guard;
                        f(Box::new(comm))
                    });

                match spawned {
                    Ok(handle) => handles.push((rank, handle)),
                    Err(source) => {
                        world.abort(rank);
                        spawn_error = Some(CommError::Spawn { rank, source });
                        break;
                    }
                }
            }

            let mut results = Vec::with_capacity(handles.len());
            let mut first_error = spawn_error;
            for (rank, handle) in handles {
                match handle.join() {
                    Ok(value) => results.push(value),
                    Err(payload) => {
                        let message = payload
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| payload.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "non-string panic payload".to_string());
                        first_error.get_or_insert(CommError::RankPanicked { rank, message });
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(results),
            }
        })
    }
}
