// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::{CommError, Rank, Tag};

/// Fires the world-wide abort signal; held once per world.
#[derive(Debug)]
pub(crate) struct AbortTrigger {
    signal: Mutex<Option<flume::Sender<()>>>,
    origin: Arc<AtomicUsize>,
}

/// Observes the abort signal. Disconnects once the trigger fires.
#[derive(Debug, Clone)]
pub(crate) struct AbortWatch {
    signal: flume::Receiver<()>,
    origin: Arc<AtomicUsize>,
}

pub(crate) fn abort_signal() -> (AbortTrigger, AbortWatch) {
    let (tx, rx) = flume::bounded(0);
    let origin = Arc::new(AtomicUsize::new(0));
    (
        AbortTrigger {
            signal: Mutex::new(Some(tx)),
            origin: origin.clone(),
        },
        AbortWatch { signal: rx, origin },
    )
}

impl AbortTrigger {
    /// Returns `false` if the signal had already fired.
    pub(crate) fn fire(&self, origin: Rank) -> bool {
        let mut signal = self.signal.lock();
        let Some(sender) = signal.take() else {
            return false;
        };
        self.origin.store(origin, Ordering::Release);
        drop(sender);
        true
    }
}

impl AbortWatch {
    fn fired(&self) -> bool {
        self.signal.is_disconnected()
    }

    fn origin(&self) -> Rank {
        self.origin.load(Ordering::Acquire)
    }
}

/// Completion handle for a send started with
/// [`Communicator::isend`](crate::Communicator::isend).
///
/// The message payload is owned by the transport until the request completes,
/// so the sender cannot reuse it early. Dropping a request without waiting is
/// allowed but gives up the completion guarantee.
#[must_use = "a send request should be waited on before its sender moves on"]
#[derive(Debug)]
pub struct SendRequest {
    dest: Rank,
    tag: Tag,
    ack: Option<flume::Receiver<()>>,
    abort: Option<AbortWatch>,
}

impl SendRequest {
    /// A request that completes once a single `()` arrives on `ack`.
    pub fn new(dest: Rank, tag: Tag, ack: flume::Receiver<()>) -> Self {
        Self {
            dest,
            tag,
            ack: Some(ack),
            abort: None,
        }
    }

    /// Also give up waiting once `watch` reports the world aborted.
    pub(crate) fn abortable(mut self, watch: AbortWatch) -> Self {
        self.abort = Some(watch);
        self
    }

    /// A request that is already complete (for transports with eager sends).
    pub fn completed(dest: Rank, tag: Tag) -> Self {
        Self {
            dest,
            tag,
            ack: None,
            abort: None,
        }
    }

    /// Destination rank of the send.
    pub fn dest(&self) -> Rank {
        self.dest
    }

    /// Tag of the send.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Non-blocking completion probe.
    pub fn is_complete(&self) -> bool {
        match &self.ack {
            None => true,
            Some(ack) => !ack.is_empty(),
        }
    }

    /// Block until the receiver has consumed the message.
    ///
    /// Fails with [`CommError::WorldAborted`] if the world is torn down first.
    pub fn wait(self) -> Result<(), CommError> {
        let (dest, tag) = (self.dest, self.tag);
        let Some(ack) = self.ack else {
            return Ok(());
        };
        let Some(abort) = self.abort else {
            return ack
                .recv()
                .map_err(|_| CommError::SendAbandoned { dest, tag });
        };

        // A receiver torn down by the abort also drops the ack.
        let lost = || {
            if abort.fired() {
                CommError::WorldAborted {
                    origin: abort.origin(),
                }
            } else {
                CommError::SendAbandoned { dest, tag }
            }
        };
        match ack.try_recv() {
            Ok(()) => return Ok(()),
            Err(flume::TryRecvError::Disconnected) => return Err(lost()),
            Err(flume::TryRecvError::Empty) => {}
        }
        flume::Selector::new()
            .recv(&ack, |acked| acked.map_err(|_| lost()))
            .recv(&abort.signal, |_| {
                Err(CommError::WorldAborted {
                    origin: abort.origin(),
                })
            })
            .wait()
    }
}

/// Wait for every request in `requests`, returning the first error.
///
/// All requests are waited on even after an error so no send is left
/// half-observed.
pub fn wait_all(requests: impl IntoIterator<Item = SendRequest>) -> Result<(), CommError> {
    let mut first_error = None;
    for request in requests {
        if let Err(e) = request.wait()
            && first_error.is_none()
        {
            first_error = Some(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_request_does_not_block() {
        let request = SendRequest::completed(3, 7);
        assert!(request.is_complete());
        assert_eq!(request.dest(), 3);
        assert_eq!(request.tag(), 7);
        request.wait().unwrap();
    }

    #[test]
    fn test_request_completes_on_ack() {
        let (tx, rx) = flume::bounded(1);
        let request = SendRequest::new(1, 0, rx);
        assert!(!request.is_complete());
        tx.send(()).unwrap();
        assert!(request.is_complete());
        request.wait().unwrap();
    }

    #[test]
    fn test_request_abandoned_when_ack_dropped() {
        let (tx, rx) = flume::bounded::<()>(1);
        let request = SendRequest::new(2, 5, rx);
        drop(tx);
        let err = request.wait().unwrap_err();
        assert!(matches!(err, CommError::SendAbandoned { dest: 2, tag: 5 }));
    }

    #[test]
    fn test_wait_all_reports_first_error_after_draining() {
        let (ok_tx, ok_rx) = flume::bounded(1);
        let (bad_tx, bad_rx) = flume::bounded::<()>(1);
        let (late_tx, late_rx) = flume::bounded(1);
        ok_tx.send(()).unwrap();
        drop(bad_tx);
        late_tx.send(()).unwrap();

        let err = wait_all([
            SendRequest::new(0, 0, ok_rx),
            SendRequest::new(0, 1, bad_rx),
            SendRequest::new(0, 2, late_rx),
        ])
        .unwrap_err();
        assert!(matches!(err, CommError::SendAbandoned { tag: 1, .. }));
    }

    #[test]
    fn test_abort_releases_pending_wait() {
        let (trigger, watch) = abort_signal();
        let (_tx, rx) = flume::bounded::<()>(1);
        let request = SendRequest::new(1, 3, rx).abortable(watch.clone());

        let waiter = std::thread::spawn(move || request.wait());
        assert!(trigger.fire(2));
        assert!(!trigger.fire(0));

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, CommError::WorldAborted { origin: 2 }));
        assert_eq!(watch.origin(), 2);
    }

    #[test]
    fn test_ack_wins_over_abort() {
        let (trigger, watch) = abort_signal();
        let (tx, rx) = flume::bounded(1);
        let request = SendRequest::new(0, 0, rx).abortable(watch);
        tx.send(()).unwrap();
        trigger.fire(1);
        request.wait().unwrap();
    }
}
