//! Pending-request table.
//!
//! One entry per transmitted, not-yet-settled request, keyed by `messageId`.
//! Each entry records what settles it ([`Awaiting`]) so ACK-settled commands
//! and event-settled requests (snapshot, ping) share one table, one timer
//! path and one cancellation path. Entries are settled by value, so a
//! request can only be resolved or rejected once.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use avabridge_shared::{GuestMessage, GuestMessageKind, HostMessageKind};

use crate::error::BridgeError;

/// What settles a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Awaiting {
    /// An `ACK` carrying the request's `messageId`
    Ack,
    /// An event of this kind carrying the request's `messageId`
    Event(GuestMessageKind),
}

impl Awaiting {
    pub fn for_kind(kind: HostMessageKind) -> Self {
        match kind {
            HostMessageKind::TakeSnapshot => Awaiting::Event(GuestMessageKind::SnapshotReady),
            HostMessageKind::Ping => Awaiting::Event(GuestMessageKind::Pong),
            _ => Awaiting::Ack,
        }
    }
}

/// How a request was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    /// Posted without waiting (acknowledgments disabled)
    Sent,
    Ack,
    Event(GuestMessage),
}

#[derive(Debug)]
pub(crate) struct Delivery {
    pub reply: Reply,
    pub first_sent_at: Instant,
    pub received_at: Instant,
}

pub(crate) type Completion = oneshot::Sender<Result<Delivery, BridgeError>>;

pub(crate) struct PendingMessage {
    pub message_id: String,
    pub kind: HostMessageKind,
    /// Serialized form, retransmitted verbatim
    pub payload: String,
    pub awaiting: Awaiting,
    pub first_sent_at: Instant,
    pub sent_at: Instant,
    pub retry_count: u32,
    pub token: u64,
    pub completion: Completion,
    pub timer: Option<AbortHandle>,
}

impl PendingMessage {
    pub fn resolve(self, reply: Reply) {
        let delivery = Delivery {
            reply,
            first_sent_at: self.first_sent_at,
            received_at: Instant::now(),
        };
        self.finish(Ok(delivery));
    }

    pub fn reject(self, error: BridgeError) {
        self.finish(Err(error));
    }

    fn finish(self, result: Result<Delivery, BridgeError>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.completion.send(result);
    }
}

/// Tracks in-flight requests keyed by message id.
#[derive(Default)]
pub(crate) struct PendingRequests {
    inner: HashMap<String, PendingMessage>,
    next_token: u64,
}

impl PendingRequests {
    /// Token distinguishing this registration from any earlier one with the same id.
    pub fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    pub fn insert(&mut self, pending: PendingMessage) {
        self.inner.insert(pending.message_id.clone(), pending);
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.inner.contains_key(message_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn awaiting(&self, message_id: &str) -> Option<Awaiting> {
        self.inner.get(message_id).map(|p| p.awaiting)
    }

    /// The entry registered under `token`, if it is still pending.
    pub fn get_mut(&mut self, message_id: &str, token: u64) -> Option<&mut PendingMessage> {
        self.inner
            .get_mut(message_id)
            .filter(|pending| pending.token == token)
    }

    pub fn take(&mut self, message_id: &str) -> Option<PendingMessage> {
        self.inner.remove(message_id)
    }

    /// Remove the longest-waiting request settled by `awaiting`.
    pub fn take_oldest(&mut self, awaiting: Awaiting) -> Option<PendingMessage> {
        let oldest = self
            .inner
            .values()
            .filter(|p| p.awaiting == awaiting)
            .min_by_key(|p| p.token)
            .map(|p| p.message_id.clone())?;
        self.inner.remove(&oldest)
    }

    /// Reject every entry with `Cancelled`. Returns how many were pending.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.inner.len();
        for (_, pending) in self.inner.drain() {
            pending.reject(BridgeError::Cancelled);
        }
        count
    }
}
