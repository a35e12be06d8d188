//! Outbound queue for sends issued before the channel is ready.

use std::collections::VecDeque;

use tokio::time::Instant;

use avabridge_shared::HostMessage;

use crate::error::BridgeError;
use crate::pending::{Awaiting, Completion};

pub(crate) struct QueuedMessage {
    /// Already carries its `messageId`
    pub message: HostMessage,
    pub awaiting: Awaiting,
    pub completion: Completion,
    pub queued_at: Instant,
}

/// FIFO of not-yet-transmitted sends.
#[derive(Default)]
pub(crate) struct MessageQueue {
    inner: VecDeque<QueuedMessage>,
}

impl MessageQueue {
    pub fn push(&mut self, queued: QueuedMessage) {
        self.inner.push_back(queued);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.inner
            .iter()
            .any(|q| q.message.message_id() == Some(message_id))
    }

    /// Remove everything, oldest first.
    pub fn drain(&mut self) -> Vec<QueuedMessage> {
        self.inner.drain(..).collect()
    }

    /// Settle every queued caller with `Cancelled`. Returns how many were queued.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.inner.len();
        for queued in self.inner.drain(..) {
            let _ = queued.completion.send(Err(BridgeError::Cancelled));
        }
        count
    }
}
