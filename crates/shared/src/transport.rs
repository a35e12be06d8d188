//! Transport port for the bridge channel.
//!
//! Each side posts serialized strings through a [`MessageSink`]; delivery is
//! one-way and order-preserving per direction. The port is deliberately
//! runtime-agnostic (no tokio, no web-sys) so the same trait serves the native
//! shell, the embedded renderer, and in-process tests.

use futures_channel::mpsc;

/// Failure to hand a payload to the underlying channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The receiving side is gone
    #[error("Transport closed")]
    Closed,
    /// The platform primitive rejected the payload
    #[error("Transport failed: {0}")]
    Failed(String),
}

/// One-way, postMessage-style string channel.
pub trait MessageSink: Send + Sync {
    fn post(&self, payload: String) -> Result<(), TransportError>;
}

/// In-process sink backed by an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl MessageSink for ChannelSink {
    fn post(&self, payload: String) -> Result<(), TransportError> {
        self.tx
            .unbounded_send(payload)
            .map_err(|_| TransportError::Closed)
    }
}

/// Create a sink and the receiver that drains it.
pub fn channel() -> (ChannelSink, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded();
    (ChannelSink::new(tx), rx)
}
