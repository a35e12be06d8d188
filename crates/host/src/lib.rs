//! Avabridge Host - Request/acknowledgment bridge for the native shell
//!
//! [`BridgeController`] wraps a one-way [`MessageSink`](avabridge_shared::MessageSink)
//! to the embedded guest and turns it into awaitable commands:
//!
//! - every command is tagged with a fresh `messageId`
//! - replies are correlated by id; unanswered commands are retransmitted
//!   and finally rejected with [`BridgeError::Timeout`]
//! - commands issued before the guest is `READY` are queued and flushed in
//!   order once it is
//! - connection status and telemetry are published through a watch channel
//!
//! The host feeds raw inbound transport events to
//! [`BridgeController::receive`].

pub mod controller;
pub mod error;
pub mod event_bus;
pub mod options;
mod pending;
mod queue;
pub mod state;

pub use controller::{BridgeController, CameraView};
pub use error::BridgeError;
pub use event_bus::EventBus;
pub use options::{BridgeOptions, RetryBackoff};
pub use pending::Awaiting;
pub use state::{BridgeState, ChannelError, ConnectionStatus, Transition};
