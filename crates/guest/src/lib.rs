//! Avabridge Guest - Runs inside the embedded avatar renderer
//!
//! Receives host commands from the transport, applies them through the
//! renderer's [`GuestHandlers`] port and replies with acknowledgments and
//! events.
//!
//! ## Layout
//!
//! - `dispatcher` - [`GuestDispatcher`], the protocol state machine
//! - `handlers` - the renderer port and its error type
//! - `state` - the guest-owned config/pose/camera snapshot and phase
//! - `headless` - a GPU-free renderer for tests and the loopback harness

pub mod dispatcher;
pub mod handlers;
pub mod headless;
pub mod state;

pub use dispatcher::{GuestDispatcher, GuestOptions, Outbox};
pub use handlers::{GuestHandlers, HandlerError};
pub use headless::HeadlessRenderer;
pub use state::{GuestPhase, GuestState};

#[cfg(any(test, feature = "testing"))]
pub use handlers::MockGuestHandlers;
