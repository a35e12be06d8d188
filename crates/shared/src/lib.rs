//! Avabridge Shared - Types shared by the native host and the embedded guest
//!
//! This crate contains everything both ends of the avatar bridge agree on:
//! - Wire message types (HostMessage, GuestMessage)
//! - The string codec and direction type guards
//! - Error classification codes
//! - The one-way transport port
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - serde, serde_json, base64, thiserror, futures-channel
//! 2. **No behavior** - pure data, serialization, and the transport seam
//! 3. **Runtime agnostic** - no tokio, so the guest can run on any executor

pub mod codec;
pub mod errors;
pub mod messages;
pub mod transport;
pub mod types;

// =============================================================================
// Bridge Message Types
// =============================================================================
pub use messages::{
    GuestMessage, GuestMessageKind, HostMessage, HostMessageKind, GUEST_MESSAGE_TYPES,
    HOST_MESSAGE_TYPES,
};

// =============================================================================
// Codec
// =============================================================================
pub use codec::{
    extract_message_id, is_guest_message, is_host_message, parse_guest_message,
    parse_host_message, serialize, ParseError,
};

// =============================================================================
// Errors
// =============================================================================
pub use errors::BridgeErrorCode;

// =============================================================================
// Transport
// =============================================================================
pub use transport::{channel, ChannelSink, MessageSink, TransportError};

// =============================================================================
// Value Types
// =============================================================================
pub use types::{
    is_compatible_version, AvatarConfig, CameraPreset, CameraTarget, PerfReport, Snapshot,
    SnapshotFormat, SnapshotOptions, Vec3, DEFAULT_CAMERA_TRANSITION_SECONDS,
    DEFAULT_SNAPSHOT_QUALITY, PROTOCOL_VERSION,
};
