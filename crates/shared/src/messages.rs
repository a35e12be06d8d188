//! Bridge message types for host/guest communication
//!
//! This module contains every message exchanged over the bridge channel.
//! The native shell (host) sends [`HostMessage`] commands and receives
//! [`GuestMessage`] events; the embedded renderer (guest) does the reverse.
//!
//! ## Wire Format
//!
//! - One flat JSON object per transport event
//! - `type` discriminant in SCREAMING_SNAKE_CASE, other fields camelCase
//! - Optional fields are omitted when absent
//! - Unknown fields are ignored on decode (forward compatible)
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Removing or renaming variants is a breaking change and bumps
//!   [`PROTOCOL_VERSION`](crate::PROTOCOL_VERSION)

use serde::{Deserialize, Serialize};

use crate::errors::BridgeErrorCode;
use crate::types::{
    AvatarConfig, CameraPreset, PerfReport, Snapshot, SnapshotFormat, SnapshotOptions, Vec3,
};

// =============================================================================
// Host Messages (Host → Guest)
// =============================================================================

/// Commands from the native shell to the embedded renderer.
///
/// Every command may carry a `messageId`; the host controller always assigns
/// one before transmission so the reply can be correlated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum HostMessage {
    /// Initialize the avatar with a full configuration
    InitAvatar {
        config: AvatarConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Apply a partial configuration on top of the current one
    UpdateConfig {
        config: AvatarConfig,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Swap the avatar model
    SetAvatar {
        avatar_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Load an auxiliary asset (outfit piece, accessory, environment)
    LoadAsset {
        category: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Play a named pose
    SetPose {
        pose: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Move the camera; explicit position/target win over `preset`
    SetCamera {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Vec3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Vec3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<CameraPreset>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fov: Option<f64>,
        /// Transition length in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Move the camera to a named framing
    SetCameraPreset {
        preset: CameraPreset,
        /// Transition length in seconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Capture a frame; answered by `SNAPSHOT_READY`, not `ACK`
    TakeSnapshot {
        #[serde(default)]
        format: SnapshotFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
        #[serde(default)]
        transparent: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Toggle orbit/interactive mode
    SetInteractive {
        enabled: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Liveness check; answered by `PONG`, not `ACK`
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
}

/// Discriminant of a [`HostMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostMessageKind {
    InitAvatar,
    UpdateConfig,
    SetAvatar,
    LoadAsset,
    SetPose,
    SetCamera,
    SetCameraPreset,
    TakeSnapshot,
    SetInteractive,
    Ping,
}

/// Every `type` value a guest accepts.
pub const HOST_MESSAGE_TYPES: [&str; 10] = [
    "INIT_AVATAR",
    "UPDATE_CONFIG",
    "SET_AVATAR",
    "LOAD_ASSET",
    "SET_POSE",
    "SET_CAMERA",
    "SET_CAMERA_PRESET",
    "TAKE_SNAPSHOT",
    "SET_INTERACTIVE",
    "PING",
];

impl HostMessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HostMessageKind::InitAvatar => "INIT_AVATAR",
            HostMessageKind::UpdateConfig => "UPDATE_CONFIG",
            HostMessageKind::SetAvatar => "SET_AVATAR",
            HostMessageKind::LoadAsset => "LOAD_ASSET",
            HostMessageKind::SetPose => "SET_POSE",
            HostMessageKind::SetCamera => "SET_CAMERA",
            HostMessageKind::SetCameraPreset => "SET_CAMERA_PRESET",
            HostMessageKind::TakeSnapshot => "TAKE_SNAPSHOT",
            HostMessageKind::SetInteractive => "SET_INTERACTIVE",
            HostMessageKind::Ping => "PING",
        }
    }
}

impl std::fmt::Display for HostMessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HostMessage {
    pub fn kind(&self) -> HostMessageKind {
        match self {
            HostMessage::InitAvatar { .. } => HostMessageKind::InitAvatar,
            HostMessage::UpdateConfig { .. } => HostMessageKind::UpdateConfig,
            HostMessage::SetAvatar { .. } => HostMessageKind::SetAvatar,
            HostMessage::LoadAsset { .. } => HostMessageKind::LoadAsset,
            HostMessage::SetPose { .. } => HostMessageKind::SetPose,
            HostMessage::SetCamera { .. } => HostMessageKind::SetCamera,
            HostMessage::SetCameraPreset { .. } => HostMessageKind::SetCameraPreset,
            HostMessage::TakeSnapshot { .. } => HostMessageKind::TakeSnapshot,
            HostMessage::SetInteractive { .. } => HostMessageKind::SetInteractive,
            HostMessage::Ping { .. } => HostMessageKind::Ping,
        }
    }

    fn message_id_slot(&mut self) -> &mut Option<String> {
        match self {
            HostMessage::InitAvatar { message_id, .. }
            | HostMessage::UpdateConfig { message_id, .. }
            | HostMessage::SetAvatar { message_id, .. }
            | HostMessage::LoadAsset { message_id, .. }
            | HostMessage::SetPose { message_id, .. }
            | HostMessage::SetCamera { message_id, .. }
            | HostMessage::SetCameraPreset { message_id, .. }
            | HostMessage::TakeSnapshot { message_id, .. }
            | HostMessage::SetInteractive { message_id, .. }
            | HostMessage::Ping { message_id } => message_id,
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            HostMessage::InitAvatar { message_id, .. }
            | HostMessage::UpdateConfig { message_id, .. }
            | HostMessage::SetAvatar { message_id, .. }
            | HostMessage::LoadAsset { message_id, .. }
            | HostMessage::SetPose { message_id, .. }
            | HostMessage::SetCamera { message_id, .. }
            | HostMessage::SetCameraPreset { message_id, .. }
            | HostMessage::TakeSnapshot { message_id, .. }
            | HostMessage::SetInteractive { message_id, .. }
            | HostMessage::Ping { message_id } => message_id.as_deref(),
        }
    }

    /// Return the existing correlation id, assigning one from `generate` if absent.
    pub fn ensure_message_id(&mut self, generate: impl FnOnce() -> String) -> &str {
        self.message_id_slot().get_or_insert_with(generate)
    }

    /// Build a `TAKE_SNAPSHOT` command from capture options.
    pub fn take_snapshot(options: SnapshotOptions, message_id: Option<String>) -> Self {
        HostMessage::TakeSnapshot {
            format: options.format,
            quality: options.quality,
            width: options.width,
            height: options.height,
            transparent: options.transparent,
            message_id,
        }
    }

    /// Capture options of a `TAKE_SNAPSHOT` command.
    pub fn snapshot_options(&self) -> Option<SnapshotOptions> {
        match self {
            HostMessage::TakeSnapshot {
                format,
                quality,
                width,
                height,
                transparent,
                ..
            } => Some(SnapshotOptions {
                format: *format,
                quality: *quality,
                width: *width,
                height: *height,
                transparent: *transparent,
            }),
            _ => None,
        }
    }
}

// =============================================================================
// Guest Messages (Guest → Host)
// =============================================================================

/// Events from the embedded renderer to the native shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum GuestMessage {
    /// Guest started processing `INIT_AVATAR`
    InitStarted,
    /// Guest can receive commands
    Ready { version: String },
    /// Command received and processed
    Ack { message_id: String, success: bool },
    /// Asset loading progress
    LoadingProgress { percent: f64, stage: String },
    /// Avatar model finished loading
    AvatarLoaded {
        avatar_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Auxiliary asset finished loading
    AssetLoaded {
        category: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Configuration (full on init, delta on update) was applied to the avatar
    ConfigApplied { config: AvatarConfig },
    /// A model or asset failed to load
    LoadError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Captured frame, answering `TAKE_SNAPSHOT`
    SnapshotReady {
        base64: String,
        width: u32,
        height: u32,
        #[serde(default)]
        format: SnapshotFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Failure; request-scoped when `messageId` is present, channel-scoped otherwise
    Error {
        message: String,
        code: BridgeErrorCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    /// Frame-rate sample
    FpsUpdate { fps: f64 },
    /// Periodic performance report
    PerfReport {
        fps: f64,
        frame_time_ms: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draw_calls: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        triangles: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memory_mb: Option<f64>,
    },
    /// Reply to `PING`
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// Guest wall clock, milliseconds since the Unix epoch
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Camera move finished applying
    CameraApplied {
        position: Vec3,
        target: Vec3,
        fov: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preset: Option<CameraPreset>,
    },
    /// Interactive mode changed
    InteractiveApplied { enabled: bool },
    /// An animated transition began
    TransitionStart { transition: String },
    /// An animated transition finished
    TransitionComplete { transition: String },
}

/// Discriminant of a [`GuestMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestMessageKind {
    InitStarted,
    Ready,
    Ack,
    LoadingProgress,
    AvatarLoaded,
    AssetLoaded,
    ConfigApplied,
    LoadError,
    SnapshotReady,
    Error,
    FpsUpdate,
    PerfReport,
    Pong,
    CameraApplied,
    InteractiveApplied,
    TransitionStart,
    TransitionComplete,
}

/// Every `type` value a host accepts.
pub const GUEST_MESSAGE_TYPES: [&str; 17] = [
    "INIT_STARTED",
    "READY",
    "ACK",
    "LOADING_PROGRESS",
    "AVATAR_LOADED",
    "ASSET_LOADED",
    "CONFIG_APPLIED",
    "LOAD_ERROR",
    "SNAPSHOT_READY",
    "ERROR",
    "FPS_UPDATE",
    "PERF_REPORT",
    "PONG",
    "CAMERA_APPLIED",
    "INTERACTIVE_APPLIED",
    "TRANSITION_START",
    "TRANSITION_COMPLETE",
];

impl GuestMessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GuestMessageKind::InitStarted => "INIT_STARTED",
            GuestMessageKind::Ready => "READY",
            GuestMessageKind::Ack => "ACK",
            GuestMessageKind::LoadingProgress => "LOADING_PROGRESS",
            GuestMessageKind::AvatarLoaded => "AVATAR_LOADED",
            GuestMessageKind::AssetLoaded => "ASSET_LOADED",
            GuestMessageKind::ConfigApplied => "CONFIG_APPLIED",
            GuestMessageKind::LoadError => "LOAD_ERROR",
            GuestMessageKind::SnapshotReady => "SNAPSHOT_READY",
            GuestMessageKind::Error => "ERROR",
            GuestMessageKind::FpsUpdate => "FPS_UPDATE",
            GuestMessageKind::PerfReport => "PERF_REPORT",
            GuestMessageKind::Pong => "PONG",
            GuestMessageKind::CameraApplied => "CAMERA_APPLIED",
            GuestMessageKind::InteractiveApplied => "INTERACTIVE_APPLIED",
            GuestMessageKind::TransitionStart => "TRANSITION_START",
            GuestMessageKind::TransitionComplete => "TRANSITION_COMPLETE",
        }
    }
}

impl std::fmt::Display for GuestMessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GuestMessage {
    pub fn kind(&self) -> GuestMessageKind {
        match self {
            GuestMessage::InitStarted => GuestMessageKind::InitStarted,
            GuestMessage::Ready { .. } => GuestMessageKind::Ready,
            GuestMessage::Ack { .. } => GuestMessageKind::Ack,
            GuestMessage::LoadingProgress { .. } => GuestMessageKind::LoadingProgress,
            GuestMessage::AvatarLoaded { .. } => GuestMessageKind::AvatarLoaded,
            GuestMessage::AssetLoaded { .. } => GuestMessageKind::AssetLoaded,
            GuestMessage::ConfigApplied { .. } => GuestMessageKind::ConfigApplied,
            GuestMessage::LoadError { .. } => GuestMessageKind::LoadError,
            GuestMessage::SnapshotReady { .. } => GuestMessageKind::SnapshotReady,
            GuestMessage::Error { .. } => GuestMessageKind::Error,
            GuestMessage::FpsUpdate { .. } => GuestMessageKind::FpsUpdate,
            GuestMessage::PerfReport { .. } => GuestMessageKind::PerfReport,
            GuestMessage::Pong { .. } => GuestMessageKind::Pong,
            GuestMessage::CameraApplied { .. } => GuestMessageKind::CameraApplied,
            GuestMessage::InteractiveApplied { .. } => GuestMessageKind::InteractiveApplied,
            GuestMessage::TransitionStart { .. } => GuestMessageKind::TransitionStart,
            GuestMessage::TransitionComplete { .. } => GuestMessageKind::TransitionComplete,
        }
    }

    /// Correlation id, for the event types that carry one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            GuestMessage::Ack { message_id, .. } => Some(message_id),
            GuestMessage::AvatarLoaded { message_id, .. }
            | GuestMessage::AssetLoaded { message_id, .. }
            | GuestMessage::LoadError { message_id, .. }
            | GuestMessage::SnapshotReady { message_id, .. }
            | GuestMessage::Error { message_id, .. }
            | GuestMessage::Pong { message_id, .. } => message_id.as_deref(),
            _ => None,
        }
    }

    /// Build a `SNAPSHOT_READY` event from a captured frame.
    pub fn snapshot_ready(snapshot: Snapshot, message_id: Option<String>) -> Self {
        GuestMessage::SnapshotReady {
            base64: snapshot.base64,
            width: snapshot.width,
            height: snapshot.height,
            format: snapshot.format,
            message_id,
        }
    }

    /// The frame carried by a `SNAPSHOT_READY` event.
    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            GuestMessage::SnapshotReady {
                base64,
                width,
                height,
                format,
                ..
            } => Some(Snapshot {
                base64,
                width,
                height,
                format,
            }),
            _ => None,
        }
    }

    /// Build a `PERF_REPORT` event.
    pub fn perf_report(report: PerfReport) -> Self {
        GuestMessage::PerfReport {
            fps: report.fps,
            frame_time_ms: report.frame_time_ms,
            draw_calls: report.draw_calls,
            triangles: report.triangles,
            memory_mb: report.memory_mb,
        }
    }

    /// The report carried by a `PERF_REPORT` event.
    pub fn as_perf_report(&self) -> Option<PerfReport> {
        match self {
            GuestMessage::PerfReport {
                fps,
                frame_time_ms,
                draw_calls,
                triangles,
                memory_mb,
            } => Some(PerfReport {
                fps: *fps,
                frame_time_ms: *frame_time_ms,
                draw_calls: *draw_calls,
                triangles: *triangles,
                memory_mb: *memory_mb,
            }),
            _ => None,
        }
    }
}
