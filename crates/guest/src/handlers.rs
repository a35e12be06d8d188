//! Renderer port - the effects the dispatcher drives.
//!
//! The rendering engine implements [`GuestHandlers`]; the dispatcher owns
//! protocol concerns (phases, acknowledgments, error events) and calls into
//! the renderer only to apply a command. Quick, frame-local effects are
//! synchronous. Anything that may span frames or hit the network is async.

use async_trait::async_trait;

use avabridge_shared::{AvatarConfig, CameraTarget, Snapshot, SnapshotOptions};

/// A renderer-side failure while applying a command.
///
/// Carried back to the host as an `ERROR` event; `stack` becomes the event's
/// optional `stack` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub stack: Option<String>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Effect callbacks implemented by the rendering engine.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GuestHandlers: Send + Sync {
    /// Apply a full configuration during initialization
    fn on_init(&self, config: &AvatarConfig) -> Result<(), HandlerError>;

    /// Apply a partial configuration; receives the delta, not the merged result
    fn on_config_change(&self, delta: &AvatarConfig) -> Result<(), HandlerError>;

    fn on_pose_change(&self, pose: &str) -> Result<(), HandlerError>;

    /// Start a camera move to an already resolved target
    fn on_camera_change(&self, camera: CameraTarget) -> Result<(), HandlerError>;

    fn on_interactive_change(&self, enabled: bool) -> Result<(), HandlerError>;

    /// Capture a frame. May take several render frames.
    async fn on_snapshot_request(&self, options: SnapshotOptions)
        -> Result<Snapshot, HandlerError>;

    /// Swap the avatar model, resolving once it is loaded
    async fn on_avatar_change(
        &self,
        avatar_id: String,
        url: Option<String>,
    ) -> Result<(), HandlerError>;

    /// Load an auxiliary asset, resolving once it is loaded
    async fn on_load_asset(&self, category: String, url: String) -> Result<(), HandlerError>;
}
