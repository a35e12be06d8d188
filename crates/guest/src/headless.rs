//! Headless renderer.
//!
//! A [`GuestHandlers`] implementation with no GPU behind it: it logs what
//! it was asked to show, simulates load latency, and captures a fixed 1x1
//! PNG. Used by the loopback binary and by integration tests.

use std::time::Duration;

use async_trait::async_trait;

use avabridge_shared::{AvatarConfig, CameraTarget, Snapshot, SnapshotFormat, SnapshotOptions};

use crate::handlers::{GuestHandlers, HandlerError};

/// A single transparent pixel, 8-bit grayscale + alpha.
const BLANK_PNG: [u8; 68] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00, 0x00, 0xb5,
    0x1c, 0x0c, 0x02, 0x00, 0x00, 0x00, 0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64,
    0x60, 0x00, 0x00, 0x00, 0x06, 0x00, 0x02, 0x30, 0x81, 0xd0, 0x2f, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

#[derive(Debug, Clone, Default)]
pub struct HeadlessRenderer {
    load_latency: Duration,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every avatar/asset load by `latency`.
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    async fn simulate_load(&self) {
        if !self.load_latency.is_zero() {
            tokio::time::sleep(self.load_latency).await;
        }
    }
}

#[async_trait]
impl GuestHandlers for HeadlessRenderer {
    fn on_init(&self, config: &AvatarConfig) -> Result<(), HandlerError> {
        tracing::debug!(avatar_id = ?config.avatar_id, "Headless init");
        Ok(())
    }

    fn on_config_change(&self, delta: &AvatarConfig) -> Result<(), HandlerError> {
        tracing::debug!(?delta, "Headless config change");
        Ok(())
    }

    fn on_pose_change(&self, pose: &str) -> Result<(), HandlerError> {
        if pose.trim().is_empty() {
            return Err(HandlerError::new("Pose name is empty"));
        }
        tracing::debug!(pose, "Headless pose change");
        Ok(())
    }

    fn on_camera_change(&self, camera: CameraTarget) -> Result<(), HandlerError> {
        tracing::debug!(
            fov = camera.fov,
            duration_seconds = camera.duration_seconds,
            "Headless camera move"
        );
        Ok(())
    }

    fn on_interactive_change(&self, enabled: bool) -> Result<(), HandlerError> {
        tracing::debug!(enabled, "Headless interactive toggle");
        Ok(())
    }

    async fn on_snapshot_request(
        &self,
        options: SnapshotOptions,
    ) -> Result<Snapshot, HandlerError> {
        if options.format != SnapshotFormat::Png {
            tracing::debug!(
                requested = ?options.format,
                "Headless renderer only captures PNG"
            );
        }
        Ok(Snapshot::from_bytes(&BLANK_PNG, 1, 1, SnapshotFormat::Png))
    }

    async fn on_avatar_change(
        &self,
        avatar_id: String,
        url: Option<String>,
    ) -> Result<(), HandlerError> {
        if avatar_id.trim().is_empty() {
            return Err(HandlerError::new("Avatar id is empty"));
        }
        self.simulate_load().await;
        tracing::debug!(avatar_id = %avatar_id, url = ?url, "Headless avatar loaded");
        Ok(())
    }

    async fn on_load_asset(&self, category: String, url: String) -> Result<(), HandlerError> {
        if url.trim().is_empty() {
            return Err(HandlerError::new(format!("No URL for {category} asset")));
        }
        self.simulate_load().await;
        tracing::debug!(category = %category, url = %url, "Headless asset loaded");
        Ok(())
    }
}
