//! Avabridge Loopback - drives a headless guest through the host controller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avabridge_guest::{GuestOptions, HeadlessRenderer};
use avabridge_host::{BridgeOptions, CameraView};
use avabridge_loopback::Loopback;
use avabridge_shared::{AvatarConfig, CameraPreset, SnapshotOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "avabridge_loopback=info,avabridge_host=info,avabridge_guest=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let host_options = BridgeOptions::from_env();
    let guest_options = GuestOptions::from_env();
    let load_latency_ms: u64 = std::env::var("AVABRIDGE_LOAD_LATENCY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(250);
    tracing::info!(
        timeout_ms = host_options.timeout.as_millis() as u64,
        max_retries = host_options.max_retries,
        use_ack = host_options.use_acknowledgment,
        load_latency_ms,
        "Starting loopback bridge"
    );

    let renderer =
        HeadlessRenderer::new().with_load_latency(Duration::from_millis(load_latency_ms));
    let bridge = Loopback::start(Arc::new(renderer), host_options, guest_options).await;
    let host = bridge.host.clone();

    let mut status = host.subscribe_state();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let state = status.borrow_and_update().clone();
            tracing::info!(status = %state.status, fps = ?state.fps, "Bridge state changed");
        }
    });

    host.init_avatar(AvatarConfig {
        avatar_id: Some("default".into()),
        outfit: Some("casual".into()),
        ..Default::default()
    })
    .await
    .context("INIT_AVATAR")?;

    host.set_pose("wave").await.context("SET_POSE")?;
    host.set_camera(CameraView::Preset(CameraPreset::Closeup), Some(0.5))
        .await
        .context("SET_CAMERA")?;
    host.load_asset("outfit", "https://assets.example/jacket.glb")
        .await
        .context("LOAD_ASSET")?;

    let snapshot = host
        .take_snapshot(SnapshotOptions::png())
        .await
        .context("TAKE_SNAPSHOT")?;
    let bytes = snapshot.decode().context("decoding snapshot")?;
    tracing::info!(
        width = snapshot.width,
        height = snapshot.height,
        bytes = bytes.len(),
        "Snapshot captured"
    );

    let latency = host.ping().await.context("PING")?;
    tracing::info!(latency_us = latency.as_micros() as u64, "Ping");

    bridge.shutdown().await;
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
