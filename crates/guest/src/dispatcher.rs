//! Guest dispatcher - routes host commands to the renderer and replies.
//!
//! Inbound strings are decoded, gated on the guest phase, and routed by type
//! to exactly one [`GuestHandlers`] callback. Replies follow the bridge
//! protocol:
//!
//! - Most commands are acknowledged with `ACK` once applied
//! - `TAKE_SNAPSHOT` is never acknowledged; `SNAPSHOT_READY` is the reply
//! - `PING` is answered with `PONG`, never `ACK`
//! - `SET_AVATAR` / `LOAD_ASSET` are acknowledged on receipt and followed by
//!   a loaded event (or `LOAD_ERROR`) when the load actually finishes
//!
//! Handler failures never escape: they become `ERROR` events carrying the
//! command's `messageId` so the host can reject the matching request.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, Stream, StreamExt};
use tokio::sync::Mutex;

use avabridge_shared::{
    extract_message_id, parse_host_message, serialize, AvatarConfig, BridgeErrorCode,
    CameraPreset, CameraTarget, GuestMessage, HostMessage, HostMessageKind, MessageSink,
    PerfReport, SnapshotOptions, PROTOCOL_VERSION,
};

use crate::handlers::{GuestHandlers, HandlerError};
use crate::state::{GuestPhase, GuestState};

const CAMERA_TRANSITION: &str = "camera";

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct GuestOptions {
    /// Log every dispatched command and every ignored unknown type
    pub debug: bool,
}

impl GuestOptions {
    /// Read options from the process environment.
    ///
    /// Supported environment variables:
    /// - AVABRIDGE_DEBUG: `true`/`false` (also `1`/`0`, `yes`/`no`, `on`/`off`)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(val) = lookup("AVABRIDGE_DEBUG") {
            match parse_flag(&val) {
                Some(debug) => options.debug = debug,
                None => tracing::warn!(val = %val, "AVABRIDGE_DEBUG is not a valid boolean, ignoring"),
            }
        }
        options
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// Outbox
// =============================================================================

/// Cloneable handle for posting events to the host.
///
/// Handed to the renderer so it can report progress and telemetry outside
/// of any command.
#[derive(Clone)]
pub struct Outbox {
    sink: Arc<dyn MessageSink>,
}

impl Outbox {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Serialize and post an event. Transport failures are logged and dropped.
    pub fn emit(&self, message: GuestMessage) {
        let kind = message.kind();
        if let Err(e) = self.sink.post(serialize(&message)) {
            tracing::warn!(message_type = %kind, error = %e, "Failed to post guest event");
        }
    }

    fn ack(&self, message_id: Option<&str>) {
        if let Some(message_id) = message_id {
            self.emit(GuestMessage::Ack {
                message_id: message_id.to_owned(),
                success: true,
            });
        }
    }

    fn error(
        &self,
        code: BridgeErrorCode,
        message: impl Into<String>,
        stack: Option<String>,
        message_id: Option<String>,
    ) {
        self.emit(GuestMessage::Error {
            message: message.into(),
            code,
            stack,
            message_id,
        });
    }

    /// Loading progress; `percent` is clamped to `0..=100`.
    pub fn report_progress(&self, percent: f64, stage: impl Into<String>) {
        let percent = finite_or_zero(percent).clamp(0.0, 100.0);
        self.emit(GuestMessage::LoadingProgress {
            percent,
            stage: stage.into(),
        });
    }

    /// Frame-rate sample; a non-finite `fps` is reported as 0.
    pub fn report_fps(&self, fps: f64) {
        self.emit(GuestMessage::FpsUpdate {
            fps: finite_or_zero(fps),
        });
    }

    /// Non-finite timings are reported as 0 so the sample still decodes.
    pub fn report_performance(&self, report: PerfReport) {
        self.emit(GuestMessage::perf_report(PerfReport {
            fps: finite_or_zero(report.fps),
            frame_time_ms: finite_or_zero(report.frame_time_ms),
            memory_mb: report.memory_mb.map(finite_or_zero),
            ..report
        }));
    }

    /// Channel-scoped failure not tied to any command (no `messageId`).
    pub fn report_error(&self, code: BridgeErrorCode, message: impl Into<String>) {
        self.error(code, message, None, None);
    }
}

/// JSON has no NaN or infinity; they would serialize as `null` and fail to decode.
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Error code reported when the handler for `kind` fails.
fn failure_code(kind: HostMessageKind) -> BridgeErrorCode {
    match kind {
        HostMessageKind::InitAvatar => BridgeErrorCode::InitError,
        HostMessageKind::UpdateConfig => BridgeErrorCode::ConfigError,
        HostMessageKind::SetAvatar => BridgeErrorCode::AvatarLoadError,
        HostMessageKind::LoadAsset => BridgeErrorCode::AssetLoadError,
        HostMessageKind::TakeSnapshot => BridgeErrorCode::SnapshotError,
        HostMessageKind::SetPose
        | HostMessageKind::SetCamera
        | HostMessageKind::SetCameraPreset
        | HostMessageKind::SetInteractive
        | HostMessageKind::Ping => BridgeErrorCode::UnknownError,
    }
}

/// Run a handler future, turning a panic into a [`HandlerError`] so one bad
/// callback cannot stop the dispatch loop.
async fn guarded<T>(
    handler: impl Future<Output = Result<T, HandlerError>>,
) -> Result<T, HandlerError> {
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            tracing::error!(error = %message, "Guest handler panicked");
            Err(HandlerError::new(message))
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Command dispatcher running inside the embedded renderer.
pub struct GuestDispatcher {
    handlers: Arc<dyn GuestHandlers>,
    outbox: Outbox,
    options: GuestOptions,
    state: Arc<Mutex<GuestState>>,
}

impl GuestDispatcher {
    pub fn new(
        handlers: Arc<dyn GuestHandlers>,
        sink: Arc<dyn MessageSink>,
        options: GuestOptions,
    ) -> Self {
        Self {
            handlers,
            outbox: Outbox::new(sink),
            options,
            state: Arc::new(Mutex::new(GuestState::default())),
        }
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Signal that the transport back to the host is available.
    pub async fn announce_ready(&self) {
        let phase = self.state.lock().await.announce();
        tracing::info!(
            version = PROTOCOL_VERSION,
            phase = phase.as_str(),
            "Guest announcing ready"
        );
        self.outbox.emit(GuestMessage::Ready {
            version: PROTOCOL_VERSION.to_string(),
        });
    }

    /// Dispatch every inbound string until the host side of the channel closes.
    pub async fn run<S>(&self, mut inbound: S)
    where
        S: Stream<Item = String> + Unpin,
    {
        while let Some(raw) = inbound.next().await {
            self.handle_raw(&raw).await;
        }
        tracing::debug!("Host channel closed, guest dispatcher stopping");
    }

    /// Entry point for one raw transport event.
    pub async fn handle_raw(&self, raw: &str) {
        match parse_host_message(raw) {
            Ok(message) => self.handle(message).await,
            Err(e) if e.is_unknown_type() => {
                if self.options.debug {
                    tracing::debug!(error = %e, "Ignoring unrecognized host command");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse host message");
                self.outbox.error(
                    BridgeErrorCode::MessageParseError,
                    e.to_string(),
                    None,
                    extract_message_id(raw),
                );
            }
        }
    }

    pub async fn handle(&self, message: HostMessage) {
        let kind = message.kind();
        let message_id = message.message_id().map(str::to_owned);

        if self.options.debug {
            tracing::debug!(message_type = %kind, message_id = ?message_id, "Dispatching host command");
        }

        if !self.state.lock().await.accepts(kind) {
            tracing::warn!(message_type = %kind, "Command received before initialization");
            self.outbox.error(
                BridgeErrorCode::InitError,
                format!("{kind} received before INIT_AVATAR"),
                None,
                message_id,
            );
            return;
        }

        let result = guarded(self.route(message, message_id.clone())).await;
        if let Err(err) = result {
            tracing::warn!(message_type = %kind, error = %err, "Guest handler failed");
            self.outbox.error(failure_code(kind), err.message, err.stack, message_id);
        }
    }

    async fn route(
        &self,
        message: HostMessage,
        message_id: Option<String>,
    ) -> Result<(), HandlerError> {
        let id = message_id.as_deref();
        match message {
            HostMessage::InitAvatar { config, .. } => self.init_avatar(config, id).await,
            HostMessage::UpdateConfig { config, .. } => self.update_config(config, id).await,
            HostMessage::SetPose { pose, .. } => self.set_pose(pose, id).await,
            HostMessage::SetCamera {
                position,
                target,
                preset,
                fov,
                duration,
                ..
            } => {
                let camera = CameraTarget::resolve(preset, position, target, fov, duration);
                self.move_camera(camera, preset, id).await
            }
            HostMessage::SetCameraPreset {
                preset, duration, ..
            } => {
                let camera = CameraTarget::resolve(Some(preset), None, None, None, duration);
                self.move_camera(camera, Some(preset), id).await
            }
            HostMessage::SetInteractive { enabled, .. } => self.set_interactive(enabled, id).await,
            HostMessage::Ping { .. } => {
                self.outbox.emit(GuestMessage::Pong {
                    message_id: message_id.clone(),
                    timestamp: Some(chrono::Utc::now().timestamp_millis()),
                });
                Ok(())
            }
            HostMessage::TakeSnapshot {
                format,
                quality,
                width,
                height,
                transparent,
                ..
            } => {
                let options = SnapshotOptions {
                    format,
                    quality,
                    width,
                    height,
                    transparent,
                };
                self.spawn_snapshot(options, message_id.clone());
                Ok(())
            }
            HostMessage::SetAvatar { avatar_id, url, .. } => {
                self.outbox.ack(id);
                self.spawn_avatar_load(avatar_id, url, message_id.clone());
                Ok(())
            }
            HostMessage::LoadAsset { category, url, .. } => {
                self.outbox.ack(id);
                self.spawn_asset_load(category, url, message_id.clone());
                Ok(())
            }
        }
    }

    async fn init_avatar(
        &self,
        config: AvatarConfig,
        message_id: Option<&str>,
    ) -> Result<(), HandlerError> {
        self.outbox.emit(GuestMessage::InitStarted);

        let phase = {
            let mut state = self.state.lock().await;
            let rollback = state.clone();
            state.begin_init(config.clone());
            if let Err(err) = self.handlers.on_init(&config) {
                *state = rollback;
                return Err(err);
            }
            state.complete_init()
        };

        self.outbox.ack(message_id);
        self.outbox.emit(GuestMessage::ConfigApplied { config });
        tracing::info!(phase = phase.as_str(), "Avatar initialized");
        Ok(())
    }

    async fn update_config(
        &self,
        delta: AvatarConfig,
        message_id: Option<&str>,
    ) -> Result<(), HandlerError> {
        self.handlers.on_config_change(&delta)?;
        self.state.lock().await.config.merge(&delta);
        self.outbox.emit(GuestMessage::ConfigApplied { config: delta });
        self.outbox.ack(message_id);
        Ok(())
    }

    async fn set_pose(&self, pose: String, message_id: Option<&str>) -> Result<(), HandlerError> {
        self.handlers.on_pose_change(&pose)?;
        self.state.lock().await.pose = Some(pose);
        self.outbox.ack(message_id);
        Ok(())
    }

    async fn move_camera(
        &self,
        camera: CameraTarget,
        preset: Option<CameraPreset>,
        message_id: Option<&str>,
    ) -> Result<(), HandlerError> {
        self.handlers.on_camera_change(camera)?;
        self.state.lock().await.camera = Some(camera);
        self.outbox.ack(message_id);

        let animated = camera.is_animated();
        if animated {
            self.outbox.emit(GuestMessage::TransitionStart {
                transition: CAMERA_TRANSITION.to_string(),
            });
        }
        self.outbox.emit(GuestMessage::CameraApplied {
            position: camera.position,
            target: camera.target,
            fov: camera.fov,
            preset,
        });

        if animated {
            let outbox = self.outbox.clone();
            let duration =
                Duration::try_from_secs_f64(camera.duration_seconds).unwrap_or_default();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                outbox.emit(GuestMessage::TransitionComplete {
                    transition: CAMERA_TRANSITION.to_string(),
                });
            });
        }
        Ok(())
    }

    async fn set_interactive(
        &self,
        enabled: bool,
        message_id: Option<&str>,
    ) -> Result<(), HandlerError> {
        self.handlers.on_interactive_change(enabled)?;
        self.state.lock().await.interactive = enabled;
        self.outbox.ack(message_id);
        self.outbox.emit(GuestMessage::InteractiveApplied { enabled });
        Ok(())
    }

    fn spawn_snapshot(&self, options: SnapshotOptions, message_id: Option<String>) {
        let handlers = Arc::clone(&self.handlers);
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            match guarded(async { handlers.on_snapshot_request(options).await }).await {
                Ok(snapshot) => {
                    tracing::debug!(
                        width = snapshot.width,
                        height = snapshot.height,
                        "Snapshot captured"
                    );
                    outbox.emit(GuestMessage::snapshot_ready(snapshot, message_id));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Snapshot capture failed");
                    outbox.error(
                        BridgeErrorCode::SnapshotError,
                        err.message,
                        err.stack,
                        message_id,
                    );
                }
            }
        });
    }

    fn spawn_avatar_load(&self, avatar_id: String, url: Option<String>, message_id: Option<String>) {
        let handlers = Arc::clone(&self.handlers);
        let outbox = self.outbox.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let load = async { handlers.on_avatar_change(avatar_id.clone(), url.clone()).await };
            match guarded(load).await {
                Ok(()) => {
                    state.lock().await.config.avatar_id = Some(avatar_id.clone());
                    tracing::info!(avatar_id = %avatar_id, "Avatar loaded");
                    outbox.emit(GuestMessage::AvatarLoaded {
                        avatar_id,
                        message_id,
                    });
                }
                Err(err) => {
                    tracing::warn!(avatar_id = %avatar_id, error = %err, "Avatar load failed");
                    outbox.emit(GuestMessage::LoadError {
                        message: err.message.clone(),
                        url,
                        message_id: message_id.clone(),
                    });
                    outbox.error(
                        BridgeErrorCode::AvatarLoadError,
                        err.message,
                        err.stack,
                        message_id,
                    );
                }
            }
        });
    }

    fn spawn_asset_load(&self, category: String, url: String, message_id: Option<String>) {
        let handlers = Arc::clone(&self.handlers);
        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            let load = async { handlers.on_load_asset(category.clone(), url.clone()).await };
            match guarded(load).await {
                Ok(()) => {
                    tracing::info!(category = %category, url = %url, "Asset loaded");
                    outbox.emit(GuestMessage::AssetLoaded {
                        category,
                        url,
                        message_id,
                    });
                }
                Err(err) => {
                    tracing::warn!(category = %category, url = %url, error = %err, "Asset load failed");
                    outbox.emit(GuestMessage::LoadError {
                        message: err.message.clone(),
                        url: Some(url),
                        message_id: message_id.clone(),
                    });
                    outbox.error(
                        BridgeErrorCode::AssetLoadError,
                        err.message,
                        err.stack,
                        message_id,
                    );
                }
            }
        });
    }

    // =========================================================================
    // Renderer-facing reporting
    // =========================================================================

    pub fn report_progress(&self, percent: f64, stage: impl Into<String>) {
        self.outbox.report_progress(percent, stage);
    }

    pub fn report_fps(&self, fps: f64) {
        self.outbox.report_fps(fps);
    }

    pub fn report_performance(&self, report: PerfReport) {
        self.outbox.report_performance(report);
    }

    pub fn report_error(&self, code: BridgeErrorCode, message: impl Into<String>) {
        self.outbox.report_error(code, message);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub async fn phase(&self) -> GuestPhase {
        self.state.lock().await.phase
    }

    pub async fn config(&self) -> AvatarConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn pose(&self) -> Option<String> {
        self.state.lock().await.pose.clone()
    }

    pub async fn interactive(&self) -> bool {
        self.state.lock().await.interactive
    }

    pub async fn camera(&self) -> Option<CameraTarget> {
        self.state.lock().await.camera
    }
}
