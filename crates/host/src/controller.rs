//! Host bridge controller.
//!
//! Turns the one-way transport into awaitable requests. Every outbound
//! command gets a `messageId`, a pending-table entry and a retry timer;
//! inbound events settle entries by id. Sends issued before the guest is
//! `READY` wait in a FIFO queue that is flushed after a short settle delay.
//!
//! All mutable state (pending table, queue, status) is owned by one
//! controller and only touched under its lock.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::Instant;

use avabridge_shared::{
    is_compatible_version, parse_guest_message, serialize, AvatarConfig, BridgeErrorCode,
    CameraPreset, GuestMessage, HostMessage, HostMessageKind, MessageSink, Snapshot,
    SnapshotOptions, Vec3, PROTOCOL_VERSION,
};

use crate::error::BridgeError;
use crate::event_bus::EventBus;
use crate::options::BridgeOptions;
use crate::pending::{Awaiting, Completion, Delivery, PendingMessage, PendingRequests, Reply};
use crate::queue::{MessageQueue, QueuedMessage};
use crate::state::{BridgeState, ConnectionStatus, Transition};

/// Camera placement for [`BridgeController::set_camera`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraView {
    Preset(CameraPreset),
    Explicit {
        position: Vec3,
        target: Vec3,
        fov: Option<f64>,
    },
}

struct Core {
    pending: PendingRequests,
    queue: MessageQueue,
    /// Bumped on reset; stale flushes compare against it
    generation: u64,
    flush_scheduled: bool,
    disposed: bool,
}

struct Inner {
    options: BridgeOptions,
    sink: Arc<dyn MessageSink>,
    core: Mutex<Core>,
    state_tx: watch::Sender<BridgeState>,
    events: EventBus,
}

/// Request/acknowledgment controller for one host/guest bridge.
///
/// Cheap to clone; clones share the same bridge.
#[derive(Clone)]
pub struct BridgeController {
    inner: Arc<Inner>,
}

impl BridgeController {
    pub fn new(sink: Arc<dyn MessageSink>, options: BridgeOptions) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::default());
        Self {
            inner: Arc::new(Inner {
                options,
                sink,
                core: Mutex::new(Core {
                    pending: PendingRequests::default(),
                    queue: MessageQueue::default(),
                    generation: 0,
                    flush_scheduled: false,
                    disposed: false,
                }),
                state_tx,
                events: EventBus::new(),
            }),
        }
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    /// Fresh correlation id.
    pub fn next_message_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send any command and wait for whatever settles it.
    ///
    /// `TAKE_SNAPSHOT` and `PING` settle on their reply events; everything
    /// else settles on `ACK` (or on posting, when acknowledgments are off).
    pub async fn send_message(&self, message: HostMessage) -> Result<(), BridgeError> {
        let awaiting = Awaiting::for_kind(message.kind());
        self.request(message, awaiting).await.map(|_| ())
    }

    pub async fn init_avatar(&self, config: AvatarConfig) -> Result<(), BridgeError> {
        self.send_message(HostMessage::InitAvatar {
            config,
            message_id: None,
        })
        .await
    }

    /// Apply a partial configuration.
    pub async fn update_config(&self, delta: AvatarConfig) -> Result<(), BridgeError> {
        self.send_message(HostMessage::UpdateConfig {
            config: delta,
            message_id: None,
        })
        .await
    }

    /// Resolves once the guest acknowledges; `AVATAR_LOADED` follows as an event.
    pub async fn set_avatar(
        &self,
        avatar_id: impl Into<String>,
        url: Option<String>,
    ) -> Result<(), BridgeError> {
        self.send_message(HostMessage::SetAvatar {
            avatar_id: avatar_id.into(),
            url,
            message_id: None,
        })
        .await
    }

    pub async fn load_asset(
        &self,
        category: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<(), BridgeError> {
        self.send_message(HostMessage::LoadAsset {
            category: category.into(),
            url: url.into(),
            message_id: None,
        })
        .await
    }

    pub async fn set_pose(&self, pose: impl Into<String>) -> Result<(), BridgeError> {
        self.send_message(HostMessage::SetPose {
            pose: pose.into(),
            message_id: None,
        })
        .await
    }

    /// Move the camera. `duration` is in seconds.
    pub async fn set_camera(
        &self,
        view: CameraView,
        duration: Option<f64>,
    ) -> Result<(), BridgeError> {
        let message = match view {
            CameraView::Preset(preset) => HostMessage::SetCamera {
                position: None,
                target: None,
                preset: Some(preset),
                fov: None,
                duration,
                message_id: None,
            },
            CameraView::Explicit {
                position,
                target,
                fov,
            } => HostMessage::SetCamera {
                position: Some(position),
                target: Some(target),
                preset: None,
                fov,
                duration,
                message_id: None,
            },
        };
        self.send_message(message).await
    }

    pub async fn set_camera_preset(
        &self,
        preset: CameraPreset,
        duration: Option<f64>,
    ) -> Result<(), BridgeError> {
        self.send_message(HostMessage::SetCameraPreset {
            preset,
            duration,
            message_id: None,
        })
        .await
    }

    pub async fn set_interactive(&self, enabled: bool) -> Result<(), BridgeError> {
        self.send_message(HostMessage::SetInteractive {
            enabled,
            message_id: None,
        })
        .await
    }

    /// Capture a frame. Settled by `SNAPSHOT_READY`, never by `ACK`.
    pub async fn take_snapshot(&self, options: SnapshotOptions) -> Result<Snapshot, BridgeError> {
        let delivery = self
            .request(
                HostMessage::take_snapshot(options, None),
                Awaiting::for_kind(HostMessageKind::TakeSnapshot),
            )
            .await?;
        match delivery.reply {
            Reply::Event(event) => event.into_snapshot().ok_or_else(|| {
                BridgeError::Serialization("snapshot reply was not SNAPSHOT_READY".into())
            }),
            other => Err(BridgeError::Serialization(format!(
                "snapshot settled without an image: {other:?}"
            ))),
        }
    }

    /// Round-trip latency from first transmission to the matching `PONG`.
    pub async fn ping(&self) -> Result<Duration, BridgeError> {
        let delivery = self
            .request(
                HostMessage::Ping { message_id: None },
                Awaiting::for_kind(HostMessageKind::Ping),
            )
            .await?;
        Ok(delivery
            .received_at
            .saturating_duration_since(delivery.first_sent_at))
    }

    async fn request(
        &self,
        mut message: HostMessage,
        awaiting: Awaiting,
    ) -> Result<Delivery, BridgeError> {
        let message_id = message
            .ensure_message_id(|| self.next_message_id())
            .to_owned();
        let (completion, settled) = oneshot::channel();

        {
            let mut core = self.inner.core.lock().await;
            if core.disposed {
                return Err(BridgeError::Cancelled);
            }
            if core.pending.contains(&message_id) || core.queue.contains(&message_id) {
                return Err(BridgeError::DuplicateMessageId(message_id));
            }

            let ready = self.inner.state_tx.borrow().is_ready();
            if !ready || core.flush_scheduled || !core.queue.is_empty() {
                tracing::debug!(
                    message_id = %message_id,
                    message_type = %message.kind(),
                    queued = core.queue.len() + 1,
                    "Bridge not ready, queueing message"
                );
                core.queue.push(QueuedMessage {
                    message,
                    awaiting,
                    completion,
                    queued_at: Instant::now(),
                });
            } else {
                self.inner
                    .transmit(&mut core, message, awaiting, completion);
            }
        }

        settled.await.unwrap_or(Err(BridgeError::Cancelled))
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    /// Inbound entry point for one raw transport event.
    ///
    /// Malformed input is logged and dropped; it never fails the caller.
    pub async fn receive(&self, raw: &str) {
        match parse_guest_message(raw) {
            Ok(event) => self.handle_event(event).await,
            Err(e) if e.is_unknown_type() => {
                if self.inner.options.debug {
                    tracing::debug!(error = %e, "Ignoring unrecognized guest event");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse guest message");
            }
        }
    }

    /// Apply one decoded guest event: update state, settle requests, notify.
    pub async fn handle_event(&self, event: GuestMessage) {
        if self.inner.options.debug {
            tracing::debug!(message_type = %event.kind(), message_id = ?event.message_id(), "Guest event");
        }

        {
            let mut core = self.inner.core.lock().await;

            let mut transition = Transition::Unchanged;
            self.inner.state_tx.send_if_modified(|state| {
                transition = state.apply(&event);
                transition != Transition::Unchanged
            });

            match &event {
                GuestMessage::Ready { version } if !is_compatible_version(version) => {
                    tracing::warn!(
                        guest_version = %version,
                        host_version = PROTOCOL_VERSION,
                        "Guest protocol major version differs"
                    );
                }
                GuestMessage::Error {
                    message,
                    code,
                    message_id: None,
                    ..
                } => {
                    tracing::warn!(code = %code, error = %message, "Channel error reported by guest");
                }
                _ => {}
            }

            correlate(&mut core, &event);

            if transition == Transition::BecameReady {
                self.inner.schedule_flush(&mut core);
            }
        }

        self.inner.events.dispatch(&event).await;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// The host started loading the guest (web view navigation began).
    pub fn begin_connecting(&self) {
        self.inner
            .state_tx
            .send_if_modified(BridgeState::begin_connecting);
    }

    /// Channel-scoped failure outside the protocol, e.g. the web view failed
    /// to load. Surfaced to state and event subscribers as `WEBVIEW_ERROR`.
    pub async fn report_transport_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(error = %message, "Bridge transport failed");
        self.inner.state_tx.send_modify(|state| {
            state.fault(BridgeErrorCode::WebviewError, message.clone());
        });
        self.inner
            .events
            .dispatch(&GuestMessage::Error {
                message,
                code: BridgeErrorCode::WebviewError,
                stack: None,
                message_id: None,
            })
            .await;
    }

    /// Reject every pending and queued request with `Cancelled` and return
    /// to `Disconnected`. Safe to call repeatedly.
    pub async fn reset(&self) {
        let mut core = self.inner.core.lock().await;
        self.inner.cancel_outstanding(&mut core);
    }

    /// Reset and refuse all further sends. Drops event subscribers.
    pub async fn dispose(&self) {
        {
            let mut core = self.inner.core.lock().await;
            core.disposed = true;
            self.inner.cancel_outstanding(&mut core);
        }
        self.inner.events.clear().await;
        tracing::debug!("Bridge disposed");
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn state(&self) -> BridgeState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state_tx.borrow().status
    }

    /// Watch the state; the receiver sees the current value immediately.
    pub fn subscribe_state(&self) -> watch::Receiver<BridgeState> {
        self.inner.state_tx.subscribe()
    }

    /// Receive every guest event (after state and correlation are applied).
    pub async fn subscribe_events(&self, callback: impl FnMut(GuestMessage) + Send + 'static) {
        self.inner.events.subscribe(callback).await;
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.core.lock().await.pending.len()
    }

    pub async fn queued_count(&self) -> usize {
        self.inner.core.lock().await.queue.len()
    }
}

impl Inner {
    /// Post `message` and register it for settlement.
    fn transmit(
        self: &Arc<Self>,
        core: &mut Core,
        message: HostMessage,
        awaiting: Awaiting,
        completion: Completion,
    ) {
        let kind = message.kind();
        let message_id = message.message_id().unwrap_or_default().to_owned();
        let payload = serialize(&message);

        if self.options.debug {
            tracing::debug!(message_id = %message_id, message_type = %kind, "Transmitting");
        }

        if let Err(e) = self.sink.post(payload.clone()) {
            tracing::warn!(message_id = %message_id, error = %e, "Failed to post message");
            let _ = completion.send(Err(BridgeError::Transport(e)));
            return;
        }

        let now = Instant::now();
        if awaiting == Awaiting::Ack && !self.options.use_acknowledgment {
            let _ = completion.send(Ok(Delivery {
                reply: Reply::Sent,
                first_sent_at: now,
                received_at: now,
            }));
            return;
        }

        let token = core.pending.next_token();
        let timer = tokio::spawn(drive_retries(
            Arc::downgrade(self),
            message_id.clone(),
            token,
        ))
        .abort_handle();

        core.pending.insert(PendingMessage {
            message_id,
            kind,
            payload,
            awaiting,
            first_sent_at: now,
            sent_at: now,
            retry_count: 0,
            token,
            completion,
            timer: Some(timer),
        });
    }

    fn cancel_outstanding(&self, core: &mut Core) {
        core.generation += 1;
        core.flush_scheduled = false;
        let pending = core.pending.cancel_all();
        let queued = core.queue.cancel_all();
        self.state_tx.send_replace(BridgeState::default());
        if pending > 0 || queued > 0 {
            tracing::info!(pending, queued, "Bridge reset, outstanding requests cancelled");
        } else {
            tracing::debug!("Bridge reset");
        }
    }

    fn schedule_flush(self: &Arc<Self>, core: &mut Core) {
        if core.flush_scheduled {
            return;
        }
        core.flush_scheduled = true;

        let weak = Arc::downgrade(self);
        let generation = core.generation;
        let settle_delay = self.options.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(settle_delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.flush(generation).await;
            }
        });
    }

    async fn flush(self: &Arc<Self>, generation: u64) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        core.flush_scheduled = false;
        if !self.state_tx.borrow().is_ready() {
            return;
        }

        let queued = core.queue.drain();
        if !queued.is_empty() {
            tracing::info!(count = queued.len(), "Flushing queued messages");
        }
        for item in queued {
            tracing::debug!(
                message_type = %item.message.kind(),
                waited_ms = item.queued_at.elapsed().as_millis() as u64,
                "Sending queued message"
            );
            self.transmit(&mut core, item.message, item.awaiting, item.completion);
        }
    }
}

/// Settle whatever pending request `event` answers.
fn correlate(core: &mut Core, event: &GuestMessage) {
    match event {
        GuestMessage::Ack {
            message_id,
            success,
        } => match core.pending.awaiting(message_id) {
            Some(Awaiting::Ack) => {
                if let Some(pending) = core.pending.take(message_id) {
                    if *success {
                        pending.resolve(Reply::Ack);
                    } else {
                        pending.reject(BridgeError::Rejected {
                            message_id: message_id.clone(),
                        });
                    }
                }
            }
            // Event-settled requests only care about negative acknowledgments
            Some(Awaiting::Event(_)) if !success => {
                if let Some(pending) = core.pending.take(message_id) {
                    pending.reject(BridgeError::Rejected {
                        message_id: message_id.clone(),
                    });
                }
            }
            Some(Awaiting::Event(_)) => {}
            None => {
                tracing::debug!(message_id = %message_id, "ACK for unknown or settled message");
            }
        },
        GuestMessage::Error {
            message,
            code,
            message_id: Some(message_id),
            ..
        } => {
            if let Some(pending) = core.pending.take(message_id) {
                tracing::debug!(message_id = %message_id, code = %code, "Request failed on guest");
                pending.reject(BridgeError::Guest {
                    code: *code,
                    message: message.clone(),
                });
            }
        }
        GuestMessage::LoadError {
            message,
            message_id: Some(message_id),
            ..
        } => {
            if let Some(pending) = core.pending.take(message_id) {
                let code = match pending.kind {
                    HostMessageKind::SetAvatar => BridgeErrorCode::AvatarLoadError,
                    _ => BridgeErrorCode::AssetLoadError,
                };
                pending.reject(BridgeError::Guest {
                    code,
                    message: message.clone(),
                });
            }
        }
        other => {
            let awaiting = Awaiting::Event(other.kind());
            let pending = match other.message_id() {
                Some(id) if core.pending.awaiting(id) == Some(awaiting) => core.pending.take(id),
                Some(_) => None,
                // Older guests omit the id; settle the longest-waiting request
                None => core.pending.take_oldest(awaiting),
            };
            if let Some(pending) = pending {
                pending.resolve(Reply::Event(other.clone()));
            }
        }
    }
}

/// Timeout/retry loop for one pending request.
///
/// Each transmission opens a fresh `timeout` window; on expiry the request is
/// retransmitted after the backoff delay until `max_retries` is spent, then
/// rejected with `Timeout`.
async fn drive_retries(inner: Weak<Inner>, message_id: String, token: u64) {
    let Some(options) = inner.upgrade().map(|i| i.options.clone()) else {
        return;
    };

    loop {
        tokio::time::sleep(options.timeout).await;

        let retry = {
            let Some(strong) = inner.upgrade() else {
                return;
            };
            let mut core = strong.core.lock().await;
            let Some(pending) = core.pending.get_mut(&message_id, token) else {
                return;
            };

            if pending.retry_count >= options.max_retries {
                let attempts = pending.retry_count + 1;
                tracing::warn!(
                    message_id = %message_id,
                    message_type = %pending.kind,
                    attempts,
                    waited_ms = pending.first_sent_at.elapsed().as_millis() as u64,
                    "No reply after all retry attempts"
                );
                if let Some(pending) = core.pending.take(&message_id) {
                    pending.reject(BridgeError::Timeout {
                        message_id: message_id.clone(),
                        attempts,
                    });
                }
                return;
            }

            pending.retry_count += 1;
            pending.retry_count
        };

        let delay = options.retry_delay_for(retry);
        tracing::debug!(
            message_id = %message_id,
            attempt = retry + 1,
            max_retries = options.max_retries,
            delay_ms = delay.as_millis() as u64,
            "No reply, retrying"
        );
        tokio::time::sleep(delay).await;

        let Some(strong) = inner.upgrade() else {
            return;
        };
        let mut core = strong.core.lock().await;
        let Some(pending) = core.pending.get_mut(&message_id, token) else {
            return;
        };
        let since_last = pending.sent_at.elapsed();
        match strong.sink.post(pending.payload.clone()) {
            Ok(()) => {
                pending.sent_at = Instant::now();
                tracing::debug!(
                    message_id = %message_id,
                    since_last_ms = since_last.as_millis() as u64,
                    "Retransmitted"
                );
            }
            Err(e) => {
                tracing::warn!(message_id = %message_id, error = %e, "Retransmission failed");
                if let Some(pending) = core.pending.take(&message_id) {
                    pending.reject(BridgeError::Transport(e));
                }
                return;
            }
        }
    }
}
