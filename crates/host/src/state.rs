//! Connection status and telemetry derived from guest events.
//!
//! Transitions are driven only by inbound events (plus the host's own
//! `begin_connecting`, transport faults and `reset`).

use avabridge_shared::{is_compatible_version, BridgeErrorCode, GuestMessage, PerfReport};

/// Connection status of one bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Nothing heard from the guest yet, or reset
    #[default]
    Disconnected,
    /// Web view loading or guest initializing
    Connecting,
    /// Guest announced `READY`; sends are transmitted
    Ready,
    /// Channel-scoped fault; see `BridgeState::last_error`
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Ready => "ready",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fault affecting the whole channel rather than one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelError {
    pub code: BridgeErrorCode,
    pub message: String,
}

/// Observable per-bridge state, published to subscribers on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BridgeState {
    pub status: ConnectionStatus,
    pub last_error: Option<ChannelError>,
    pub fps: Option<f64>,
    pub loading_progress: Option<f64>,
    pub loading_stage: Option<String>,
    /// Protocol version from the most recent `READY`
    pub guest_version: Option<String>,
    pub perf: Option<PerfReport>,
}

/// Effect of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Updated,
    /// Status entered `Ready`; the queue should be flushed
    BecameReady,
}

impl BridgeState {
    pub fn is_ready(&self) -> bool {
        self.status == ConnectionStatus::Ready
    }

    /// Fold one guest event into the state.
    pub fn apply(&mut self, event: &GuestMessage) -> Transition {
        match event {
            GuestMessage::InitStarted => {
                if self.status == ConnectionStatus::Disconnected {
                    self.status = ConnectionStatus::Connecting;
                    Transition::Updated
                } else {
                    Transition::Unchanged
                }
            }
            GuestMessage::Ready { version } => {
                let was_ready = self.is_ready();
                self.status = ConnectionStatus::Ready;
                self.last_error = None;
                self.guest_version = Some(version.clone());
                if was_ready {
                    Transition::Updated
                } else {
                    Transition::BecameReady
                }
            }
            GuestMessage::Error {
                message,
                code,
                message_id: None,
                ..
            } => {
                self.fault(*code, message.clone());
                Transition::Updated
            }
            GuestMessage::FpsUpdate { fps } => {
                self.fps = Some(*fps);
                Transition::Updated
            }
            GuestMessage::PerfReport { .. } => {
                let report = event.as_perf_report();
                self.fps = report.as_ref().map(|r| r.fps).or(self.fps);
                self.perf = report;
                Transition::Updated
            }
            GuestMessage::LoadingProgress { percent, stage } => {
                self.loading_progress = Some(*percent);
                self.loading_stage = Some(stage.clone());
                Transition::Updated
            }
            _ => Transition::Unchanged,
        }
    }

    /// Host started loading the guest. Returns true if the status changed.
    pub fn begin_connecting(&mut self) -> bool {
        match self.status {
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {
                self.status = ConnectionStatus::Connecting;
                self.last_error = None;
                true
            }
            ConnectionStatus::Connecting | ConnectionStatus::Ready => false,
        }
    }

    /// Record a channel-scoped fault.
    pub fn fault(&mut self, code: BridgeErrorCode, message: String) {
        self.status = ConnectionStatus::Error;
        self.last_error = Some(ChannelError { code, message });
    }

    /// True when the announced guest version shares our major version.
    pub fn guest_is_compatible(&self) -> bool {
        self.guest_version
            .as_deref()
            .is_some_and(is_compatible_version)
    }
}
