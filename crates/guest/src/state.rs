//! Guest-owned snapshot of what the renderer currently shows.

use avabridge_shared::{AvatarConfig, CameraTarget, HostMessageKind};

/// Lifecycle of a guest dispatcher.
///
/// There is no terminal phase; the dispatcher lives as long as the embedded
/// context does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GuestPhase {
    /// No `INIT_AVATAR` received yet
    #[default]
    Uninitialized,
    /// Configuration applied, `READY` not yet announced
    Initializing,
    /// Initialized and announced; every command is routed
    Ready,
}

impl GuestPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            GuestPhase::Uninitialized => "uninitialized",
            GuestPhase::Initializing => "initializing",
            GuestPhase::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuestState {
    pub phase: GuestPhase,
    /// `READY` has been emitted on the transport
    pub announced: bool,
    pub config: AvatarConfig,
    pub pose: Option<String>,
    pub interactive: bool,
    pub camera: Option<CameraTarget>,
}

impl GuestState {
    /// Commands other than initialization and liveness are refused until
    /// the avatar has been initialized.
    pub fn accepts(&self, kind: HostMessageKind) -> bool {
        self.phase != GuestPhase::Uninitialized
            || matches!(kind, HostMessageKind::InitAvatar | HostMessageKind::Ping)
    }

    /// Record that `READY` went out. Returns the phase afterwards.
    pub fn announce(&mut self) -> GuestPhase {
        self.announced = true;
        if self.phase == GuestPhase::Initializing {
            self.phase = GuestPhase::Ready;
        }
        self.phase
    }

    /// Enter initialization with a full configuration.
    pub fn begin_init(&mut self, config: AvatarConfig) {
        if self.phase == GuestPhase::Uninitialized {
            self.phase = GuestPhase::Initializing;
        }
        self.config = config;
    }

    /// Finish initialization; promotes to `Ready` if `READY` was already sent.
    pub fn complete_init(&mut self) -> GuestPhase {
        if self.announced {
            self.phase = GuestPhase::Ready;
        }
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_init_and_ping_pass_before_initialization() {
        let state = GuestState::default();
        assert!(state.accepts(HostMessageKind::InitAvatar));
        assert!(state.accepts(HostMessageKind::Ping));
        assert!(!state.accepts(HostMessageKind::SetPose));
        assert!(!state.accepts(HostMessageKind::TakeSnapshot));
    }

    #[test]
    fn init_then_announce_reaches_ready() {
        let mut state = GuestState::default();
        state.begin_init(AvatarConfig::default());
        assert_eq!(state.complete_init(), GuestPhase::Initializing);
        assert_eq!(state.announce(), GuestPhase::Ready);
    }

    #[test]
    fn announce_then_init_reaches_ready() {
        let mut state = GuestState::default();
        assert_eq!(state.announce(), GuestPhase::Uninitialized);
        state.begin_init(AvatarConfig::default());
        assert_eq!(state.complete_init(), GuestPhase::Ready);
    }
}
