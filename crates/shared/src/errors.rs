//! Error classification shared by both sides of the bridge.

use serde::{Deserialize, Serialize};

/// Error classification codes carried by `ERROR` events.
///
/// Codes the receiver does not recognise decode to [`BridgeErrorCode::UnknownError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeErrorCode {
    /// Guest failed to initialize, or received a command before initialization
    InitError,
    /// Inbound payload could not be decoded
    MessageParseError,
    /// Frame capture failed
    SnapshotError,
    /// Avatar model failed to load
    AvatarLoadError,
    /// Auxiliary asset failed to load
    AssetLoadError,
    /// Configuration could not be applied
    ConfigError,
    /// The embedding web view failed (host-side, channel-scoped)
    WebviewError,
    /// No reply arrived within the retry budget (host-side, synthesized)
    TimeoutError,
    /// Anything else, including codes from newer peers
    #[serde(other)]
    UnknownError,
}

impl BridgeErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            BridgeErrorCode::InitError => "INIT_ERROR",
            BridgeErrorCode::MessageParseError => "MESSAGE_PARSE_ERROR",
            BridgeErrorCode::SnapshotError => "SNAPSHOT_ERROR",
            BridgeErrorCode::AvatarLoadError => "AVATAR_LOAD_ERROR",
            BridgeErrorCode::AssetLoadError => "ASSET_LOAD_ERROR",
            BridgeErrorCode::ConfigError => "CONFIG_ERROR",
            BridgeErrorCode::WebviewError => "WEBVIEW_ERROR",
            BridgeErrorCode::TimeoutError => "TIMEOUT_ERROR",
            BridgeErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for BridgeErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
