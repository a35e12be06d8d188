//! Errors surfaced to callers of the bridge controller.

use avabridge_shared::{BridgeErrorCode, TransportError};

/// Why a bridge request did not succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// No reply within the retry budget (synthesized locally)
    #[error("No reply to {message_id} after {attempts} attempts")]
    Timeout { message_id: String, attempts: u32 },

    /// Guest acknowledged with `success: false`
    #[error("Guest rejected {message_id}")]
    Rejected { message_id: String },

    /// Guest reported a request-scoped `ERROR` or `LOAD_ERROR`
    #[error("Guest error ({code}): {message}")]
    Guest {
        code: BridgeErrorCode,
        message: String,
    },

    /// Bridge was reset or disposed while the request was outstanding
    #[error("Request cancelled by bridge reset")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A live request already uses this correlation id
    #[error("Duplicate message id: {0}")]
    DuplicateMessageId(String),

    /// The settling reply did not have the expected shape
    #[error("Malformed reply: {0}")]
    Serialization(String),
}

impl BridgeError {
    /// Protocol error code for this failure.
    pub fn code(&self) -> BridgeErrorCode {
        match self {
            BridgeError::Timeout { .. } => BridgeErrorCode::TimeoutError,
            BridgeError::Guest { code, .. } => *code,
            BridgeError::Transport(_) => BridgeErrorCode::WebviewError,
            BridgeError::Serialization(_) => BridgeErrorCode::MessageParseError,
            BridgeError::Rejected { .. }
            | BridgeError::Cancelled
            | BridgeError::DuplicateMessageId(_) => BridgeErrorCode::UnknownError,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}
