//! Error type for handshake operations.

use crate::HandshakeState;

/// Errors produced while driving the handshake state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The cipher suite rejected a peer message (bad MAC, bad format, wrong
    /// round). Always fatal: the session moves to
    /// [`HandshakeState::Invalid`] and a full restart via
    /// disconnect/reconnect is required.
    #[error("handshake validation failed: {message}")]
    ValidationFailure {
        /// Cipher-suite description of the failure
        message: String,
    },

    /// An operation was attempted in a state that does not allow it.
    #[error("operation not valid in handshake state {state:?}")]
    StateMismatch {
        /// The state the session was in
        state: HandshakeState,
    },

    /// The cipher suite produced a message missing a required component
    /// (e.g. no outbound bytes, or a finished state without a key).
    #[error("cipher suite produced an incomplete handshake message: {message}")]
    IncompleteMessage {
        /// What was missing
        message: String,
    },
}

impl HandshakeError {
    /// Create a validation-failure error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailure {
            message: message.into(),
        }
    }

    /// Create a state-mismatch error.
    pub fn state_mismatch(state: HandshakeState) -> Self {
        Self::StateMismatch { state }
    }

    /// Create an incomplete-message error.
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::IncompleteMessage {
            message: message.into(),
        }
    }
}
