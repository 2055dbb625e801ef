//! Error type for the enrollment flow.

use sesame_handshake::HandshakeError;
use sesame_store::StoreError;
use sesame_wire::WireError;

/// Errors produced by the enrollment controller and query surface.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    /// Enrollment of new trusted devices is disabled on this host.
    #[error("enrollment of new trusted devices is disabled")]
    NotAllowed,

    /// An operation was invoked in a state that does not support it.
    #[error("unexpected enrollment state: {message}")]
    UnexpectedState {
        /// What was expected instead
        message: String,
    },

    /// The BLE transport failed to deliver a packet.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the delivery failure
        message: String,
    },

    /// The configuration file is missing, unreadable, or inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// What is wrong with the configuration
        message: String,
    },

    /// A wire-level failure (fragmentation with a bad MTU).
    #[error(transparent)]
    Wire(#[from] WireError),

    /// The encryption handshake failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// The trusted-device store rejected or failed a write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EnrollmentError {
    /// Create an unexpected-state error.
    pub fn unexpected_state(message: impl Into<String>) -> Self {
        Self::UnexpectedState {
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
