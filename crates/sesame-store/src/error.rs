//! Error type for store operations.

/// Errors produced by [`crate::TrustedDeviceStore`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the I/O failure
        message: String,
    },

    /// The snapshot could not be serialized or parsed.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },

    /// A write would contradict an existing record, e.g. activating a
    /// handle that is already owned by a different user. The write is
    /// rejected rather than silently overwriting.
    #[error("store consistency violation: {message}")]
    ConsistencyViolation {
        /// What the write contradicted
        message: String,
    },
}

impl StoreError {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a consistency-violation error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
