//! Error type for wire framing operations.

/// Errors produced while encoding or decoding BLE packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The packet header or flags could not be parsed. Malformed packets are
    /// dropped by the caller; they never tear down a session.
    #[error("malformed packet: {reason}")]
    MalformedPacket {
        /// What made the packet unparseable
        reason: String,
    },

    /// The negotiated maximum packet size leaves no room for payload bytes
    /// after the fixed header.
    #[error("max packet size {size} cannot carry a payload (header is {header} bytes)")]
    InvalidMtu {
        /// The rejected maximum packet size
        size: usize,
        /// The fixed header length
        header: usize,
    },
}

impl WireError {
    /// Create a malformed-packet error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket {
            reason: reason.into(),
        }
    }
}
