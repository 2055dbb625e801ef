//! Packet layout and header codec.

use crate::WireError;
use serde::{Deserialize, Serialize};

/// Fixed size of the packet header: one operation-type byte, one flags byte.
pub const HEADER_LEN: usize = 2;

const FLAG_ENCRYPTED: u8 = 0b0000_0001;
const FLAG_LAST_FRAGMENT: u8 = 0b0000_0010;
const FLAG_MASK: u8 = FLAG_ENCRYPTED | FLAG_LAST_FRAGMENT;

/// The kind of logical message a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// Acknowledgment that a partial message fragment was received. ACK
    /// packets carry no payload and never enter reassembly.
    Ack,
    /// Application payloads: device identifiers, escrow tokens, handles.
    ClientMessage,
    /// A round of the encryption handshake.
    EncryptionHandshake,
}

impl OperationType {
    fn to_wire(self) -> u8 {
        match self {
            OperationType::Ack => 1,
            OperationType::ClientMessage => 2,
            OperationType::EncryptionHandshake => 3,
        }
    }

    fn from_wire(tag: u8) -> Result<Self, WireError> {
        match tag {
            1 => Ok(OperationType::Ack),
            2 => Ok(OperationType::ClientMessage),
            3 => Ok(OperationType::EncryptionHandshake),
            other => Err(WireError::malformed(format!(
                "unknown operation type tag {other}"
            ))),
        }
    }
}

/// One BLE write: a header plus at most `mtu - HEADER_LEN` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Which logical message stream this fragment belongs to
    pub operation: OperationType,
    /// Whether the payload bytes are ciphertext
    pub is_encrypted: bool,
    /// Whether this is the final fragment of the logical message
    pub is_last: bool,
    /// Fragment payload bytes
    pub payload: Vec<u8>,
}

impl Packet {
    /// A header-only acknowledgment packet.
    pub fn ack() -> Self {
        Self {
            operation: OperationType::Ack,
            is_encrypted: false,
            is_last: true,
            payload: Vec::new(),
        }
    }

    /// Encode this packet into its wire representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.is_encrypted {
            flags |= FLAG_ENCRYPTED;
        }
        if self.is_last {
            flags |= FLAG_LAST_FRAGMENT;
        }
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.operation.to_wire());
        out.push(flags);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a packet from raw characteristic bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::malformed(format!(
                "packet of {} bytes is shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        let operation = OperationType::from_wire(bytes[0])?;
        let flags = bytes[1];
        if flags & !FLAG_MASK != 0 {
            return Err(WireError::malformed(format!(
                "reserved flag bits set: {flags:#04x}"
            )));
        }
        Ok(Self {
            operation,
            is_encrypted: flags & FLAG_ENCRYPTED != 0,
            is_last: flags & FLAG_LAST_FRAGMENT != 0,
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }
}
