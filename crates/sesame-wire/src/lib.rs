//! Wire framing for the trusted-device BLE channel.
//!
//! BLE characteristics carry at most a negotiated MTU per write, so logical
//! messages (device identifiers, handshake rounds, escrow tokens) are split
//! into a sequence of packets and reassembled on the far side. Each packet
//! carries a two-byte header:
//!
//! ```text
//! [operation_type: u8][flags: u8][payload ...]
//! ```
//!
//! where flag bit 0 marks an encrypted payload and flag bit 1 marks the last
//! fragment of a logical message.

#![forbid(unsafe_code)]

mod error;
mod fragment;
mod packet;
mod reassembly;

pub use error::WireError;
pub use fragment::fragment;
pub use packet::{OperationType, Packet, HEADER_LEN};
pub use reassembly::MessageReassembler;
