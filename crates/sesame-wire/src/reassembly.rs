//! Accumulating packet fragments back into logical payloads.

use crate::{OperationType, Packet, WireError};
use tracing::debug;

/// Reassembles the fragments of one in-flight logical message.
///
/// A reassembler holds state for exactly one message at a time. If a packet
/// with a different operation type arrives before the current message is
/// complete, the partial accumulation is discarded and replaced: a fresh
/// message implies the sender abandoned the prior one, so last writer wins.
#[derive(Debug, Default)]
pub struct MessageReassembler {
    operation: Option<OperationType>,
    buffer: Vec<u8>,
    complete: bool,
}

impl MessageReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one packet's payload to the accumulation buffer.
    ///
    /// ACK packets are pacing signals, not message fragments, and are
    /// rejected here; the caller handles them before reassembly.
    pub fn write(&mut self, packet: &Packet) -> Result<(), WireError> {
        if packet.operation == OperationType::Ack {
            return Err(WireError::malformed(
                "ACK packets do not carry message fragments",
            ));
        }

        if self.complete || self.operation.is_some_and(|op| op != packet.operation) {
            debug!(
                previous = ?self.operation,
                incoming = ?packet.operation,
                discarded_bytes = self.buffer.len(),
                "new message started before prior one was consumed; replacing"
            );
            self.reset();
        }

        self.operation = Some(packet.operation);
        self.buffer.extend_from_slice(&packet.payload);
        self.complete = packet.is_last;
        Ok(())
    }

    /// Whether a terminal fragment has been written.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The operation type of the message being accumulated, if any.
    pub fn operation(&self) -> Option<OperationType> {
        self.operation
    }

    /// Return the accumulated payload and clear all state.
    ///
    /// Calling before [`is_complete`](Self::is_complete) returns the partial
    /// accumulation; callers must check completeness first.
    pub fn take_payload(&mut self) -> Vec<u8> {
        let payload = std::mem::take(&mut self.buffer);
        self.reset();
        payload
    }

    /// Clear all state unconditionally. Called between wire conversations
    /// and on disconnect.
    pub fn reset(&mut self) {
        self.operation = None;
        self.buffer.clear();
        self.complete = false;
    }
}
