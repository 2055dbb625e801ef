//! Splitting logical payloads into MTU-sized packets.

use crate::{OperationType, Packet, WireError, HEADER_LEN};

/// Split `payload` into packets of at most `max_packet_size` bytes each.
///
/// Produces exactly `ceil(len / capacity)` packets, where `capacity` is
/// `max_packet_size - HEADER_LEN`, and exactly one header-only packet for an
/// empty payload so that the peer still observes message framing. Only the
/// final packet has its last-fragment flag set.
pub fn fragment(
    operation: OperationType,
    payload: &[u8],
    is_encrypted: bool,
    max_packet_size: usize,
) -> Result<Vec<Packet>, WireError> {
    if max_packet_size <= HEADER_LEN {
        return Err(WireError::InvalidMtu {
            size: max_packet_size,
            header: HEADER_LEN,
        });
    }
    let capacity = max_packet_size - HEADER_LEN;

    if payload.is_empty() {
        return Ok(vec![Packet {
            operation,
            is_encrypted,
            is_last: true,
            payload: Vec::new(),
        }]);
    }

    let count = payload.len().div_ceil(capacity);
    let mut packets = Vec::with_capacity(count);
    for (index, chunk) in payload.chunks(capacity).enumerate() {
        packets.push(Packet {
            operation,
            is_encrypted,
            is_last: index + 1 == count,
            payload: chunk.to_vec(),
        });
    }
    Ok(packets)
}
