//! Boundaries to the BLE transport and the credential subsystem.

use crate::EnrollmentError;
use sesame_store::UserId;
use sesame_wire::Packet;

/// A connected remote device as seen by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    /// Bluetooth address of the peer
    pub address: String,
    /// Advertised device name, if the transport resolved one
    pub name: Option<String>,
}

/// Outbound half of the BLE GATT link.
///
/// Sends are fire-and-forget from the controller's point of view; delivery
/// pacing for multi-fragment messages is handled by the controller via ACK
/// packets, not by this trait.
#[async_trait::async_trait]
pub trait BleTransport: Send + Sync {
    /// Write one packet to the peer's characteristic.
    async fn send(&self, remote: &RemoteDevice, packet: Packet) -> Result<(), EnrollmentError>;
}

/// The OS credential subsystem that owns escrow tokens.
///
/// The controller forwards received tokens through [`add_escrow_token`] and
/// learns the outcome through its `on_token_added` / `on_token_activated`
/// callbacks; it requests cleanup of stale or superseded tokens through
/// [`remove_escrow_token`].
///
/// [`add_escrow_token`]: Self::add_escrow_token
/// [`remove_escrow_token`]: Self::remove_escrow_token
#[async_trait::async_trait]
pub trait EscrowTokenDelegate: Send + Sync {
    /// Hand a received escrow token to the credential subsystem.
    async fn add_escrow_token(&self, token: Vec<u8>, user: UserId) -> Result<(), EnrollmentError>;

    /// Ask the credential subsystem to discard a token.
    async fn remove_escrow_token(&self, handle: u64, user: UserId)
        -> Result<(), EnrollmentError>;
}
