//! Record types held by the store.

use serde::{Deserialize, Serialize};

/// Identifier of the user a trusted device belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct UserId(pub i32);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One enrolled trusted device.
///
/// `token_handle` is issued by the external credential subsystem and stored
/// as an opaque value; the store never interprets its bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscrowTokenRecord {
    /// Opaque escrow-token handle, unique per user and device
    pub token_handle: u64,
    /// Bluetooth address of the remote device
    pub remote_address: String,
    /// User this enrollment belongs to
    pub owning_user: UserId,
    /// Human-readable device name shown in device lists
    pub display_name: String,
    /// Whether the token is currently active
    pub active: bool,
}

/// Outcome of a successful [`activate`](crate::TrustedDeviceStore::activate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Handle of a prior active record for the same `(user, address)` pair
    /// that this activation replaced, if any. The caller is responsible for
    /// requesting its deactivation from the credential subsystem.
    pub superseded: Option<u64>,
}
