//! Enrollment progress.

/// Progress of one enrollment. Strictly forward until reset; disconnect or
/// any fatal error returns the controller to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    /// No enrollment in progress
    None,
    /// Host identifier sent; waiting for the peer's device id
    AwaitingUniqueId,
    /// Peer identified; encryption handshake in flight
    AwaitingEncryption,
    /// Secure channel established; escrow-token exchange may proceed
    EncryptionComplete,
}
