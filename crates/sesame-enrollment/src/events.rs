//! Notifications produced by the enrollment flow.

/// What the host should surface or do after a controller call.
///
/// Events are returned from the call that produced them rather than pushed
/// through registered listeners, so the host decides how to dispatch them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentEvent {
    /// The handshake produced a code the user must confirm out of band.
    VerificationCodeAvailable {
        /// Human-readable code shown on both devices
        code: String,
    },
    /// The credential subsystem accepted an escrow token; activation is
    /// still pending.
    TokenAdded {
        /// Handle issued for the token
        handle: u64,
    },
    /// The device is enrolled and its record durably persisted.
    EnrollmentCompleted {
        /// Handle of the activated token
        handle: u64,
    },
    /// The enrollment was aborted. Controller state has been reset.
    EnrollmentFailed {
        /// Why the enrollment was aborted
        reason: String,
    },
    /// The host should tear down the BLE connection.
    DisconnectRequested,
}
