//! Persistent trusted-device state.
//!
//! [`TrustedDeviceStore`] is the system of record for enrollments: it maps
//! opaque escrow-token handles to the remote device and user they belong
//! to, and it survives process restarts. It also holds the small amount of
//! host-level state the enrollment flow needs to persist: the host's unique
//! identifier, per-device session keys, and the enrollment-enabled flag.
//!
//! Every mutation commits durably (write-then-rename of a JSON snapshot)
//! before the call returns, so a restart between any two calls observes the
//! effect of the first.

#![forbid(unsafe_code)]

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::TrustedDeviceStore;
pub use types::{Activation, EscrowTokenRecord, UserId};
