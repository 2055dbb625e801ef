//! Trusted-device enrollment over BLE.
//!
//! [`EnrollmentController`] drives one remote connection through the
//! enrollment flow: identifier exchange, encryption handshake with
//! out-of-band code confirmation, escrow-token hand-off to the credential
//! subsystem, and durable activation in the trusted-device store.
//! [`TrustedDeviceManager`] is the read and maintenance surface over the
//! same store.
//!
//! The host integrates by implementing [`BleTransport`] (outbound GATT
//! writes) and [`EscrowTokenDelegate`] (credential subsystem calls), then
//! feeding connection callbacks and raw characteristic bytes into the
//! controller. Controller methods return [`EnrollmentEvent`]s describing
//! what the host should surface or do next.

#![forbid(unsafe_code)]

mod config;
mod controller;
mod error;
mod events;
mod manager;
mod state;
mod traits;

pub use config::EnrollmentConfig;
pub use controller::{EnrollmentController, SuiteFactory};
pub use error::EnrollmentError;
pub use events::EnrollmentEvent;
pub use manager::{TrustedDeviceInfo, TrustedDeviceManager};
pub use state::EnrollmentState;
pub use traits::{BleTransport, EscrowTokenDelegate, RemoteDevice};
