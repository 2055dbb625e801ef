//! Encryption handshake state machine for trusted-device enrollment.
//!
//! The handshake establishes a verified symmetric session key between the
//! host and an enrolling peer. The actual key-exchange cryptography is
//! supplied by a [`CipherSuite`] implementation; this crate owns the
//! state-machine contract around it: which messages are legal in which
//! state, when the human-readable verification code becomes available, and
//! that any invalid input moves the session to a terminal, absorbing
//! [`HandshakeState::Invalid`].

#![forbid(unsafe_code)]

mod error;
mod insecure;
mod session;
mod suite;

pub use error::HandshakeError;
pub use insecure::InsecureCipherSuite;
pub use session::{HandshakeSession, CONFIRMATION_SIGNAL};
pub use suite::{CipherSuite, HandshakeMessage, HandshakeState};
