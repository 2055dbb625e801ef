//! The pluggable cipher-suite boundary.

use crate::HandshakeError;
use serde::{Deserialize, Serialize};

/// Progress of the encryption handshake.
///
/// `Invalid` and `Finished` are terminal. `Invalid` is absorbing: once
/// entered, every further operation fails and the session never yields a
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeState {
    /// No handshake message has been processed yet
    Unstarted,
    /// Key-agreement rounds are being exchanged
    InProgress,
    /// The key is agreed; the human-readable verification code must be
    /// confirmed out of band before the session is trusted
    VerificationNeeded,
    /// The handshake completed and a session key is available
    Finished,
    /// The handshake failed; the session is unusable
    Invalid,
}

/// One step of cipher-suite output.
///
/// `next_message` is the outbound payload to send to the peer, if this round
/// produces one. `verification_code` is populated when `state` first reaches
/// [`HandshakeState::VerificationNeeded`], and `session_key` when it reaches
/// [`HandshakeState::Finished`].
#[derive(Debug, Clone)]
pub struct HandshakeMessage {
    /// State the handshake is in after this step
    pub state: HandshakeState,
    /// Outbound payload for the peer, if any
    pub next_message: Option<Vec<u8>>,
    /// Human-readable code for out-of-band confirmation, if now available
    pub verification_code: Option<String>,
    /// The agreed symmetric key, once finished
    pub session_key: Option<Vec<u8>>,
}

impl HandshakeMessage {
    /// A message that only advances state, with no payload attached.
    pub fn state_only(state: HandshakeState) -> Self {
        Self {
            state,
            next_message: None,
            verification_code: None,
            session_key: None,
        }
    }
}

/// The key-exchange cryptography behind a [`crate::HandshakeSession`].
///
/// Implementations own round framing, MAC/signature verification and key
/// derivation; the session owns the state-machine contract. Every method
/// consumes at most one inbound message and produces at most one outbound
/// message. A returned error is treated as a validation failure and is
/// always fatal to the session.
pub trait CipherSuite: Send {
    /// Produce the initiator's first handshake message.
    fn init_handshake(&mut self) -> Result<HandshakeMessage, HandshakeError>;

    /// Respond to a peer's initial handshake message (responder role).
    fn respond_to_init(&mut self, message: &[u8]) -> Result<HandshakeMessage, HandshakeError>;

    /// Process the next key-agreement round.
    fn continue_handshake(&mut self, message: &[u8]) -> Result<HandshakeMessage, HandshakeError>;

    /// Finish the handshake after the verification code was accepted,
    /// yielding the session key.
    fn finish(&mut self) -> Result<HandshakeMessage, HandshakeError>;
}
