//! A deterministic cipher suite for tests and demos.

use crate::{CipherSuite, HandshakeError, HandshakeMessage, HandshakeState};

/// A cipher suite that performs no cryptography.
///
/// Rounds are fixed byte strings and the session key is a constant, which
/// makes state-machine behavior fully observable in tests. Never use this
/// outside of tests; it authenticates nothing.
#[derive(Debug, Default)]
pub struct InsecureCipherSuite {
    round: u8,
}

impl InsecureCipherSuite {
    /// The initiator's first message.
    pub const INIT: &'static [u8] = b"init";
    /// The responder's answer to [`Self::INIT`].
    pub const INIT_RESPONSE: &'static [u8] = b"initResponse";
    /// The initiator's second message.
    pub const CLIENT_RESPONSE: &'static [u8] = b"clientResponse";
    /// The fixed verification code.
    pub const VERIFICATION_CODE: &'static str = "1234";
    /// The fixed session key.
    pub const SESSION_KEY: &'static [u8] = b"insecure-session-key";

    /// Create a fresh suite.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CipherSuite for InsecureCipherSuite {
    fn init_handshake(&mut self) -> Result<HandshakeMessage, HandshakeError> {
        self.round = 1;
        Ok(HandshakeMessage {
            state: HandshakeState::InProgress,
            next_message: Some(Self::INIT.to_vec()),
            verification_code: None,
            session_key: None,
        })
    }

    fn respond_to_init(&mut self, message: &[u8]) -> Result<HandshakeMessage, HandshakeError> {
        if message != Self::INIT {
            return Err(HandshakeError::validation("unexpected init message"));
        }
        self.round = 1;
        Ok(HandshakeMessage {
            state: HandshakeState::InProgress,
            next_message: Some(Self::INIT_RESPONSE.to_vec()),
            verification_code: None,
            session_key: None,
        })
    }

    fn continue_handshake(&mut self, message: &[u8]) -> Result<HandshakeMessage, HandshakeError> {
        // Either role's second inbound round is accepted.
        if message != Self::CLIENT_RESPONSE && message != Self::INIT_RESPONSE {
            return Err(HandshakeError::validation("unexpected handshake round"));
        }
        self.round += 1;
        Ok(HandshakeMessage {
            state: HandshakeState::VerificationNeeded,
            next_message: None,
            verification_code: Some(Self::VERIFICATION_CODE.to_string()),
            session_key: None,
        })
    }

    fn finish(&mut self) -> Result<HandshakeMessage, HandshakeError> {
        Ok(HandshakeMessage {
            state: HandshakeState::Finished,
            next_message: None,
            verification_code: None,
            session_key: Some(Self::SESSION_KEY.to_vec()),
        })
    }
}
