//! The handshake session state machine.

use crate::{CipherSuite, HandshakeError, HandshakeMessage, HandshakeState};
use tracing::{debug, warn};

/// Fixed payload sent to the peer when the verification code is accepted.
pub const CONFIRMATION_SIGNAL: &[u8] = b"True";

/// Drives a multi-round encryption handshake over a [`CipherSuite`].
///
/// The session consumes one inbound message per [`on_message`] call and
/// produces at most one outbound message. Transitions happen only on
/// message receipt or on explicit verification-code acceptance via
/// [`confirm`]. Invalid input in any state is fatal and non-retryable: the
/// session moves to [`HandshakeState::Invalid`] and stays there.
///
/// [`on_message`]: Self::on_message
/// [`confirm`]: Self::confirm
pub struct HandshakeSession {
    suite: Box<dyn CipherSuite>,
    state: HandshakeState,
    verification_code: Option<String>,
    session_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for HandshakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("state", &self.state)
            .field("has_verification_code", &self.verification_code.is_some())
            .field("has_session_key", &self.session_key.is_some())
            .finish()
    }
}

impl HandshakeSession {
    /// Create a session in [`HandshakeState::Unstarted`].
    pub fn new(suite: Box<dyn CipherSuite>) -> Self {
        Self {
            suite,
            state: HandshakeState::Unstarted,
            verification_code: None,
            session_key: None,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The verification code, once the session reaches
    /// [`HandshakeState::VerificationNeeded`].
    pub fn verification_code(&self) -> Option<&str> {
        self.verification_code.as_deref()
    }

    /// Start the handshake as initiator, returning the first outbound
    /// message. Only valid in [`HandshakeState::Unstarted`].
    pub fn begin(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.state != HandshakeState::Unstarted {
            return Err(HandshakeError::state_mismatch(self.state));
        }
        let message = match self.suite.init_handshake() {
            Ok(message) => message,
            Err(err) => return Err(self.invalidate(err)),
        };
        self.absorb(&message);
        message
            .next_message
            .ok_or_else(|| self.invalidate(HandshakeError::incomplete("init produced no payload")))
    }

    /// Process one inbound handshake message.
    ///
    /// In `Unstarted` the message is treated as the peer's init request and
    /// answered (responder role); in `InProgress` it continues the
    /// key-agreement rounds, possibly reaching `VerificationNeeded`. Any
    /// other state does not expect input and the session becomes `Invalid`.
    pub fn on_message(&mut self, message: &[u8]) -> Result<Option<Vec<u8>>, HandshakeError> {
        let result = match self.state {
            HandshakeState::Unstarted => {
                debug!("responding to handshake init request");
                self.suite.respond_to_init(message)
            }
            HandshakeState::InProgress => {
                debug!("continuing handshake");
                self.suite.continue_handshake(message)
            }
            state => {
                warn!(?state, "handshake message received in unexpected state");
                return Err(self.invalidate(HandshakeError::state_mismatch(state)));
            }
        };

        let message = match result {
            Ok(message) => message,
            Err(err) => return Err(self.invalidate(err)),
        };
        self.absorb(&message);
        debug!(state = ?self.state, "handshake advanced");
        Ok(message.next_message)
    }

    /// Accept the verification code, finishing the handshake.
    ///
    /// Returns the fixed confirmation signal to send to the peer. Only
    /// valid in [`HandshakeState::VerificationNeeded`]; calling in any
    /// other state fails with a state-mismatch error without otherwise
    /// disturbing the session.
    pub fn confirm(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.state != HandshakeState::VerificationNeeded {
            return Err(HandshakeError::state_mismatch(self.state));
        }
        let message = match self.suite.finish() {
            Ok(message) => message,
            Err(err) => return Err(self.invalidate(err)),
        };
        if message.state != HandshakeState::Finished {
            return Err(self.invalidate(HandshakeError::incomplete(format!(
                "cipher suite finished into state {:?}",
                message.state
            ))));
        }
        if message.session_key.is_none() {
            return Err(self.invalidate(HandshakeError::incomplete(
                "finished handshake carries no session key",
            )));
        }
        self.absorb(&message);
        Ok(CONFIRMATION_SIGNAL.to_vec())
    }

    /// The agreed session key. Only valid once
    /// [`HandshakeState::Finished`].
    pub fn session_key(&self) -> Result<&[u8], HandshakeError> {
        if self.state != HandshakeState::Finished {
            return Err(HandshakeError::state_mismatch(self.state));
        }
        self.session_key
            .as_deref()
            .ok_or_else(|| HandshakeError::incomplete("no session key recorded"))
    }

    fn absorb(&mut self, message: &HandshakeMessage) {
        self.state = message.state;
        if let Some(code) = &message.verification_code {
            self.verification_code = Some(code.clone());
        }
        if let Some(key) = &message.session_key {
            self.session_key = Some(key.clone());
        }
    }

    fn invalidate(&mut self, err: HandshakeError) -> HandshakeError {
        if self.state != HandshakeState::Invalid {
            warn!(error = %err, "handshake invalidated");
        }
        self.state = HandshakeState::Invalid;
        self.session_key = None;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InsecureCipherSuite;

    fn session() -> HandshakeSession {
        HandshakeSession::new(Box::new(InsecureCipherSuite::new()))
    }

    #[test]
    fn responder_flow_reaches_finished() {
        let mut session = session();
        assert_eq!(session.state(), HandshakeState::Unstarted);

        let response = session.on_message(InsecureCipherSuite::INIT).unwrap();
        assert_eq!(response.as_deref(), Some(InsecureCipherSuite::INIT_RESPONSE));
        assert_eq!(session.state(), HandshakeState::InProgress);

        session
            .on_message(InsecureCipherSuite::CLIENT_RESPONSE)
            .unwrap();
        assert_eq!(session.state(), HandshakeState::VerificationNeeded);
        assert_eq!(
            session.verification_code(),
            Some(InsecureCipherSuite::VERIFICATION_CODE)
        );
        // Key is not observable before confirmation.
        assert!(session.session_key().is_err());

        let signal = session.confirm().unwrap();
        assert_eq!(signal, CONFIRMATION_SIGNAL);
        assert_eq!(session.state(), HandshakeState::Finished);
        assert_eq!(
            session.session_key().unwrap(),
            InsecureCipherSuite::SESSION_KEY
        );
    }

    #[test]
    fn initiator_flow_begins_with_init() {
        let mut session = session();
        let first = session.begin().unwrap();
        assert_eq!(first, InsecureCipherSuite::INIT);
        assert_eq!(session.state(), HandshakeState::InProgress);
    }

    #[test]
    fn begin_twice_is_a_state_mismatch() {
        let mut session = session();
        session.begin().unwrap();
        assert!(matches!(
            session.begin(),
            Err(HandshakeError::StateMismatch { .. })
        ));
        // A plain misuse of begin() does not poison the session.
        assert_eq!(session.state(), HandshakeState::InProgress);
    }

    #[test]
    fn invalid_is_absorbing() {
        let mut session = session();
        session.on_message(InsecureCipherSuite::INIT).unwrap();
        // Garbage in InProgress is a validation failure.
        assert!(matches!(
            session.on_message(b"garbage"),
            Err(HandshakeError::ValidationFailure { .. })
        ));
        assert_eq!(session.state(), HandshakeState::Invalid);

        // Everything afterwards stays Invalid and never yields a key.
        for _ in 0..3 {
            assert!(session.on_message(InsecureCipherSuite::INIT).is_err());
            assert_eq!(session.state(), HandshakeState::Invalid);
        }
        assert!(session.confirm().is_err());
        assert!(session.session_key().is_err());
    }

    #[test]
    fn message_after_finish_is_fatal() {
        let mut session = session();
        session.on_message(InsecureCipherSuite::INIT).unwrap();
        session
            .on_message(InsecureCipherSuite::CLIENT_RESPONSE)
            .unwrap();
        session.confirm().unwrap();

        assert!(session.on_message(b"late").is_err());
        assert_eq!(session.state(), HandshakeState::Invalid);
        assert!(session.session_key().is_err());
    }

    #[test]
    fn confirm_before_verification_needed_fails() {
        let mut session = session();
        assert!(matches!(
            session.confirm(),
            Err(HandshakeError::StateMismatch { .. })
        ));
        session.on_message(InsecureCipherSuite::INIT).unwrap();
        assert!(session.confirm().is_err());
    }
}
