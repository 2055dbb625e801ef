//! Per-connection enrollment state machine.

use crate::{
    BleTransport, EnrollmentConfig, EnrollmentError, EnrollmentEvent, EnrollmentState,
    EscrowTokenDelegate, RemoteDevice,
};
use sesame_handshake::{CipherSuite, HandshakeSession, HandshakeState};
use sesame_store::{TrustedDeviceStore, UserId};
use sesame_wire::{fragment, MessageReassembler, OperationType, Packet};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Builds a fresh cipher suite for each enrollment attempt.
pub type SuiteFactory = Box<dyn Fn() -> Box<dyn CipherSuite> + Send + Sync>;

/// Drives one remote device through the enrollment flow.
///
/// One controller exists per connection and its methods are invoked one at
/// a time by the host, so there is no interior locking. The shared pieces
/// live behind the [`TrustedDeviceStore`]. Fatal mid-flow failures do not
/// surface as `Err`: they reset the controller and are reported through
/// [`EnrollmentEvent::EnrollmentFailed`] plus a disconnect request, so the
/// host's dispatch path stays uniform. `Err` is reserved for caller-side
/// contract violations and infrastructure failures.
pub struct EnrollmentController {
    config: EnrollmentConfig,
    store: Arc<TrustedDeviceStore>,
    transport: Arc<dyn BleTransport>,
    delegate: Arc<dyn EscrowTokenDelegate>,
    suite_factory: SuiteFactory,
    state: EnrollmentState,
    session: HandshakeSession,
    reassembler: MessageReassembler,
    /// Outbound fragments waiting for the peer to acknowledge the previous
    /// one
    outbound: VecDeque<Packet>,
    remote: Option<RemoteDevice>,
    user: Option<UserId>,
    peer_device_id: Option<Uuid>,
    peer_name: Option<String>,
    /// Escrow-token handles issued during this enrollment, with whether
    /// each was activated. Never-activated handles are cleaned up on
    /// termination
    pending_tokens: HashMap<u64, bool>,
}

impl std::fmt::Debug for EnrollmentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentController")
            .field("state", &self.state)
            .field("remote", &self.remote)
            .field("user", &self.user)
            .field("peer_device_id", &self.peer_device_id)
            .field("queued_fragments", &self.outbound.len())
            .finish()
    }
}

impl EnrollmentController {
    /// Create an idle controller.
    pub fn new(
        config: EnrollmentConfig,
        store: Arc<TrustedDeviceStore>,
        transport: Arc<dyn BleTransport>,
        delegate: Arc<dyn EscrowTokenDelegate>,
        suite_factory: SuiteFactory,
    ) -> Self {
        let session = HandshakeSession::new(suite_factory());
        Self {
            config,
            store,
            transport,
            delegate,
            suite_factory,
            state: EnrollmentState::None,
            session,
            reassembler: MessageReassembler::new(),
            outbound: VecDeque::new(),
            remote: None,
            user: None,
            peer_device_id: None,
            peer_name: None,
            pending_tokens: HashMap::new(),
        }
    }

    /// Current enrollment progress.
    pub fn state(&self) -> EnrollmentState {
        self.state
    }

    /// A remote device connected and wants to enroll for `user`.
    ///
    /// Refuses with [`EnrollmentError::NotAllowed`] while enrollment is
    /// disabled. Otherwise sends the host's unique identifier to the peer
    /// and starts waiting for the peer's device id.
    pub async fn on_connected(
        &mut self,
        remote: RemoteDevice,
        user: UserId,
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        if !self.store.enrollment_enabled().await {
            warn!(address = %remote.address, "enrollment disabled; refusing connection");
            return Err(EnrollmentError::NotAllowed);
        }
        self.reset();
        info!(address = %remote.address, user = %user, "starting enrollment");
        self.peer_name = remote.name.clone();
        self.remote = Some(remote);
        self.user = Some(user);

        let unique_id = self.store.unique_id().await?;
        self.send_message(OperationType::ClientMessage, unique_id.as_bytes(), false)
            .await?;
        self.state = EnrollmentState::AwaitingUniqueId;
        Ok(Vec::new())
    }

    /// Raw bytes arrived on the enrollment characteristic.
    ///
    /// Malformed packets are logged and dropped without disturbing the
    /// flow. ACK packets release the next queued outbound fragment.
    /// Everything else feeds reassembly; a complete message is dispatched
    /// according to the current enrollment state.
    pub async fn on_data_received(
        &mut self,
        bytes: &[u8],
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        let packet = match Packet::from_bytes(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(error = %err, len = bytes.len(), "dropping malformed packet");
                return Ok(Vec::new());
            }
        };

        let Some(remote) = self.remote.clone() else {
            warn!(operation = ?packet.operation, "data received with no connected device; ignoring");
            return Ok(Vec::new());
        };

        if packet.operation == OperationType::Ack {
            self.on_ack(&remote).await?;
            return Ok(Vec::new());
        }

        if let Err(err) = self.reassembler.write(&packet) {
            warn!(error = %err, "dropping unusable packet");
            return Ok(Vec::new());
        }
        if !self.reassembler.is_complete() {
            // Pace the sender: one fragment per acknowledgment.
            self.transport.send(&remote, Packet::ack()).await?;
            return Ok(Vec::new());
        }

        let payload = self.reassembler.take_payload();
        self.dispatch(packet.operation, payload).await
    }

    /// The user confirmed the verification code on the host side.
    ///
    /// Finishes the handshake, sends the confirmation signal to the peer,
    /// persists the agreed session key, and opens the escrow-token phase.
    pub async fn accept_verification(&mut self) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        let signal = self.session.confirm()?;
        self.send_message(OperationType::EncryptionHandshake, &signal, false)
            .await?;

        let device_id = self.peer_device_id.ok_or_else(|| {
            EnrollmentError::unexpected_state("verification accepted before the peer identified itself")
        })?;
        let key = self.session.session_key()?.to_vec();
        self.store
            .save_session_key(&device_id.to_string(), &key)
            .await?;

        self.state = EnrollmentState::EncryptionComplete;
        info!(device = %device_id, "secure channel established");
        Ok(Vec::new())
    }

    /// The transport resolved the peer's display name after connection.
    pub fn on_device_name_retrieved(&mut self, name: String) {
        debug!(name = %name, "peer device name resolved");
        self.peer_name = Some(name);
    }

    /// The credential subsystem accepted an escrow token and issued
    /// `handle` for it. Activation is still pending.
    pub fn on_token_added(&mut self, handle: u64) -> Vec<EnrollmentEvent> {
        debug!(handle, "escrow token added, awaiting activation");
        self.pending_tokens.insert(handle, false);
        vec![EnrollmentEvent::TokenAdded { handle }]
    }

    /// The credential subsystem reported the active state of `handle`,
    /// owned by `user`.
    ///
    /// An activated token completes the enrollment: the record is written
    /// through to the store, any superseded token for the same device is
    /// removed from the credential subsystem, and the handle is delivered
    /// to the peer over the secure channel. A token that failed to
    /// activate aborts the enrollment. A notification whose user does not
    /// match the enrolling user is rejected without touching the store.
    pub async fn on_token_activated(
        &mut self,
        handle: u64,
        user: UserId,
        active: bool,
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        if self.state != EnrollmentState::EncryptionComplete {
            warn!(handle, state = ?self.state, "token state change outside an active enrollment; ignoring");
            return Ok(Vec::new());
        }
        let session_user = self
            .user
            .ok_or_else(|| EnrollmentError::unexpected_state("no enrolling user"))?;
        if user != session_user {
            warn!(handle, notified = %user, enrolling = %session_user, "token notification for a different user; rejecting");
            return Err(EnrollmentError::unexpected_state(format!(
                "token {handle} belongs to user {user}, not enrolling user {session_user}"
            )));
        }

        if !active {
            self.delegate.remove_escrow_token(handle, user).await?;
            self.pending_tokens.remove(&handle);
            return Ok(self.fail(format!("escrow token {handle} was not activated")));
        }

        self.pending_tokens.insert(handle, true);
        let remote = self
            .remote
            .clone()
            .ok_or_else(|| EnrollmentError::unexpected_state("no connected device"))?;
        let name = self
            .peer_name
            .clone()
            .unwrap_or_else(|| self.config.default_device_name.clone());

        let activation = self
            .store
            .activate(handle, &remote.address, user, &name)
            .await?;
        if let Some(old) = activation.superseded {
            info!(old_handle = old, "requesting removal of superseded token");
            self.delegate.remove_escrow_token(old, user).await?;
        }

        // The peer keeps the handle to reference this credential during
        // unlock. Ciphertext production is the cipher suite's concern.
        self.send_message(OperationType::ClientMessage, &handle.to_be_bytes(), true)
            .await?;
        info!(handle, address = %remote.address, user = %user, "enrollment complete");
        Ok(vec![EnrollmentEvent::EnrollmentCompleted { handle }])
    }

    /// The credential subsystem removed the token behind `handle`.
    pub async fn on_token_removed(
        &mut self,
        handle: u64,
        user: UserId,
    ) -> Result<(), EnrollmentError> {
        self.pending_tokens.remove(&handle);
        self.store.deactivate(handle, user).await?;
        Ok(())
    }

    /// Abort the enrollment, cleaning up tokens that were added but never
    /// activated, and ask the host to disconnect.
    pub async fn terminate_enrollment(
        &mut self,
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        if let Some(user) = self.user {
            let stale: Vec<u64> = self
                .pending_tokens
                .iter()
                .filter(|(_, activated)| !**activated)
                .map(|(handle, _)| *handle)
                .collect();
            for handle in stale {
                info!(handle, "removing never-activated escrow token");
                self.delegate.remove_escrow_token(handle, user).await?;
            }
        }
        self.reset();
        Ok(vec![EnrollmentEvent::DisconnectRequested])
    }

    /// The connection dropped. Session state is discarded; the store is
    /// untouched.
    pub fn on_disconnected(&mut self) {
        info!(remote = ?self.remote, "device disconnected");
        self.reset();
    }

    async fn dispatch(
        &mut self,
        operation: OperationType,
        payload: Vec<u8>,
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        match self.state {
            EnrollmentState::None => {
                warn!(?operation, "message received outside an enrollment; ignoring");
                Ok(Vec::new())
            }
            EnrollmentState::AwaitingUniqueId => self.handle_peer_id(operation, payload),
            EnrollmentState::AwaitingEncryption => self.handle_handshake(operation, payload).await,
            EnrollmentState::EncryptionComplete => self.handle_secure(operation, payload).await,
        }
    }

    fn handle_peer_id(
        &mut self,
        operation: OperationType,
        payload: Vec<u8>,
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        if operation != OperationType::ClientMessage {
            return Ok(self.fail(format!("expected the peer device id, got {operation:?}")));
        }
        match Uuid::from_slice(&payload) {
            Ok(id) => {
                info!(device = %id, "peer device identified");
                self.peer_device_id = Some(id);
                self.state = EnrollmentState::AwaitingEncryption;
                Ok(Vec::new())
            }
            Err(_) => Ok(self.fail(format!(
                "peer device id of {} bytes is not a valid identifier",
                payload.len()
            ))),
        }
    }

    async fn handle_handshake(
        &mut self,
        operation: OperationType,
        payload: Vec<u8>,
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        if operation != OperationType::EncryptionHandshake {
            return Ok(self.fail(format!("expected a handshake message, got {operation:?}")));
        }
        match self.session.on_message(&payload) {
            Ok(response) => {
                if let Some(response) = response {
                    self.send_message(OperationType::EncryptionHandshake, &response, false)
                        .await?;
                }
                if self.session.state() == HandshakeState::VerificationNeeded {
                    if let Some(code) = self.session.verification_code() {
                        let code = code.to_string();
                        info!("verification code ready");
                        return Ok(vec![EnrollmentEvent::VerificationCodeAvailable { code }]);
                    }
                }
                Ok(Vec::new())
            }
            Err(err) => Ok(self.fail(format!("handshake failed: {err}"))),
        }
    }

    async fn handle_secure(
        &mut self,
        operation: OperationType,
        payload: Vec<u8>,
    ) -> Result<Vec<EnrollmentEvent>, EnrollmentError> {
        match operation {
            OperationType::ClientMessage => {
                let user = self
                    .user
                    .ok_or_else(|| EnrollmentError::unexpected_state("no enrolling user"))?;
                info!(len = payload.len(), "escrow token received");
                self.delegate.add_escrow_token(payload, user).await?;
                Ok(Vec::new())
            }
            other => {
                warn!(?other, "ignoring message after encryption setup");
                Ok(Vec::new())
            }
        }
    }

    async fn on_ack(&mut self, remote: &RemoteDevice) -> Result<(), EnrollmentError> {
        if self.outbound.is_empty() {
            debug!("ack with no queued fragments; ignoring");
            return Ok(());
        }
        debug!(remaining = self.outbound.len(), "ack received, resuming transmission");
        self.pump_outbound(remote).await
    }

    /// Fragment `payload` onto the outbound queue. Transmission starts
    /// right away only when nothing is already in flight; otherwise the
    /// message waits behind the queued fragments, so two logical messages
    /// never interleave on the wire.
    async fn send_message(
        &mut self,
        operation: OperationType,
        payload: &[u8],
        is_encrypted: bool,
    ) -> Result<(), EnrollmentError> {
        let remote = self
            .remote
            .clone()
            .ok_or_else(|| EnrollmentError::unexpected_state("no connected device to send to"))?;
        let packets = fragment(operation, payload, is_encrypted, self.config.max_packet_size)?;
        let idle = self.outbound.is_empty();
        debug!(?operation, fragments = packets.len(), idle, "queueing message");
        self.outbound.extend(packets);
        if idle {
            self.pump_outbound(&remote).await?;
        }
        Ok(())
    }

    /// Send queued fragments until one requires a peer acknowledgment.
    ///
    /// A non-terminal fragment must be acknowledged before its successor
    /// goes out; a terminal fragment ends its message, so the next queued
    /// message may start immediately. The queue is therefore non-empty
    /// exactly while an acknowledgment is outstanding.
    async fn pump_outbound(&mut self, remote: &RemoteDevice) -> Result<(), EnrollmentError> {
        while let Some(packet) = self.outbound.pop_front() {
            let awaits_ack = !packet.is_last;
            self.transport.send(remote, packet).await?;
            if awaits_ack {
                break;
            }
        }
        Ok(())
    }

    fn fail(&mut self, reason: String) -> Vec<EnrollmentEvent> {
        warn!(reason = %reason, "enrollment aborted");
        self.reset();
        vec![
            EnrollmentEvent::EnrollmentFailed { reason },
            EnrollmentEvent::DisconnectRequested,
        ]
    }

    fn reset(&mut self) {
        self.state = EnrollmentState::None;
        self.session = HandshakeSession::new((self.suite_factory)());
        self.reassembler.reset();
        self.outbound.clear();
        self.remote = None;
        self.user = None;
        self.peer_device_id = None;
        self.peer_name = None;
        self.pending_tokens.clear();
    }
}
