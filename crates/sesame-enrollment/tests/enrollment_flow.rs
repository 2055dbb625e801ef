//! End-to-end enrollment scenarios driven against recording fakes for the
//! transport and the credential subsystem.

use sesame_enrollment::{
    BleTransport, EnrollmentConfig, EnrollmentController, EnrollmentError, EnrollmentEvent,
    EnrollmentState, EscrowTokenDelegate, RemoteDevice, TrustedDeviceManager,
};
use sesame_handshake::{CipherSuite, InsecureCipherSuite, CONFIRMATION_SIGNAL};
use sesame_store::{TrustedDeviceStore, UserId};
use sesame_wire::{OperationType, Packet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const USER: UserId = UserId(10);
const ADDRESS: &str = "00:11:22:33:AA:BB";

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Packet>>,
}

impl RecordingTransport {
    async fn sent(&self) -> Vec<Packet> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl BleTransport for RecordingTransport {
    async fn send(&self, _remote: &RemoteDevice, packet: Packet) -> Result<(), EnrollmentError> {
        self.sent.lock().await.push(packet);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingDelegate {
    added: Mutex<Vec<(Vec<u8>, UserId)>>,
    removed: Mutex<Vec<(u64, UserId)>>,
}

#[async_trait::async_trait]
impl EscrowTokenDelegate for RecordingDelegate {
    async fn add_escrow_token(&self, token: Vec<u8>, user: UserId) -> Result<(), EnrollmentError> {
        self.added.lock().await.push((token, user));
        Ok(())
    }

    async fn remove_escrow_token(&self, handle: u64, user: UserId) -> Result<(), EnrollmentError> {
        self.removed.lock().await.push((handle, user));
        Ok(())
    }
}

struct Harness {
    controller: EnrollmentController,
    transport: Arc<RecordingTransport>,
    delegate: Arc<RecordingDelegate>,
    store: Arc<TrustedDeviceStore>,
}

fn harness_with_mtu(dir: &tempfile::TempDir, max_packet_size: usize) -> Harness {
    let store = Arc::new(TrustedDeviceStore::open(dir.path().join("trust.json")).unwrap());
    let transport = Arc::new(RecordingTransport::default());
    let delegate = Arc::new(RecordingDelegate::default());
    let config = EnrollmentConfig {
        max_packet_size,
        ..EnrollmentConfig::default()
    };
    let controller = EnrollmentController::new(
        config,
        store.clone(),
        transport.clone(),
        delegate.clone(),
        Box::new(|| Box::new(InsecureCipherSuite::new()) as Box<dyn CipherSuite>),
    );
    Harness {
        controller,
        transport,
        delegate,
        store,
    }
}

fn harness(dir: &tempfile::TempDir) -> Harness {
    harness_with_mtu(dir, 20)
}

fn remote() -> RemoteDevice {
    RemoteDevice {
        address: ADDRESS.to_string(),
        name: Some("Phone".to_string()),
    }
}

fn client_message(payload: &[u8]) -> Vec<u8> {
    Packet {
        operation: OperationType::ClientMessage,
        is_encrypted: false,
        is_last: true,
        payload: payload.to_vec(),
    }
    .to_bytes()
}

fn handshake_message(payload: &[u8]) -> Vec<u8> {
    Packet {
        operation: OperationType::EncryptionHandshake,
        is_encrypted: false,
        is_last: true,
        payload: payload.to_vec(),
    }
    .to_bytes()
}

/// Drive the controller from connection to the encrypted phase, returning
/// the peer device id the fake phone identified itself with.
async fn establish(harness: &mut Harness) -> Uuid {
    harness
        .controller
        .on_connected(remote(), USER)
        .await
        .unwrap();
    assert_eq!(harness.controller.state(), EnrollmentState::AwaitingUniqueId);

    let peer_id = Uuid::new_v4();
    harness
        .controller
        .on_data_received(&client_message(peer_id.as_bytes()))
        .await
        .unwrap();
    assert_eq!(
        harness.controller.state(),
        EnrollmentState::AwaitingEncryption
    );

    harness
        .controller
        .on_data_received(&handshake_message(InsecureCipherSuite::INIT))
        .await
        .unwrap();
    let events = harness
        .controller
        .on_data_received(&handshake_message(InsecureCipherSuite::CLIENT_RESPONSE))
        .await
        .unwrap();
    assert_eq!(
        events,
        vec![EnrollmentEvent::VerificationCodeAvailable {
            code: InsecureCipherSuite::VERIFICATION_CODE.to_string()
        }]
    );

    harness.controller.accept_verification().await.unwrap();
    assert_eq!(
        harness.controller.state(),
        EnrollmentState::EncryptionComplete
    );
    peer_id
}

#[tokio::test]
async fn full_enrollment_persists_the_device() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    let peer_id = establish(&mut harness).await;

    // The wire saw: host unique id, handshake response, confirmation.
    let sent = harness.transport.sent().await;
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].operation, OperationType::ClientMessage);
    assert_eq!(
        sent[0].payload,
        harness.store.unique_id().await.unwrap().as_bytes()
    );
    assert_eq!(sent[1].payload, InsecureCipherSuite::INIT_RESPONSE);
    assert_eq!(sent[2].payload, CONFIRMATION_SIGNAL);

    // The agreed key is persisted for the unlock flow.
    assert_eq!(
        harness.store.session_key(&peer_id.to_string()).await.as_deref(),
        Some(InsecureCipherSuite::SESSION_KEY)
    );

    // Phone sends its escrow token over the secure channel.
    harness
        .controller
        .on_data_received(&client_message(b"escrow-token"))
        .await
        .unwrap();
    assert_eq!(
        *harness.delegate.added.lock().await,
        vec![(b"escrow-token".to_vec(), USER)]
    );

    // Credential subsystem issues and activates handle 42.
    let events = harness.controller.on_token_added(42);
    assert_eq!(events, vec![EnrollmentEvent::TokenAdded { handle: 42 }]);
    let events = harness
        .controller
        .on_token_activated(42, USER, true)
        .await
        .unwrap();
    assert_eq!(
        events,
        vec![EnrollmentEvent::EnrollmentCompleted { handle: 42 }]
    );

    // The handle went back to the peer over the encrypted channel.
    let sent = harness.transport.sent().await;
    let last = sent.last().unwrap();
    assert_eq!(last.operation, OperationType::ClientMessage);
    assert!(last.is_encrypted);
    assert_eq!(last.payload, 42u64.to_be_bytes());

    // And the record is durable.
    assert_eq!(harness.store.owning_user_for_handle(42).await, Some(USER));
    let records = harness.store.records_for_user(USER).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].remote_address, ADDRESS);
    assert_eq!(records[0].display_name, "Phone");
}

#[tokio::test]
async fn reenrollment_supersedes_the_previous_handle() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);

    establish(&mut harness).await;
    harness.controller.on_token_added(42);
    harness
        .controller
        .on_token_activated(42, USER, true)
        .await
        .unwrap();
    harness.controller.on_disconnected();
    assert_eq!(harness.controller.state(), EnrollmentState::None);

    // Same device enrolls again and gets a new handle.
    establish(&mut harness).await;
    harness.controller.on_token_added(99);
    let events = harness
        .controller
        .on_token_activated(99, USER, true)
        .await
        .unwrap();
    assert_eq!(
        events,
        vec![EnrollmentEvent::EnrollmentCompleted { handle: 99 }]
    );

    // The stale token was handed back for removal and only 99 remains.
    assert!(harness
        .delegate
        .removed
        .lock()
        .await
        .contains(&(42, USER)));
    let manager = TrustedDeviceManager::new(harness.store.clone(), harness.delegate.clone());
    let devices = manager.list_enrolled_devices(USER).await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].token_handle, 99);
}

#[tokio::test]
async fn terminate_cleans_up_only_pending_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    establish(&mut harness).await;

    harness.controller.on_token_added(8);
    harness.controller.on_token_activated(8, USER, true).await.unwrap();
    harness.controller.on_token_added(7);

    let events = harness.controller.terminate_enrollment().await.unwrap();
    assert_eq!(events, vec![EnrollmentEvent::DisconnectRequested]);
    assert_eq!(harness.controller.state(), EnrollmentState::None);

    // Only the never-activated token was discarded.
    assert_eq!(*harness.delegate.removed.lock().await, vec![(7, USER)]);
    assert!(harness.store.is_handle_active(8).await);
}

#[tokio::test]
async fn disabled_enrollment_refuses_connections() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    harness.store.set_enrollment_enabled(false).await.unwrap();

    let err = harness
        .controller
        .on_connected(remote(), USER)
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::NotAllowed));
    assert_eq!(harness.controller.state(), EnrollmentState::None);
    assert!(harness.transport.sent().await.is_empty());
}

#[tokio::test]
async fn outbound_fragments_are_paced_by_acks() {
    let dir = tempfile::tempdir().unwrap();
    // 3 payload bytes per packet, so the 16-byte unique id takes 6.
    let mut harness = harness_with_mtu(&dir, 5);
    harness
        .controller
        .on_connected(remote(), USER)
        .await
        .unwrap();

    // Only the head fragment goes out unprompted.
    assert_eq!(harness.transport.sent().await.len(), 1);

    let ack = Packet::ack().to_bytes();
    for _ in 0..5 {
        harness.controller.on_data_received(&ack).await.unwrap();
    }
    let sent = harness.transport.sent().await;
    assert_eq!(sent.len(), 6);
    assert!(sent[..5].iter().all(|p| !p.is_last));
    assert!(sent[5].is_last);

    let reassembled: Vec<u8> = sent.iter().flat_map(|p| p.payload.clone()).collect();
    assert_eq!(
        reassembled,
        harness.store.unique_id().await.unwrap().as_bytes()
    );

    // A surplus ack is ignored.
    harness.controller.on_data_received(&ack).await.unwrap();
    assert_eq!(harness.transport.sent().await.len(), 6);
}

#[tokio::test]
async fn queued_messages_drain_in_order() {
    let dir = tempfile::tempdir().unwrap();
    // 3 payload bytes per packet: the unique id takes 6 fragments, the
    // handshake response 4.
    let mut harness = harness_with_mtu(&dir, 5);
    harness
        .controller
        .on_connected(remote(), USER)
        .await
        .unwrap();
    assert_eq!(harness.transport.sent().await.len(), 1);

    // Device id and handshake init arrive before any fragment was acked;
    // the handshake response must wait behind the queued unique-id
    // fragments instead of jumping ahead of them.
    let peer_id = Uuid::new_v4();
    harness
        .controller
        .on_data_received(&client_message(peer_id.as_bytes()))
        .await
        .unwrap();
    harness
        .controller
        .on_data_received(&handshake_message(InsecureCipherSuite::INIT))
        .await
        .unwrap();
    assert_eq!(harness.transport.sent().await.len(), 1);

    let ack = Packet::ack().to_bytes();
    for _ in 0..8 {
        harness.controller.on_data_received(&ack).await.unwrap();
    }
    let sent = harness.transport.sent().await;
    assert_eq!(sent.len(), 10);
    assert!(sent[..6]
        .iter()
        .all(|p| p.operation == OperationType::ClientMessage));
    assert!(sent[6..]
        .iter()
        .all(|p| p.operation == OperationType::EncryptionHandshake));

    // Both logical messages survive intact.
    let unique_id: Vec<u8> = sent[..6].iter().flat_map(|p| p.payload.clone()).collect();
    assert_eq!(
        unique_id,
        harness.store.unique_id().await.unwrap().as_bytes()
    );
    let response: Vec<u8> = sent[6..].iter().flat_map(|p| p.payload.clone()).collect();
    assert_eq!(response, InsecureCipherSuite::INIT_RESPONSE);
}

#[tokio::test]
async fn activation_for_a_different_user_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    establish(&mut harness).await;
    harness.controller.on_token_added(42);

    let err = harness
        .controller
        .on_token_activated(42, UserId(99), true)
        .await
        .unwrap_err();
    assert!(matches!(err, EnrollmentError::UnexpectedState { .. }));
    assert!(harness.store.records_for_user(USER).await.is_empty());
    assert!(harness.store.records_for_user(UserId(99)).await.is_empty());

    // The enrolling user's activation still completes afterwards.
    let events = harness
        .controller
        .on_token_activated(42, USER, true)
        .await
        .unwrap();
    assert_eq!(
        events,
        vec![EnrollmentEvent::EnrollmentCompleted { handle: 42 }]
    );
}

#[tokio::test]
async fn inbound_fragments_are_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    harness
        .controller
        .on_connected(remote(), USER)
        .await
        .unwrap();

    let peer_id = Uuid::new_v4();
    let (head, tail) = peer_id.as_bytes().split_at(8);
    let first = Packet {
        operation: OperationType::ClientMessage,
        is_encrypted: false,
        is_last: false,
        payload: head.to_vec(),
    };
    harness
        .controller
        .on_data_received(&first.to_bytes())
        .await
        .unwrap();

    // The partial fragment was acknowledged, not dispatched.
    assert_eq!(harness.transport.sent().await.last(), Some(&Packet::ack()));
    assert_eq!(harness.controller.state(), EnrollmentState::AwaitingUniqueId);

    let second = Packet {
        operation: OperationType::ClientMessage,
        is_encrypted: false,
        is_last: true,
        payload: tail.to_vec(),
    };
    harness
        .controller
        .on_data_received(&second.to_bytes())
        .await
        .unwrap();
    assert_eq!(
        harness.controller.state(),
        EnrollmentState::AwaitingEncryption
    );
}

#[tokio::test]
async fn malformed_packets_are_dropped_without_aborting() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    harness
        .controller
        .on_connected(remote(), USER)
        .await
        .unwrap();

    // Unknown operation tag, then a truncated header.
    let events = harness
        .controller
        .on_data_received(&[0x7f, 0x02, 0xaa])
        .await
        .unwrap();
    assert!(events.is_empty());
    let events = harness.controller.on_data_received(&[0x02]).await.unwrap();
    assert!(events.is_empty());

    // The flow is undisturbed.
    assert_eq!(harness.controller.state(), EnrollmentState::AwaitingUniqueId);
    let peer_id = Uuid::new_v4();
    harness
        .controller
        .on_data_received(&client_message(peer_id.as_bytes()))
        .await
        .unwrap();
    assert_eq!(
        harness.controller.state(),
        EnrollmentState::AwaitingEncryption
    );
}

#[tokio::test]
async fn handshake_failure_resets_and_requests_disconnect() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    harness
        .controller
        .on_connected(remote(), USER)
        .await
        .unwrap();
    let peer_id = Uuid::new_v4();
    harness
        .controller
        .on_data_received(&client_message(peer_id.as_bytes()))
        .await
        .unwrap();

    let events = harness
        .controller
        .on_data_received(&handshake_message(b"garbage"))
        .await
        .unwrap();
    assert!(matches!(
        events.as_slice(),
        [
            EnrollmentEvent::EnrollmentFailed { .. },
            EnrollmentEvent::DisconnectRequested
        ]
    ));
    assert_eq!(harness.controller.state(), EnrollmentState::None);

    // Post-reset chatter is ignored, not fatal.
    let events = harness
        .controller
        .on_data_received(&handshake_message(InsecureCipherSuite::INIT))
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn failed_activation_aborts_the_enrollment() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = harness(&dir);
    establish(&mut harness).await;

    harness.controller.on_token_added(42);
    let events = harness
        .controller
        .on_token_activated(42, USER, false)
        .await
        .unwrap();
    assert!(matches!(
        events.as_slice(),
        [
            EnrollmentEvent::EnrollmentFailed { .. },
            EnrollmentEvent::DisconnectRequested
        ]
    ));
    assert_eq!(*harness.delegate.removed.lock().await, vec![(42, USER)]);
    assert!(harness.store.records_for_user(USER).await.is_empty());
}
