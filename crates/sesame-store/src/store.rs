//! File-backed trusted-device store.

use crate::{Activation, EscrowTokenRecord, StoreError, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn default_enrollment_enabled() -> bool {
    true
}

/// The on-disk snapshot. Written in full on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreSnapshot {
    /// Host unique id, generated on first use and stable until the file is
    /// deleted
    unique_id: Option<Uuid>,
    #[serde(default = "default_enrollment_enabled")]
    enrollment_enabled: bool,
    records: Vec<EscrowTokenRecord>,
    /// Session keys per peer device id, hex encoded
    session_keys: HashMap<String, String>,
}

/// Durable mapping from escrow-token handles to trusted-device records.
///
/// The store is shared by all device sessions and by read-only consumers
/// such as the unlock flow. Mutations are mutually exclusive and commit to
/// disk before returning; reads observe a consistent snapshot.
#[derive(Debug)]
pub struct TrustedDeviceStore {
    path: PathBuf,
    inner: RwLock<StoreSnapshot>,
}

impl TrustedDeviceStore {
    /// Open the store at `path`, loading any existing snapshot.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
            debug!(
                path = %path.display(),
                records = snapshot.records.len(),
                "loaded trusted-device snapshot"
            );
            snapshot
        } else {
            StoreSnapshot {
                enrollment_enabled: true,
                ..StoreSnapshot::default()
            }
        };
        Ok(Self {
            path,
            inner: RwLock::new(snapshot),
        })
    }

    /// Insert or replace the record for `handle`, marking it active.
    ///
    /// At most one active record may exist per `(owning_user,
    /// remote_address)` pair: if another active handle is already mapped to
    /// the same address for this user, it is removed in the same commit and
    /// returned as [`Activation::superseded`] so the caller can request its
    /// deactivation from the credential subsystem.
    pub async fn activate(
        &self,
        handle: u64,
        remote_address: &str,
        owning_user: UserId,
        display_name: &str,
    ) -> Result<Activation, StoreError> {
        let mut snapshot = self.inner.write().await;

        if let Some(existing) = snapshot.records.iter().find(|r| r.token_handle == handle) {
            if existing.owning_user != owning_user {
                return Err(StoreError::consistency(format!(
                    "handle {handle} already belongs to user {}, refusing write for user {owning_user}",
                    existing.owning_user
                )));
            }
        }

        let superseded = snapshot
            .records
            .iter()
            .find(|r| {
                r.active
                    && r.owning_user == owning_user
                    && r.remote_address == remote_address
                    && r.token_handle != handle
            })
            .map(|r| r.token_handle);

        if let Some(old_handle) = superseded {
            info!(
                old_handle,
                new_handle = handle,
                address = remote_address,
                user = %owning_user,
                "device re-enrolled; superseding prior record"
            );
        }

        snapshot
            .records
            .retain(|r| r.token_handle != handle && Some(r.token_handle) != superseded);
        snapshot.records.push(EscrowTokenRecord {
            token_handle: handle,
            remote_address: remote_address.to_string(),
            owning_user,
            display_name: display_name.to_string(),
            active: true,
        });

        self.commit(&snapshot).await?;
        info!(
            handle,
            address = remote_address,
            user = %owning_user,
            name = display_name,
            "trusted device activated"
        );
        Ok(Activation { superseded })
    }

    /// Remove the record for `handle` if present. Removing an unknown
    /// handle is a no-op, not an error.
    pub async fn deactivate(&self, handle: u64, owning_user: UserId) -> Result<(), StoreError> {
        let mut snapshot = self.inner.write().await;
        let before = snapshot.records.len();
        snapshot
            .records
            .retain(|r| !(r.token_handle == handle && r.owning_user == owning_user));
        if snapshot.records.len() == before {
            debug!(handle, user = %owning_user, "deactivate of unknown handle ignored");
            return Ok(());
        }
        self.commit(&snapshot).await?;
        info!(handle, user = %owning_user, "trusted device deactivated");
        Ok(())
    }

    /// Snapshot of all records belonging to `owning_user`.
    pub async fn records_for_user(&self, owning_user: UserId) -> Vec<EscrowTokenRecord> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .filter(|r| r.owning_user == owning_user)
            .cloned()
            .collect()
    }

    /// Reverse lookup from a token handle to its owning user.
    pub async fn owning_user_for_handle(&self, handle: u64) -> Option<UserId> {
        self.inner
            .read()
            .await
            .records
            .iter()
            .find(|r| r.token_handle == handle)
            .map(|r| r.owning_user)
    }

    /// Whether the token behind `handle` is currently active.
    pub async fn is_handle_active(&self, handle: u64) -> bool {
        self.inner
            .read()
            .await
            .records
            .iter()
            .any(|r| r.token_handle == handle && r.active)
    }

    /// The host's unique identifier, generated and persisted on first use.
    pub async fn unique_id(&self) -> Result<Uuid, StoreError> {
        {
            let snapshot = self.inner.read().await;
            if let Some(id) = snapshot.unique_id {
                return Ok(id);
            }
        }
        let mut snapshot = self.inner.write().await;
        // Re-check under the write guard; another task may have raced us.
        if let Some(id) = snapshot.unique_id {
            return Ok(id);
        }
        let id = Uuid::new_v4();
        snapshot.unique_id = Some(id);
        self.commit(&snapshot).await?;
        info!(unique_id = %id, "generated host unique id");
        Ok(id)
    }

    /// Persist the session key agreed with `device_id`, replacing any prior
    /// key for that device.
    pub async fn save_session_key(&self, device_id: &str, key: &[u8]) -> Result<(), StoreError> {
        let mut snapshot = self.inner.write().await;
        if snapshot.session_keys.contains_key(device_id) {
            warn!(device = device_id, "replacing existing session key");
        }
        snapshot
            .session_keys
            .insert(device_id.to_string(), hex::encode(key));
        self.commit(&snapshot).await
    }

    /// The stored session key for `device_id`, if any.
    pub async fn session_key(&self, device_id: &str) -> Option<Vec<u8>> {
        let snapshot = self.inner.read().await;
        let encoded = snapshot.session_keys.get(device_id)?;
        hex::decode(encoded).ok()
    }

    /// Forget the session key for `device_id`. No-op if none is stored.
    pub async fn clear_session_key(&self, device_id: &str) -> Result<(), StoreError> {
        let mut snapshot = self.inner.write().await;
        if snapshot.session_keys.remove(device_id).is_none() {
            return Ok(());
        }
        self.commit(&snapshot).await
    }

    /// Enable or disable enrollment of new trusted devices.
    pub async fn set_enrollment_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        let mut snapshot = self.inner.write().await;
        snapshot.enrollment_enabled = enabled;
        self.commit(&snapshot).await?;
        info!(enabled, "trusted-device enrollment toggled");
        Ok(())
    }

    /// Whether new enrollments are currently allowed.
    pub async fn enrollment_enabled(&self) -> bool {
        self.inner.read().await.enrollment_enabled
    }

    /// Durably write the snapshot: serialize to a sibling temp file, then
    /// rename over the live file so readers never observe a torn write.
    /// The filesystem work runs on the blocking pool; the caller's write
    /// guard stays held, keeping mutation and commit atomic.
    async fn commit(&self, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
        let serialized = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path.clone();
        let tmp = self.tmp_path();
        tokio::task::spawn_blocking(move || {
            std::fs::write(&tmp, &serialized)?;
            std::fs::rename(&tmp, &path)
        })
        .await
        .map_err(|err| StoreError::storage(format!("commit task failed: {err}")))??;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
