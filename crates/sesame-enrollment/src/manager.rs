//! Query and maintenance surface over enrolled devices.

use crate::{EnrollmentError, EscrowTokenDelegate};
use sesame_store::{TrustedDeviceStore, UserId};
use std::sync::Arc;
use tracing::info;

/// One enrolled device, as exposed to device-list UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedDeviceInfo {
    /// Handle of the active escrow token
    pub token_handle: u64,
    /// Bluetooth address of the device
    pub remote_address: String,
    /// Display name recorded at enrollment time
    pub display_name: String,
}

/// Read and maintenance operations that do not belong to any single
/// connection. Enrollment removal goes through the credential delegate
/// first so the escrow token and the stored record cannot drift apart.
pub struct TrustedDeviceManager {
    store: Arc<TrustedDeviceStore>,
    delegate: Arc<dyn EscrowTokenDelegate>,
}

impl TrustedDeviceManager {
    /// Create a manager over the shared store.
    pub fn new(store: Arc<TrustedDeviceStore>, delegate: Arc<dyn EscrowTokenDelegate>) -> Self {
        Self { store, delegate }
    }

    /// All active enrollments belonging to `user`.
    pub async fn list_enrolled_devices(&self, user: UserId) -> Vec<TrustedDeviceInfo> {
        self.store
            .records_for_user(user)
            .await
            .into_iter()
            .filter(|record| record.active)
            .map(|record| TrustedDeviceInfo {
                token_handle: record.token_handle,
                remote_address: record.remote_address,
                display_name: record.display_name,
            })
            .collect()
    }

    /// Remove one enrollment: discard the escrow token, then the record.
    pub async fn remove_enrollment(
        &self,
        handle: u64,
        user: UserId,
    ) -> Result<(), EnrollmentError> {
        info!(handle, user = %user, "removing enrollment");
        self.delegate.remove_escrow_token(handle, user).await?;
        self.store.deactivate(handle, user).await?;
        Ok(())
    }

    /// Remove every enrollment belonging to `user`.
    pub async fn remove_all_enrollments(&self, user: UserId) -> Result<(), EnrollmentError> {
        for record in self.store.records_for_user(user).await {
            self.remove_enrollment(record.token_handle, user).await?;
        }
        Ok(())
    }

    /// Whether `handle` refers to a currently active token.
    pub async fn is_token_active(&self, handle: u64) -> bool {
        self.store.is_handle_active(handle).await
    }

    /// Enable or disable enrollment of new devices.
    pub async fn set_enrollment_enabled(&self, enabled: bool) -> Result<(), EnrollmentError> {
        self.store.set_enrollment_enabled(enabled).await?;
        Ok(())
    }

    /// Whether new enrollments are currently allowed.
    pub async fn enrollment_enabled(&self) -> bool {
        self.store.enrollment_enabled().await
    }
}
