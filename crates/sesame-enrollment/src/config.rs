//! Enrollment configuration.

use crate::EnrollmentError;
use serde::{Deserialize, Serialize};
use sesame_wire::HEADER_LEN;
use std::path::{Path, PathBuf};

/// Host-side settings for the enrollment subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    /// Display name used for enrolled devices whose transport never
    /// resolved a name
    pub default_device_name: String,
    /// Largest BLE write the peer accepts, header included. Defaults to
    /// the 20-byte minimum GATT payload
    pub max_packet_size: usize,
    /// Backing file of the trusted-device store
    pub storage_path: PathBuf,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            default_device_name: "Trusted Device".to_string(),
            max_packet_size: 20,
            storage_path: PathBuf::from("trusted_devices.json"),
        }
    }
}

impl EnrollmentConfig {
    /// Load and validate a configuration from a JSON file. Missing fields
    /// take their defaults.
    pub fn load(path: &Path) -> Result<Self, EnrollmentError> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            EnrollmentError::invalid_config(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|err| {
            EnrollmentError::invalid_config(format!("cannot parse {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), EnrollmentError> {
        if self.max_packet_size <= HEADER_LEN {
            return Err(EnrollmentError::invalid_config(format!(
                "max_packet_size {} leaves no payload room after the {HEADER_LEN}-byte header",
                self.max_packet_size
            )));
        }
        if self.default_device_name.is_empty() {
            return Err(EnrollmentError::invalid_config(
                "default_device_name must not be empty",
            ));
        }
        Ok(())
    }
}
