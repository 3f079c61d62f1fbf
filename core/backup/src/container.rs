//! Portable backup container format.
//!
//! Version 1 is the envelope fields alone and is only importable by a
//! device already holding the right key. Version 2 adds the user's salt
//! in the clear so a fresh install can re-derive the key from a
//! password. The version is detected by the presence of the salt field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vaultx_common::{Error, Result};
use vaultx_crypto::{Envelope, Salt};

/// Current container version written on export.
pub const CONTAINER_VERSION: u32 = 2;

/// Inner payload version.
pub const PAYLOAD_VERSION: u32 = 1;

/// Versioned outer structure wrapping one encrypted envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupContainer {
    /// Present from version 2 onward.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// The exporting user's salt; required for cross-device import.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<Salt>,
    /// Base64 ciphertext of the serialized payload.
    pub ciphertext: String,
    /// Base64 nonce of the envelope.
    pub iv: String,
}

impl BackupContainer {
    /// Build a current-version container around an envelope.
    pub fn new(salt: Salt, envelope: Envelope) -> Self {
        Self {
            version: Some(CONTAINER_VERSION),
            salt: Some(salt),
            ciphertext: envelope.ciphertext,
            iv: envelope.iv,
        }
    }

    /// Effective container version: salt present means version 2.
    pub fn effective_version(&self) -> u32 {
        if self.salt.is_some() {
            CONTAINER_VERSION
        } else {
            1
        }
    }

    /// The wrapped envelope.
    pub fn envelope(&self) -> Envelope {
        Envelope {
            ciphertext: self.ciphertext.clone(),
            iv: self.iv.clone(),
        }
    }

    /// Parse a container from exported JSON.
    ///
    /// # Errors
    /// - `MalformedContainer` on any structural problem
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::MalformedContainer(e.to_string()))
    }

    /// Serialize for a file or QR payload.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// The decrypted inner payload.
///
/// `data` is required: a payload without an items array is rejected
/// outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupPayload {
    pub version: u32,
    pub username: String,
    pub date: DateTime<Utc>,
    pub data: Vec<Value>,
}

impl BackupPayload {
    /// Build a payload for the given user and item set.
    pub fn new(username: String, data: Vec<Value>) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            username,
            date: Utc::now(),
            data,
        }
    }

    /// Parse the decrypted plaintext.
    ///
    /// # Errors
    /// - `MalformedPayload` when the structure is wrong or `data` is
    ///   missing
    pub fn parse(plaintext: &str) -> Result<Self> {
        serde_json::from_str(plaintext).map_err(|e| Error::MalformedPayload(e.to_string()))
    }

    /// Serialize for encryption.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}
