//! Authenticated per-record encryption producing `{ciphertext, iv}`
//! envelopes.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation. The Poly1305
//! tag makes decryption failure a reliable wrong-key signal, so callers
//! can treat `None` as "not my key" without a padding-oracle ambiguity.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};
use serde::{Deserialize, Serialize};

use crate::keys::MasterKey;
use vaultx_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// The atomic unit produced by one encryption call.
///
/// Self-contained: the fresh random nonce travels with the ciphertext in
/// the `iv` field, so any holder of the right key can decrypt. Both
/// fields are base64 text, and the whole envelope serializes to a flat
/// JSON string suitable for a database column or a QR payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of ciphertext plus authentication tag.
    pub ciphertext: String,
    /// Base64 of the per-call random nonce.
    pub iv: String,
}

impl Envelope {
    /// Serialize to a flat JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse an envelope from its flat JSON form.
    ///
    /// Returns `None` on any malformed input; shape problems are a
    /// caller-policy signal here, not an error.
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Encrypt a text payload under the given key.
///
/// # Postconditions
/// - A fresh random nonce is generated per call; two encryptions of the
///   same plaintext under the same key produce different envelopes
///
/// # Errors
/// - Returns error only on cipher failure, never for data-shaped input
pub fn encrypt(plaintext: &str, key: &MasterKey) -> Result<Envelope> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(Envelope {
        ciphertext: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(nonce),
    })
}

/// Decrypt an envelope, returning `None` on any failure.
///
/// `None` covers: malformed base64, wrong nonce length, authentication
/// failure (almost always the wrong key), and non-UTF-8 plaintext.
/// Decryption failure is the only wrong-key signal in the system, which
/// is why this never returns an error for data-shaped problems.
pub fn decrypt(envelope: &Envelope, key: &MasterKey) -> Option<String> {
    let ciphertext = STANDARD.decode(&envelope.ciphertext).ok()?;
    let nonce = STANDARD.decode(&envelope.iv).ok()?;
    if nonce.len() != NONCE_SIZE || ciphertext.len() < TAG_SIZE {
        return None;
    }

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(GenericArray::from_slice(&nonce), ciphertext.as_slice())
        .ok()?;

    String::from_utf8(plaintext).ok()
}

/// Decrypt an envelope from its flat JSON form.
///
/// Returns `None` for a malformed envelope string as well as any
/// decryption failure.
pub fn decrypt_json(raw: &str, key: &MasterKey) -> Option<String> {
    let envelope = Envelope::from_json(raw)?;
    decrypt(&envelope, key)
}
