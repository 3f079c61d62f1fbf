//! Key derivation using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks. Parameters
//! are fixed so the same (password, salt) pair always yields the same
//! key on every device.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::keys::{MasterKey, Salt, KEY_LENGTH, SALT_LENGTH};
use vaultx_common::{Error, Result};

/// Memory cost in KiB (32 MiB). Sized for sub-second derivation on
/// mobile-class CPUs.
const MEMORY_COST: u32 = 32768;

/// Number of iterations.
const TIME_COST: u32 = 3;

/// Degree of parallelism.
const PARALLELISM: u32 = 2;

/// Fixed, publicly-known salt for PIN-based transfer keys.
///
/// Deliberately not a per-user secret: both sides of a QR transfer must
/// derive the same key from the PIN alone. The weakened key space is
/// bounded by the PIN's single-use, short-lived role.
const TRANSFER_SALT: [u8; SALT_LENGTH] = *b"vaultx/transfer!";

fn argon2id() -> Result<Argon2<'static>> {
    let params = Params::new(MEMORY_COST, TIME_COST, PARALLELISM, Some(KEY_LENGTH))
        .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Derive a master key from a password and salt.
///
/// # Postconditions
/// - Deterministic: the same inputs always yield the same key
/// - Different salts yield different keys with overwhelming probability
///
/// # Errors
/// - Returns error if password is empty
/// - Returns error if the KDF itself fails
///
/// # Security
/// - The password is not stored or logged
pub fn derive_key(password: &str, salt: &Salt) -> Result<MasterKey> {
    if password.is_empty() {
        return Err(Error::InvalidInput("Password cannot be empty".to_string()));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2id()?
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(MasterKey::from_bytes(key_bytes))
}

/// Derive an ephemeral transfer key from a short numeric PIN.
///
/// Uses [`TRANSFER_SALT`] rather than the user's real salt so that the
/// importing device can derive the key from the PIN alone. Intended for
/// one QR transfer session; never persisted.
///
/// # Errors
/// - Returns error if the PIN is empty or contains non-digit characters
pub fn derive_transfer_key(pin: &str) -> Result<MasterKey> {
    if pin.is_empty() || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidInput(
            "Transfer PIN must be a numeric string".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2id()?
        .hash_password_into(pin.as_bytes(), &TRANSFER_SALT, &mut key_bytes)
        .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(MasterKey::from_bytes(key_bytes))
}
