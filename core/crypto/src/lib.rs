//! Cryptographic primitives for VaultX.
//!
//! This module provides:
//! - Key derivation using Argon2id (master keys and PIN transfer keys)
//! - Authenticated encryption producing `{ciphertext, iv}` envelopes
//! - Secure key management with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - Decryption failure is authenticated, making it a reliable
//!   wrong-key signal

pub mod envelope;
pub mod kdf;
pub mod keys;

pub use envelope::{decrypt, decrypt_json, encrypt, Envelope};
pub use kdf::{derive_key, derive_transfer_key};
pub use keys::{MasterKey, Salt, KEY_LENGTH, SALT_LENGTH};
