//! Common error types for VaultX.

use thiserror::Error;

/// Top-level error type for VaultX operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrong password or PIN: login verifier mismatch, or an import
    /// decrypt failure when an explicit credential was supplied.
    #[error("Invalid credential")]
    InvalidCredential,

    /// A portable container or remote backup carries no salt, so the key
    /// cannot be re-derived from a password.
    #[error("No salt available to derive the key")]
    MissingSalt,

    /// The outer backup container failed structural validation.
    #[error("Malformed backup container: {0}")]
    MalformedContainer(String),

    /// The decrypted inner payload failed structural validation.
    #[error("Malformed backup payload: {0}")]
    MalformedPayload(String),

    /// Operation attempted without an authenticated session key.
    #[error("No active session")]
    NoActiveSession,

    /// Backing record store or remote store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote call exceeded the caller-supplied deadline. Retryable.
    #[error("Remote operation timed out: {0}")]
    Timeout(String),

    /// Cryptographic operation failed (never used for wrong-key signals).
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
