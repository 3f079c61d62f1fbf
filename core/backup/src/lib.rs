//! Backup and cross-device transfer protocol for VaultX.
//!
//! Serializes the full per-user record set into a portable encrypted
//! container (file or QR payload) and reverses the process, including
//! password re-derivation when the active session key cannot decrypt an
//! import.

pub mod container;
pub mod protocol;

pub use container::{BackupContainer, BackupPayload, CONTAINER_VERSION, PAYLOAD_VERSION};
pub use protocol::{
    BackupProtocol, Credential, CredentialRequest, ImportOutcome, ImportSource, PendingRestore,
    RestoreSummary,
};
