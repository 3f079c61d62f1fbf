//! Local record store collaborator trait.
//!
//! The vault treats the on-device relational store as a keyed CRUD
//! collaborator: every call is scoped by username, making cross-user
//! access structurally impossible rather than convention-based.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vaultx_common::{Result, Username};

/// One encrypted secret row as persisted by the record store.
///
/// `title` is an opaque placeholder, never the real item title; the real
/// fields live inside the encrypted `data` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned id, unique per user.
    pub id: i64,
    /// Owning account.
    pub username: String,
    /// Opaque placeholder column.
    pub title: String,
    /// Flat-JSON `{ciphertext, iv}` envelope of the item fields.
    pub data: String,
    /// Unix timestamp of row creation.
    pub created_at: i64,
}

/// Placeholder written to the plaintext `title` column.
pub const TITLE_PLACEHOLDER: &str = "Encrypted Item";

/// Keyed CRUD over encrypted secret rows, scoped by username.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new encrypted row, returning it with its assigned id.
    async fn insert(&self, username: &Username, data: &str) -> Result<StoredRecord>;

    /// Fetch one row by id, scoped to the user.
    async fn get(&self, username: &Username, id: i64) -> Result<Option<StoredRecord>>;

    /// List every row belonging to the user. Order is unspecified.
    async fn list(&self, username: &Username) -> Result<Vec<StoredRecord>>;

    /// Overwrite the envelope of an existing row.
    ///
    /// Returns `false` when no row matched (not found for this user),
    /// distinct from a storage failure.
    async fn update(&self, username: &Username, id: i64, data: &str) -> Result<bool>;

    /// Delete a row by id. Returns `false` when zero rows were affected.
    async fn delete(&self, username: &Username, id: i64) -> Result<bool>;

    /// Atomically replace the user's whole row set.
    ///
    /// Delete-then-bulk-insert in a single transaction: a concurrent
    /// reader sees either the old set or the new set, never a partial
    /// mix. Returns the number of rows inserted.
    async fn replace_all(&self, username: &Username, rows: &[String]) -> Result<usize>;

    /// Remove every row for every user. Destructive reset support.
    async fn purge_all(&self) -> Result<()>;
}
