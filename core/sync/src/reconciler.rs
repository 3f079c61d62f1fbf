//! Cloud push/pull of the per-user backup document.
//!
//! One remote document per cloud identity; each local profile writes
//! its own `backup_<username>` field inside it, so several profiles can
//! share a cloud account without clobbering each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use vaultx_common::{Error, Result, Username};
use vaultx_crypto::Salt;
use vaultx_storage::{RecordStore, RemoteStore, StoredRecord, UserStore};

/// Remote backup document version (salt included).
pub const REMOTE_VERSION: u32 = 2;

/// Legacy unscoped field name written by old clients.
const LEGACY_FIELD: &str = "backup";

/// Prefix of per-user backup fields.
const FIELD_PREFIX: &str = "backup_";

/// The per-user sub-document pushed to the remote store.
#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteBackup {
    pub username: String,
    #[serde(rename = "backupTimestamp")]
    pub backup_timestamp: DateTime<Utc>,
    pub version: u32,
    /// Needed to re-derive the key on another device; absent only in
    /// documents written by pre-v2 clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salt: Option<Salt>,
    /// Raw encrypted rows exactly as stored locally.
    pub data: Vec<StoredRecord>,
}

/// Result of a pull: raw rows plus the metadata needed for the
/// two-phase decrypt flow. Nothing has been written locally.
#[derive(Debug)]
pub struct CloudBackup {
    pub rows: Vec<Value>,
    pub salt: Option<Salt>,
    pub original_user: String,
}

/// Pushes and pulls backup documents, reconciling key mismatches on the
/// import side via the backup protocol.
pub struct CloudSyncReconciler<S: RemoteStore, U: UserStore, R: RecordStore> {
    remote: Arc<S>,
    users: Arc<U>,
    records: Arc<R>,
    /// Deadline applied to each remote call; elapsing yields a
    /// retryable `Timeout`, never data corruption.
    deadline: Duration,
}

impl<S: RemoteStore, U: UserStore, R: RecordStore> CloudSyncReconciler<S, U, R> {
    /// Create a reconciler with the given per-call deadline.
    pub fn new(remote: Arc<S>, users: Arc<U>, records: Arc<R>, deadline: Duration) -> Self {
        Self {
            remote,
            users,
            records,
            deadline,
        }
    }

    fn field_for(username: &Username) -> String {
        format!("{}{}", FIELD_PREFIX, username)
    }

    /// Upload the user's full encrypted record set.
    ///
    /// Reads the rows at call time; a later push supersedes this one,
    /// which is why overlapping triggers may coalesce upstream.
    pub async fn push(&self, remote_key: &str, username: &Username) -> Result<()> {
        let rows = self.records.list(username).await?;
        let salt = self
            .users
            .load_profile(username)
            .await?
            .map(|profile| profile.salt);
        if salt.is_none() {
            warn!(user = %username, "Pushing backup without a salt; cross-device restore may fail");
        }

        let backup = RemoteBackup {
            username: username.as_str().to_string(),
            backup_timestamp: Utc::now(),
            version: REMOTE_VERSION,
            salt,
            data: rows,
        };
        let value =
            serde_json::to_value(&backup).map_err(|e| Error::Serialization(e.to_string()))?;

        timeout(
            self.deadline,
            self.remote
                .merge_field(remote_key, &Self::field_for(username), value),
        )
        .await
        .map_err(|_| Error::Timeout("Cloud push".to_string()))??;

        info!(user = %username, rows = backup.data.len(), "Pushed cloud backup");
        Ok(())
    }

    /// Fetch the remote document and pick the backup payload for this
    /// user.
    ///
    /// Resolution priority: exact `backup_<username>` match, then the
    /// legacy unscoped `backup` field, then the first field matching
    /// the backup prefix as an explicit best-effort migration fallback.
    pub async fn pull(&self, remote_key: &str, username: &Username) -> Result<CloudBackup> {
        let document = timeout(self.deadline, self.remote.fetch_document(remote_key))
            .await
            .map_err(|_| Error::Timeout("Cloud pull".to_string()))??
            .ok_or_else(|| Error::NotFound("No cloud account data found".to_string()))?;

        let exact = Self::field_for(username);
        let payload = if let Some(payload) = document.get(&exact) {
            payload
        } else if let Some(payload) = document.get(LEGACY_FIELD) {
            info!(user = %username, "Using legacy unscoped backup field");
            payload
        } else if let Some((field, payload)) = document
            .iter()
            .find(|(field, _)| field.starts_with(FIELD_PREFIX))
        {
            // Migration fallback: a backup created under a different
            // local username.
            warn!(user = %username, found = %field, "No backup for this user; falling back to another profile's backup");
            payload
        } else {
            return Err(Error::NotFound(
                "No backup found for this account (or any other profile)".to_string(),
            ));
        };

        let rows = payload
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| {
                Error::MalformedPayload("Remote backup has no data array".to_string())
            })?;
        let salt = payload
            .get("salt")
            .and_then(Value::as_str)
            .and_then(|s| Salt::decode(s).ok());
        let original_user = payload
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        Ok(CloudBackup {
            rows,
            salt,
            original_user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vaultx_storage::{MemoryRemote, MemoryStore, UserProfile};

    const KEY: &str = "cloud-user-1";

    fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    fn reconciler(
        remote: &Arc<MemoryRemote>,
        store: &Arc<MemoryStore>,
    ) -> CloudSyncReconciler<MemoryRemote, MemoryStore, MemoryStore> {
        CloudSyncReconciler::new(
            remote.clone(),
            store.clone(),
            store.clone(),
            Duration::from_secs(5),
        )
    }

    async fn seed_user(store: &MemoryStore, name: &Username) -> Salt {
        let salt = Salt::generate();
        store
            .save_profile(
                name,
                &UserProfile {
                    salt: salt.clone(),
                    verifier: "{}".to_string(),
                },
            )
            .await
            .unwrap();
        salt
    }

    #[tokio::test]
    async fn test_push_then_pull_roundtrip() {
        let remote = Arc::new(MemoryRemote::new());
        let store = Arc::new(MemoryStore::new());
        let alice = user("alice");
        let salt = seed_user(&store, &alice).await;
        store.insert(&alice, "row-blob").await.unwrap();

        let sync = reconciler(&remote, &store);
        sync.push(KEY, &alice).await.unwrap();

        let backup = sync.pull(KEY, &alice).await.unwrap();
        assert_eq!(backup.rows.len(), 1);
        assert_eq!(backup.salt.unwrap(), salt);
        assert_eq!(backup.original_user, "alice");
    }

    #[tokio::test]
    async fn test_push_scopes_by_username() {
        let remote = Arc::new(MemoryRemote::new());
        let store = Arc::new(MemoryStore::new());
        let alice = user("alice");
        let bob = user("bob");
        seed_user(&store, &alice).await;
        seed_user(&store, &bob).await;
        store.insert(&alice, "alice-row").await.unwrap();
        store.insert(&bob, "bob-row").await.unwrap();

        let sync = reconciler(&remote, &store);
        sync.push(KEY, &alice).await.unwrap();
        sync.push(KEY, &bob).await.unwrap();

        // Both sub-keys coexist in one document.
        let doc = remote.fetch_document(KEY).await.unwrap().unwrap();
        assert!(doc.contains_key("backup_alice"));
        assert!(doc.contains_key("backup_bob"));
    }

    #[tokio::test]
    async fn test_pull_prefers_exact_then_legacy_then_prefix() {
        let remote = Arc::new(MemoryRemote::new());
        let store = Arc::new(MemoryStore::new());
        let carol = user("carol");

        // Only a legacy field exists.
        remote
            .merge_field(
                KEY,
                "backup",
                json!({"username": "old", "data": [{"data": "x"}]}),
            )
            .await
            .unwrap();
        let sync = reconciler(&remote, &store);
        let backup = sync.pull(KEY, &carol).await.unwrap();
        assert_eq!(backup.original_user, "old");

        // A prefixed field from another profile beats nothing, but the
        // legacy field still wins over it.
        remote
            .merge_field(
                KEY,
                "backup_dave",
                json!({"username": "dave", "data": [{"data": "y"}]}),
            )
            .await
            .unwrap();
        let backup = sync.pull(KEY, &carol).await.unwrap();
        assert_eq!(backup.original_user, "old");

        // An exact match beats everything.
        remote
            .merge_field(
                KEY,
                "backup_carol",
                json!({"username": "carol", "data": []}),
            )
            .await
            .unwrap();
        let result = sync.pull(KEY, &carol).await.unwrap();
        assert_eq!(result.original_user, "carol");
    }

    #[tokio::test]
    async fn test_pull_missing_document_and_missing_backup() {
        let remote = Arc::new(MemoryRemote::new());
        let store = Arc::new(MemoryStore::new());
        let sync = reconciler(&remote, &store);

        let err = sync.pull(KEY, &user("alice")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        remote.merge_field(KEY, "unrelated", json!(1)).await.unwrap();
        let err = sync.pull(KEY, &user("alice")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
