//! Per-user CRUD over encrypted secret records.
//!
//! Every operation takes the active [`Session`]: the session is the
//! proof of authentication and the only source of the key, and its
//! username scopes every call into the record store.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use vaultx_auth::Session;
use vaultx_common::{Error, Result};
use vaultx_crypto::{decrypt_json, encrypt};
use vaultx_storage::{RecordStore, StoredRecord};

use crate::item::{strip_store_fields, ItemFields, VaultItem};

/// Post-write hook fired after each successful mutation.
///
/// Implementations must return quickly and never fail the originating
/// call; the auto-backup queue is the intended consumer.
pub trait WriteHook: Send + Sync {
    fn after_write(&self, session: &Session);
}

/// Result of loading the vault: the decryptable items plus the count of
/// rows that were skipped.
#[derive(Debug, Default)]
pub struct VaultSnapshot {
    /// Successfully decrypted items. Order is unspecified.
    pub items: Vec<VaultItem>,
    /// Rows dropped because they failed to decrypt or parse, usually
    /// restored under a different password. Surface as a warning.
    pub failed: usize,
}

/// Encrypting CRUD layer over the record store.
pub struct VaultStore<R: RecordStore> {
    records: Arc<R>,
    hook: Option<Arc<dyn WriteHook>>,
}

impl<R: RecordStore> VaultStore<R> {
    /// Create a store without a post-write hook.
    pub fn new(records: Arc<R>) -> Self {
        Self {
            records,
            hook: None,
        }
    }

    /// Attach a post-write hook (auto-backup trigger).
    pub fn with_hook(mut self, hook: Arc<dyn WriteHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    fn fire_hook(&self, session: &Session) {
        if let Some(hook) = &self.hook {
            hook.after_write(session);
        }
    }

    fn encrypt_fields(session: &Session, fields: &ItemFields) -> Result<String> {
        let plaintext = serde_json::to_string(&Value::Object(fields.clone()))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        encrypt(&plaintext, session.master_key())?.to_json()
    }

    fn decrypt_record(session: &Session, record: &StoredRecord) -> Option<VaultItem> {
        let plaintext = decrypt_json(&record.data, session.master_key())?;
        let fields: ItemFields = serde_json::from_str(&plaintext).ok()?;
        Some(VaultItem {
            id: record.id,
            created_at: DateTime::<Utc>::from_timestamp(record.created_at, 0)?,
            fields,
        })
    }

    /// Add a new item, returning it with its assigned id.
    pub async fn add(&self, session: &Session, mut fields: ItemFields) -> Result<VaultItem> {
        strip_store_fields(&mut fields);
        let data = Self::encrypt_fields(session, &fields)?;
        let record = self.records.insert(session.username(), &data).await?;

        debug!(user = %session.username(), id = record.id, "Added vault item");
        self.fire_hook(session);

        Ok(VaultItem {
            id: record.id,
            created_at: DateTime::<Utc>::from_timestamp(record.created_at, 0)
                .unwrap_or_else(Utc::now),
            fields,
        })
    }

    /// Merge a patch into an existing item and re-encrypt it.
    ///
    /// # Errors
    /// - `NotFound` when the id does not exist for this user
    /// - `Crypto` when the row exists but the active key cannot read it
    pub async fn update(&self, session: &Session, id: i64, patch: ItemFields) -> Result<VaultItem> {
        let record = self
            .records
            .get(session.username(), id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No item with id {}", id)))?;

        let mut item = Self::decrypt_record(session, &record).ok_or_else(|| {
            Error::Crypto("Existing record is not readable under the active key".to_string())
        })?;

        for (key, value) in patch {
            item.fields.insert(key, value);
        }
        strip_store_fields(&mut item.fields);

        let data = Self::encrypt_fields(session, &item.fields)?;
        if !self.records.update(session.username(), id, &data).await? {
            return Err(Error::NotFound(format!("No item with id {}", id)));
        }

        debug!(user = %session.username(), id, "Updated vault item");
        self.fire_hook(session);
        Ok(item)
    }

    /// Delete an item by id.
    ///
    /// # Errors
    /// - `NotFound` when zero rows were affected
    pub async fn delete(&self, session: &Session, id: i64) -> Result<()> {
        if !self.records.delete(session.username(), id).await? {
            return Err(Error::NotFound(format!("No item with id {}", id)));
        }
        debug!(user = %session.username(), id, "Deleted vault item");
        self.fire_hook(session);
        Ok(())
    }

    /// Load every readable item for the active user.
    ///
    /// A row that fails to decrypt or parse is dropped and counted,
    /// never fatal to the whole load.
    pub async fn load_all(&self, session: &Session) -> Result<VaultSnapshot> {
        let rows = self.records.list(session.username()).await?;

        let mut snapshot = VaultSnapshot::default();
        for row in &rows {
            match Self::decrypt_record(session, row) {
                Some(item) => snapshot.items.push(item),
                None => snapshot.failed += 1,
            }
        }

        if snapshot.failed > 0 {
            warn!(
                user = %session.username(),
                failed = snapshot.failed,
                "Some records could not be decrypted; likely restored with a different password"
            );
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vaultx_auth::AuthManager;
    use vaultx_storage::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthManager::new(store.clone(), store.clone());
        let session = auth
            .register(&vaultx_common::Username::new("alice").unwrap(), "pw1")
            .await
            .unwrap();
        (store, session)
    }

    fn fields(title: &str) -> ItemFields {
        let mut f = ItemFields::new();
        f.insert("title".to_string(), json!(title));
        f.insert("category".to_string(), json!("banking"));
        f
    }

    #[tokio::test]
    async fn test_add_then_load_roundtrip() {
        let (store, session) = setup().await;
        let vault = VaultStore::new(store);

        let added = vault.add(&session, fields("Bank")).await.unwrap();
        assert!(added.id > 0);

        let snapshot = vault.load_all(&session).await.unwrap();
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].title(), Some("Bank"));
    }

    #[tokio::test]
    async fn test_foreign_key_row_is_skipped_and_counted() {
        let (store, session) = setup().await;
        let vault = VaultStore::new(store.clone());

        vault.add(&session, fields("Mine")).await.unwrap();

        // A row written under a different key.
        let other = vaultx_crypto::derive_key("other-pw", &vaultx_crypto::Salt::generate()).unwrap();
        let foreign = vaultx_crypto::encrypt("{\"title\":\"Theirs\"}", &other)
            .unwrap()
            .to_json()
            .unwrap();
        store.insert(session.username(), &foreign).await.unwrap();

        let snapshot = vault.load_all(&session).await.unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.items[0].title(), Some("Mine"));
    }

    #[tokio::test]
    async fn test_update_merges_patch_and_strips_store_fields() {
        let (store, session) = setup().await;
        let vault = VaultStore::new(store);

        let added = vault.add(&session, fields("Bank")).await.unwrap();

        let mut patch = ItemFields::new();
        patch.insert("title".to_string(), json!("New Bank"));
        patch.insert("id".to_string(), json!(999));

        let updated = vault.update(&session, added.id, patch).await.unwrap();
        assert_eq!(updated.title(), Some("New Bank"));
        assert_eq!(updated.category(), Some("banking"));
        assert!(!updated.fields.contains_key("id"));

        let snapshot = vault.load_all(&session).await.unwrap();
        assert_eq!(snapshot.items[0].title(), Some("New Bank"));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_id() {
        let (store, session) = setup().await;
        let vault = VaultStore::new(store);

        let err = vault.update(&session, 42, fields("x")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = vault.delete(&session, 42).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_hook_fires_after_each_mutation() {
        struct Counter(AtomicUsize);
        impl WriteHook for Counter {
            fn after_write(&self, _session: &Session) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let (store, session) = setup().await;
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let vault = VaultStore::new(store).with_hook(counter.clone());

        let added = vault.add(&session, fields("Bank")).await.unwrap();
        vault
            .update(&session, added.id, ItemFields::new())
            .await
            .unwrap();
        vault.delete(&session, added.id).await.unwrap();

        assert_eq!(counter.0.load(Ordering::SeqCst), 3);
    }
}
