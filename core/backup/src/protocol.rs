//! Export and two-phase import of whole-vault backups.
//!
//! Import deliberately runs in two phases: the common case (importing
//! one's own backup while logged in) succeeds with zero prompts using
//! the session key, while the cross-device case degrades to exactly one
//! credential prompt. The outcome is an explicit enum, never a boolean.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use vaultx_auth::Session;
use vaultx_common::{Error, Result};
use vaultx_crypto::{decrypt, decrypt_json, derive_key, derive_transfer_key, encrypt, MasterKey, Salt};
use vaultx_storage::{RecordStore, UserStore};
use vaultx_vault::item::strip_store_fields;
use vaultx_vault::{ItemFields, VaultStore};

use crate::container::{BackupContainer, BackupPayload};

/// An explicitly supplied decryption credential. Always wins over the
/// session key.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Master password; requires a salt to derive the key.
    Password(String),
    /// Short numeric transfer PIN; uses the fixed public transfer salt.
    Pin(String),
}

impl Credential {
    fn derive(&self, salt: Option<&Salt>) -> Result<MasterKey> {
        match self {
            Credential::Password(password) => {
                let salt = salt.ok_or(Error::MissingSalt)?;
                derive_key(password, salt)
            }
            Credential::Pin(pin) => derive_transfer_key(pin),
        }
    }
}

/// What the import source was, carried back so the caller can retry
/// with a credential without re-reading anything.
#[derive(Debug, Clone)]
pub enum ImportSource {
    /// A parsed file/QR container.
    Container(BackupContainer),
    /// Raw remote rows from a cloud pull.
    Rows(Vec<Value>),
}

/// Returned when no explicit credential was supplied and the session
/// key could not decrypt the import. Recoverable: prompt once and retry.
#[derive(Debug, Clone)]
pub struct CredentialRequest {
    /// The original import source.
    pub source: ImportSource,
    /// Salt embedded in the source, if any.
    pub salt: Option<Salt>,
}

/// A decrypted backup awaiting human confirmation before the
/// destructive restore.
#[derive(Debug)]
pub struct PendingRestore {
    /// Username recorded in the backup (informational; the restore
    /// always targets the active session's account).
    pub original_user: String,
    /// Decrypted item values; non-object entries are dropped at commit.
    pub items: Vec<Value>,
    /// Rows already dropped while decrypting (cloud-row imports).
    pub dropped: usize,
}

impl PendingRestore {
    /// Count of incoming items, for the confirmation gate.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// Outcome of the decrypt phase of an import.
#[derive(Debug)]
pub enum ImportOutcome {
    /// Decrypted and validated; show the count, then commit.
    Ready(PendingRestore),
    /// Could not decrypt with the session key; re-prompt and retry.
    NeedsCredential(CredentialRequest),
}

/// Result of a committed restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Items persisted.
    pub restored: usize,
    /// Items dropped along the way.
    pub dropped: usize,
}

/// Whole-vault export/import protocol.
pub struct BackupProtocol<U: UserStore, R: RecordStore> {
    users: Arc<U>,
    records: Arc<R>,
    vault: Arc<VaultStore<R>>,
}

impl<U: UserStore, R: RecordStore> BackupProtocol<U, R> {
    /// Create a protocol handler over the local stores.
    pub fn new(users: Arc<U>, records: Arc<R>, vault: Arc<VaultStore<R>>) -> Self {
        Self {
            users,
            records,
            vault,
        }
    }

    async fn user_salt(&self, session: &Session) -> Result<Salt> {
        let profile = self
            .users
            .load_profile(session.username())
            .await?
            .ok_or(Error::MissingSalt)?;
        Ok(profile.salt)
    }

    async fn build_payload(&self, session: &Session) -> Result<BackupPayload> {
        let snapshot = self.vault.load_all(session).await?;
        let data = snapshot
            .items
            .into_iter()
            .map(|item| Value::Object(item.fields))
            .collect();
        Ok(BackupPayload::new(
            session.username().as_str().to_string(),
            data,
        ))
    }

    /// Export the full vault as a version-2 container encrypted with
    /// the active session key.
    pub async fn export(&self, session: &Session) -> Result<String> {
        let payload = self.build_payload(session).await?;
        let envelope = encrypt(&payload.to_json()?, session.master_key())?;
        let container = BackupContainer::new(self.user_salt(session).await?, envelope);

        info!(user = %session.username(), items = payload.data.len(), "Exported backup container");
        container.to_json()
    }

    /// Export for short-range transfer, encrypted with a PIN-derived
    /// transfer key instead of the master key.
    ///
    /// The PIN is displayed on this device and typed on the importing
    /// one; both sides derive the same key from the PIN alone.
    pub async fn export_with_pin(&self, session: &Session, pin: &str) -> Result<String> {
        let transfer_key = derive_transfer_key(pin)?;
        let payload = self.build_payload(session).await?;
        let envelope = encrypt(&payload.to_json()?, &transfer_key)?;
        let container = BackupContainer::new(self.user_salt(session).await?, envelope);

        info!(user = %session.username(), items = payload.data.len(), "Exported transfer container");
        container.to_json()
    }

    /// Phase one of a file/QR import: parse and decrypt.
    ///
    /// Key priority: explicit credential first, then the session key.
    ///
    /// # Errors
    /// - `MalformedContainer` / `MalformedPayload` on structural failure
    /// - `InvalidCredential` when an explicit credential fails to decrypt
    /// - `MissingSalt` when a password is supplied but no salt exists
    /// - `NoActiveSession` when neither credential nor session is given
    pub fn prepare_import(
        &self,
        raw: &str,
        credential: Option<&Credential>,
        session: Option<&Session>,
    ) -> Result<ImportOutcome> {
        let container = BackupContainer::parse(raw)?;
        debug!(version = container.effective_version(), "Parsed backup container");

        let derived;
        let key = match (credential, session) {
            (Some(credential), _) => {
                derived = credential.derive(container.salt.as_ref())?;
                &derived
            }
            (None, Some(session)) => session.master_key(),
            (None, None) => return Err(Error::NoActiveSession),
        };

        let Some(plaintext) = decrypt(&container.envelope(), key) else {
            if credential.is_some() {
                return Err(Error::InvalidCredential);
            }
            let salt = container.salt.clone();
            return Ok(ImportOutcome::NeedsCredential(CredentialRequest {
                source: ImportSource::Container(container),
                salt,
            }));
        };

        let payload = BackupPayload::parse(&plaintext)?;
        Ok(ImportOutcome::Ready(PendingRestore {
            original_user: payload.username,
            items: payload.data,
            dropped: 0,
        }))
    }

    /// Phase one of a cloud-row import (see the sync reconciler).
    ///
    /// Rows are individually encrypted records; a row whose envelope
    /// does not decrypt under the chosen key is dropped and counted. If
    /// none decrypts the whole key is judged wrong, mirroring the
    /// container flow.
    pub fn prepare_row_import(
        &self,
        rows: Vec<Value>,
        remote_salt: Option<&Salt>,
        credential: Option<&Credential>,
        session: Option<&Session>,
    ) -> Result<ImportOutcome> {
        if rows.is_empty() {
            return Err(Error::MalformedPayload("Remote backup has no rows".to_string()));
        }

        let derived;
        let key = match (credential, session) {
            (Some(credential), _) => {
                derived = credential.derive(remote_salt)?;
                &derived
            }
            (None, Some(session)) => session.master_key(),
            (None, None) => return Err(Error::NoActiveSession),
        };

        let mut items = Vec::new();
        let mut dropped = 0usize;
        for row in &rows {
            let decrypted = row
                .get("data")
                .and_then(Value::as_str)
                .and_then(|envelope| decrypt_json(envelope, key))
                .and_then(|plaintext| serde_json::from_str::<Value>(&plaintext).ok());
            match decrypted {
                Some(item) => items.push(item),
                None => dropped += 1,
            }
        }

        if items.is_empty() {
            if credential.is_some() {
                return Err(Error::InvalidCredential);
            }
            return Ok(ImportOutcome::NeedsCredential(CredentialRequest {
                source: ImportSource::Rows(rows),
                salt: remote_salt.cloned(),
            }));
        }

        Ok(ImportOutcome::Ready(PendingRestore {
            original_user: String::new(),
            items,
            dropped,
        }))
    }

    /// Phase two: bulk-replace the active user's records.
    ///
    /// Every incoming item is re-encrypted under the *current* session
    /// key, never the import key, so the restored vault is readable
    /// under the present login. Items that are not JSON objects or fail
    /// to re-serialize are dropped; at least one must survive.
    pub async fn commit_restore(
        &self,
        session: &Session,
        pending: PendingRestore,
    ) -> Result<RestoreSummary> {
        let mut rows = Vec::new();
        let mut dropped = pending.dropped;

        for item in pending.items {
            let Value::Object(mut fields) = item else {
                dropped += 1;
                continue;
            };
            strip_store_fields(&mut fields);
            match Self::encrypt_item(session, &fields) {
                Some(data) => rows.push(data),
                None => dropped += 1,
            }
        }

        if rows.is_empty() {
            return Err(Error::MalformedPayload(
                "No items in the backup could be restored".to_string(),
            ));
        }

        let restored = self
            .records
            .replace_all(session.username(), &rows)
            .await?;

        info!(user = %session.username(), restored, dropped, "Restore committed");
        Ok(RestoreSummary { restored, dropped })
    }

    fn encrypt_item(session: &Session, fields: &ItemFields) -> Option<String> {
        let plaintext = serde_json::to_string(&Value::Object(fields.clone())).ok()?;
        encrypt(&plaintext, session.master_key())
            .ok()?
            .to_json()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vaultx_auth::AuthManager;
    use vaultx_common::Username;
    use vaultx_storage::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        auth: AuthManager<MemoryStore, MemoryStore>,
        vault: Arc<VaultStore<MemoryStore>>,
        protocol: BackupProtocol<MemoryStore, MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthManager::new(store.clone(), store.clone());
        let vault = Arc::new(VaultStore::new(store.clone()));
        let protocol = BackupProtocol::new(store.clone(), store.clone(), vault.clone());
        Fixture {
            store,
            auth,
            vault,
            protocol,
        }
    }

    fn bank_item() -> ItemFields {
        let mut fields = ItemFields::new();
        fields.insert("title".to_string(), json!("Bank"));
        fields.insert("category".to_string(), json!("banking"));
        fields
    }

    #[tokio::test]
    async fn test_own_backup_imports_with_zero_prompts() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();

        fx.vault.add(&session, bank_item()).await.unwrap();
        let exported = fx.protocol.export(&session).await.unwrap();

        let outcome = fx
            .protocol
            .prepare_import(&exported, None, Some(&session))
            .unwrap();
        let ImportOutcome::Ready(pending) = outcome else {
            panic!("expected Ready");
        };
        assert_eq!(pending.item_count(), 1);
        assert_eq!(pending.original_user, "alice");

        let summary = fx.protocol.commit_restore(&session, pending).await.unwrap();
        assert_eq!(summary, RestoreSummary { restored: 1, dropped: 0 });
    }

    #[tokio::test]
    async fn test_foreign_backup_needs_exactly_one_prompt() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();
        fx.vault.add(&session, bank_item()).await.unwrap();
        let exported = fx.protocol.export(&session).await.unwrap();
        session.logout();

        // Fresh install under a different password.
        let fx2 = fixture();
        let session2 = fx2.auth.register(&alice, "pw2").await.unwrap();

        let outcome = fx2
            .protocol
            .prepare_import(&exported, None, Some(&session2))
            .unwrap();
        let ImportOutcome::NeedsCredential(request) = outcome else {
            panic!("expected NeedsCredential");
        };
        assert!(request.salt.is_some());

        // Retry with the original password, as if the user was prompted.
        let credential = Credential::Password("pw1".to_string());
        let outcome = fx2
            .protocol
            .prepare_import(&exported, Some(&credential), Some(&session2))
            .unwrap();
        let ImportOutcome::Ready(pending) = outcome else {
            panic!("expected Ready");
        };
        assert_eq!(pending.item_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_explicit_password_is_definitive() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();
        fx.vault.add(&session, bank_item()).await.unwrap();
        let exported = fx.protocol.export(&session).await.unwrap();

        let before = fx.store.list(&alice).await.unwrap();

        let credential = Credential::Password("wrong".to_string());
        let err = fx
            .protocol
            .prepare_import(&exported, Some(&credential), Some(&session))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));

        // No local records were modified.
        let after = fx.store.list(&alice).await.unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn test_v1_container_without_salt_rejects_password() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();

        let envelope = encrypt("{}", session.master_key()).unwrap();
        let v1 = serde_json::json!({
            "ciphertext": envelope.ciphertext,
            "iv": envelope.iv,
        })
        .to_string();

        let credential = Credential::Password("pw1".to_string());
        let err = fx
            .protocol
            .prepare_import(&v1, Some(&credential), None)
            .unwrap_err();
        assert!(matches!(err, Error::MissingSalt));
    }

    #[tokio::test]
    async fn test_pin_transfer_roundtrip() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();
        fx.vault.add(&session, bank_item()).await.unwrap();

        let exported = fx.protocol.export_with_pin(&session, "4271").await.unwrap();

        // The importing side knows only the PIN.
        let fx2 = fixture();
        let session2 = fx2.auth.register(&alice, "other-pw").await.unwrap();

        let credential = Credential::Pin("4271".to_string());
        let outcome = fx2
            .protocol
            .prepare_import(&exported, Some(&credential), Some(&session2))
            .unwrap();
        let ImportOutcome::Ready(pending) = outcome else {
            panic!("expected Ready");
        };

        let summary = fx2
            .protocol
            .commit_restore(&session2, pending)
            .await
            .unwrap();
        assert_eq!(summary.restored, 1);

        let snapshot = fx2.vault.load_all(&session2).await.unwrap();
        assert_eq!(snapshot.items[0].title(), Some("Bank"));

        let wrong = Credential::Pin("0000".to_string());
        let err = fx2
            .protocol
            .prepare_import(&exported, Some(&wrong), Some(&session2))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));
    }

    #[tokio::test]
    async fn test_malformed_item_is_dropped_not_fatal() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();

        let payload = BackupPayload::new(
            "alice".to_string(),
            vec![
                json!({"title": "One"}),
                json!({"title": "Two"}),
                json!("not an object"),
            ],
        );
        let pending = PendingRestore {
            original_user: payload.username.clone(),
            items: payload.data,
            dropped: 0,
        };

        let summary = fx.protocol.commit_restore(&session, pending).await.unwrap();
        assert_eq!(summary, RestoreSummary { restored: 2, dropped: 1 });

        let snapshot = fx.vault.load_all(&session).await.unwrap();
        assert_eq!(snapshot.items.len(), 2);
    }

    #[tokio::test]
    async fn test_restore_with_nothing_usable_is_fatal_and_uncommitted() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();
        fx.vault.add(&session, bank_item()).await.unwrap();

        let pending = PendingRestore {
            original_user: "alice".to_string(),
            items: vec![json!(42)],
            dropped: 0,
        };
        let err = fx
            .protocol
            .commit_restore(&session, pending)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));

        // The existing vault is untouched.
        let snapshot = fx.vault.load_all(&session).await.unwrap();
        assert_eq!(snapshot.items.len(), 1);
    }

    #[tokio::test]
    async fn test_row_import_two_phase() {
        let fx = fixture();
        let alice = Username::new("alice").unwrap();
        let session = fx.auth.register(&alice, "pw1").await.unwrap();
        fx.vault.add(&session, bank_item()).await.unwrap();

        // Simulate pulled cloud rows: the raw stored records.
        let rows: Vec<Value> = fx
            .store
            .list(&alice)
            .await
            .unwrap()
            .into_iter()
            .map(|r| serde_json::to_value(r).unwrap())
            .collect();
        let salt = fx.store.load_profile(&alice).await.unwrap().unwrap().salt;
        session.logout();

        // Fresh profile under a different password.
        let fx2 = fixture();
        let session2 = fx2.auth.register(&alice, "pw2").await.unwrap();

        let outcome = fx2
            .protocol
            .prepare_row_import(rows.clone(), Some(&salt), None, Some(&session2))
            .unwrap();
        assert!(matches!(outcome, ImportOutcome::NeedsCredential(_)));

        let credential = Credential::Password("pw1".to_string());
        let outcome = fx2
            .protocol
            .prepare_row_import(rows, Some(&salt), Some(&credential), Some(&session2))
            .unwrap();
        let ImportOutcome::Ready(pending) = outcome else {
            panic!("expected Ready");
        };

        let summary = fx2
            .protocol
            .commit_restore(&session2, pending)
            .await
            .unwrap();
        assert_eq!(summary.restored, 1);
    }
}
