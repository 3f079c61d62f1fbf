//! Registration and login over the verifier scheme.
//!
//! The password is never persisted, directly or hashed. Registration
//! stores a per-user salt plus a verifier: a fixed marker string
//! encrypted under the derived key. Login re-derives the key and proves
//! the password by decrypting the verifier back to the marker.

use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use vaultx_common::{Error, Result, Username};
use vaultx_crypto::{decrypt_json, derive_key, encrypt, Salt};
use vaultx_storage::{RecordStore, UserProfile, UserStore};

use crate::session::Session;

/// Fixed marker encrypted into every verifier.
const VERIFIER_MARKER: &str = "VAULTX_KEY_VERIFICATION_V1";

/// Authentication manager over the user index and record store.
///
/// The record store is only touched by the destructive reset path, which
/// must purge every user's rows before re-registering.
pub struct AuthManager<U: UserStore, R: RecordStore> {
    users: Arc<U>,
    records: Arc<R>,
}

impl<U: UserStore, R: RecordStore> AuthManager<U, R> {
    /// Create a manager over the given stores.
    pub fn new(users: Arc<U>, records: Arc<R>) -> Self {
        Self { users, records }
    }

    /// Whether no account has been registered yet (first run).
    pub async fn is_first_run(&self) -> Result<bool> {
        Ok(self.users.list_users().await?.is_empty())
    }

    /// Register a new account and return an active session.
    ///
    /// # Postconditions
    /// - Salt and verifier are persisted, keyed by username
    /// - The username is appended to the user index
    /// - The derived key exists only inside the returned session
    ///
    /// # Errors
    /// - `AlreadyExists` if the username is claimed; use
    ///   [`register_forced`](Self::register_forced) to reset first
    pub async fn register(&self, username: &Username, password: &str) -> Result<Session> {
        if self.users.load_profile(username).await?.is_some() {
            return Err(Error::AlreadyExists(format!(
                "User '{}' is already registered",
                username
            )));
        }
        self.create_account(username, password).await
    }

    /// Destructively reset all local state: every user's records and
    /// profiles, including the user index.
    ///
    /// Requires no authentication, because the usual reason to reach
    /// for it is a forgotten master password. The caller is expected to
    /// have obtained explicit human confirmation.
    pub async fn reset(&self) -> Result<()> {
        warn!("Resetting vault: purging all records and profiles");
        self.records.purge_all().await?;
        self.users.purge_all().await?;
        Ok(())
    }

    /// Destructively reset all local state, then register.
    pub async fn register_forced(&self, username: &Username, password: &str) -> Result<Session> {
        warn!(user = %username, "Forced registration requested");
        self.reset().await?;
        self.create_account(username, password).await
    }

    async fn create_account(&self, username: &Username, password: &str) -> Result<Session> {
        let salt = Salt::generate();
        let master_key = derive_key(password, &salt)?;
        let verifier = encrypt(VERIFIER_MARKER, &master_key)?.to_json()?;

        self.users
            .save_profile(username, &UserProfile { salt, verifier })
            .await?;

        info!(user = %username, "Registered new account");
        Ok(Session::new(username.clone(), master_key))
    }

    /// Log in to an existing account.
    ///
    /// Failure carries no further detail: an unknown username, a wrong
    /// password, and a corrupted verifier all surface as
    /// `InvalidCredential`, and nothing persisted is mutated.
    pub async fn login(&self, username: &Username, password: &str) -> Result<Session> {
        let Some(profile) = self.users.load_profile(username).await? else {
            return Err(Error::InvalidCredential);
        };

        let master_key = derive_key(password, &profile.salt)?;

        let Some(plaintext) = decrypt_json(&profile.verifier, &master_key) else {
            return Err(Error::InvalidCredential);
        };

        if plaintext
            .as_bytes()
            .ct_eq(VERIFIER_MARKER.as_bytes())
            .into()
        {
            info!(user = %username, "Login succeeded");
            Ok(Session::new(username.clone(), master_key))
        } else {
            Err(Error::InvalidCredential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultx_storage::MemoryStore;

    fn manager(store: &Arc<MemoryStore>) -> AuthManager<MemoryStore, MemoryStore> {
        AuthManager::new(store.clone(), store.clone())
    }

    fn user(name: &str) -> Username {
        Username::new(name).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = Arc::new(MemoryStore::new());
        let auth = manager(&store);
        let alice = user("alice");

        assert!(auth.is_first_run().await.unwrap());
        let session = auth.register(&alice, "pw1").await.unwrap();
        assert_eq!(session.username(), &alice);
        assert!(!auth.is_first_run().await.unwrap());

        let session = auth.login(&alice, "pw1").await.unwrap();
        assert_eq!(session.username(), &alice);
        session.logout();
    }

    #[tokio::test]
    async fn test_duplicate_register_leaves_profile_untouched() {
        let store = Arc::new(MemoryStore::new());
        let auth = manager(&store);
        let alice = user("alice");

        auth.register(&alice, "pw1").await.unwrap();
        let original = store.load_profile(&alice).await.unwrap().unwrap();

        let err = auth.register(&alice, "pw2").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let after = store.load_profile(&alice).await.unwrap().unwrap();
        assert_eq!(after.salt, original.salt);
        assert_eq!(after.verifier, original.verifier);

        // The original password still works.
        assert!(auth.login(&alice, "pw1").await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_password_fails_without_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let auth = manager(&store);
        let alice = user("alice");

        auth.register(&alice, "pw1").await.unwrap();
        let before = store.load_profile(&alice).await.unwrap().unwrap();

        let err = auth.login(&alice, "wrong").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));

        let after = store.load_profile(&alice).await.unwrap().unwrap();
        assert_eq!(after.salt, before.salt);
        assert_eq!(after.verifier, before.verifier);
    }

    #[tokio::test]
    async fn test_unknown_user_fails_like_wrong_password() {
        let store = Arc::new(MemoryStore::new());
        let auth = manager(&store);

        let err = auth.login(&user("nobody"), "pw").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));
    }

    #[tokio::test]
    async fn test_reset_clears_all_state_without_authentication() {
        let store = Arc::new(MemoryStore::new());
        let auth = manager(&store);
        let alice = user("alice");

        let session = auth.register(&alice, "pw1").await.unwrap();
        RecordStore::insert(store.as_ref(), &alice, "blob")
            .await
            .unwrap();
        session.logout();

        // No login needed: reset is the forgotten-password escape hatch.
        auth.reset().await.unwrap();

        assert!(auth.is_first_run().await.unwrap());
        assert!(store.list(&alice).await.unwrap().is_empty());
        assert!(store.load_profile(&alice).await.unwrap().is_none());

        // The name is claimable again afterwards.
        assert!(auth.register(&alice, "pw2").await.is_ok());
    }

    #[tokio::test]
    async fn test_forced_register_purges_everything() {
        let store = Arc::new(MemoryStore::new());
        let auth = manager(&store);
        let alice = user("alice");
        let bob = user("bob");

        let session = auth.register(&alice, "pw1").await.unwrap();
        RecordStore::insert(store.as_ref(), &alice, "blob")
            .await
            .unwrap();
        session.logout();

        auth.register_forced(&bob, "pw2").await.unwrap();

        assert!(store.list(&alice).await.unwrap().is_empty());
        assert!(store.load_profile(&alice).await.unwrap().is_none());
        assert_eq!(store.list_users().await.unwrap(), vec![bob]);
    }
}
