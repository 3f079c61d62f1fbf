//! User index and per-user security parameter storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vaultx_common::{Result, Username};
use vaultx_crypto::Salt;

/// Persisted security parameters for one account.
///
/// Both values are useless without the password: the salt is public
/// material and the verifier is a marker string encrypted under the
/// derived key. The password itself is never persisted in any form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Per-user KDF salt, immutable after registration.
    pub salt: Salt,
    /// Flat-JSON envelope of the fixed verifier marker.
    pub verifier: String,
}

/// Store handle for the user index and per-user parameters.
///
/// Parameterized by owner on every call; implementations may use
/// prefixed keys internally but never expose them.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Ordered list of registered usernames. Empty means first run.
    async fn list_users(&self) -> Result<Vec<Username>>;

    /// Load the salt and verifier for an account, if registered.
    async fn load_profile(&self, username: &Username) -> Result<Option<UserProfile>>;

    /// Persist the salt and verifier for a new account and append the
    /// username to the user index.
    async fn save_profile(&self, username: &Username, profile: &UserProfile) -> Result<()>;

    /// Remove every profile and the user index. Destructive reset support.
    async fn purge_all(&self) -> Result<()>;
}
