//! Authenticated session object.
//!
//! A session owns the master key for exactly as long as the user is
//! logged in. Components that need the key take `&Session`; nothing
//! reads key material from ambient state, and the key bytes are
//! zeroized the moment the session is dropped.

use std::fmt;
use uuid::Uuid;

use vaultx_common::Username;
use vaultx_crypto::MasterKey;

/// Opaque handle identifying one login session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Generate a new unique session handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the handle string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Active authenticated session.
///
/// Created only by [`AuthManager`](crate::AuthManager) on successful
/// registration or login. The master key lives nowhere else.
pub struct Session {
    handle: SessionHandle,
    username: Username,
    master_key: MasterKey,
}

impl Session {
    pub(crate) fn new(username: Username, master_key: MasterKey) -> Self {
        Self {
            handle: SessionHandle::new(),
            username,
            master_key,
        }
    }

    /// Get the session handle.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// The authenticated account.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// The in-memory master key.
    ///
    /// # Security
    /// Use immediately; never store or log the returned reference's bytes.
    pub fn master_key(&self) -> &MasterKey {
        &self.master_key
    }

    /// End the session, zeroizing the key material.
    ///
    /// Dropping the session has the same effect; this method just makes
    /// the intent explicit at call sites.
    pub fn logout(self) {
        // MasterKey is ZeroizeOnDrop.
        drop(self);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("username", &self.username)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}
