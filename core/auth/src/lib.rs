//! Authentication for VaultX.
//!
//! Registers and validates users via a stored salt plus encrypted
//! verifier token. The derived master key is held only inside the
//! [`Session`] object for the duration of a login.

pub mod manager;
pub mod session;

pub use manager::AuthManager;
pub use session::{Session, SessionHandle};
