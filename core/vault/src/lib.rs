//! Encrypted vault store for VaultX.
//!
//! Decrypts on read, encrypts on write; operates only through an active
//! authenticated session.

pub mod item;
pub mod store;

pub use item::{ItemFields, VaultItem};
pub use store::{VaultSnapshot, VaultStore, WriteHook};
