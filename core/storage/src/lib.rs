//! Storage collaborators for VaultX.
//!
//! Defines the traits the core components depend on (the local record
//! store, the user index, and the remote document store) plus the
//! SQLite, HTTP, and in-memory implementations.

pub mod memory;
pub mod records;
pub mod remote;
pub mod sqlite;
pub mod users;

pub use memory::{MemoryRemote, MemoryStore};
pub use records::{RecordStore, StoredRecord, TITLE_PLACEHOLDER};
pub use remote::{HttpRemote, RemoteStore};
pub use sqlite::SqliteStore;
pub use users::{UserProfile, UserStore};
