//! Cloud backup synchronization for VaultX.
//!
//! Pushes the per-user encrypted record set to a remote document store
//! and pulls it back for the two-phase restore flow. Pushes triggered
//! by vault mutations run on a coalescing background worker.

pub mod push;
pub mod reconciler;

pub use push::{PushHandle, PushQueue};
pub use reconciler::{CloudBackup, CloudSyncReconciler, RemoteBackup, REMOTE_VERSION};
