//! Coalescing auto-push worker.
//!
//! Every successful vault mutation triggers a cloud push, but a push
//! reads the full current record set at run time, so overlapping
//! triggers carry no extra information. A capacity-one channel gives
//! the coalescing for free: one push running, at most one queued, and
//! any further trigger is dropped because the queued push will read the
//! newer state anyway.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use vaultx_auth::Session;
use vaultx_common::Username;
use vaultx_storage::{RecordStore, RemoteStore, UserStore};
use vaultx_vault::WriteHook;

use crate::reconciler::CloudSyncReconciler;

/// Trigger handle for the background push worker.
///
/// Cheap to clone; implements [`WriteHook`] so it can be attached
/// directly to a `VaultStore`. Triggering never blocks and never fails
/// the originating call.
#[derive(Clone)]
pub struct PushHandle {
    tx: mpsc::Sender<Username>,
}

impl PushHandle {
    /// Request a push for the given user.
    pub fn trigger(&self, username: &Username) {
        match self.tx.try_send(username.clone()) {
            Ok(()) => debug!(user = %username, "Queued cloud push"),
            Err(TrySendError::Full(_)) => {
                // A push is already queued; it will read the new state.
                debug!(user = %username, "Coalesced cloud push trigger");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(user = %username, "Push worker is gone; dropping trigger");
            }
        }
    }
}

impl WriteHook for PushHandle {
    fn after_write(&self, session: &Session) {
        self.trigger(session.username());
    }
}

/// Spawns the background worker that services push triggers.
pub struct PushQueue;

impl PushQueue {
    /// Start the worker on the current tokio runtime.
    ///
    /// Failures are logged, never surfaced: a missed push is recovered
    /// by the next mutation, and timeouts are retryable by nature.
    pub fn spawn<S, U, R>(
        reconciler: Arc<CloudSyncReconciler<S, U, R>>,
        remote_key: String,
    ) -> PushHandle
    where
        S: RemoteStore + 'static,
        U: UserStore + 'static,
        R: RecordStore + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Username>(1);

        tokio::spawn(async move {
            while let Some(username) = rx.recv().await {
                if let Err(error) = reconciler.push(&remote_key, &username).await {
                    warn!(
                        user = %username,
                        %error,
                        retryable = error.is_retryable(),
                        "Cloud push failed"
                    );
                }
            }
            debug!("Push worker stopped");
        });

        PushHandle { tx }
    }
}
