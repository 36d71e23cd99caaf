//! Single-slot mailboxes for blocked followers.
//!
//! A follower that lost the leader election creates a rendezvous: a
//! uniquely named slot in the shared store, registered in the waiters list
//! for the fingerprint so the leader knows where to deliver. The follower
//! then parks on a blocking pop. The leader pushes exactly one payload per
//! registered slot; duplicates are forbidden.
//!
//! The slot is deleted on both exit paths of [`Rendezvous::wait`]. A handle
//! dropped without being consumed (request cancelled mid-wait) cannot
//! delete asynchronously from `Drop`, so it enqueues its name on an
//! unbounded cleanup channel drained by a background worker.

use crate::{
    fingerprint::Fingerprint,
    store::{KvStore, StoreError},
};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors surfaced while waiting on a rendezvous.
#[derive(Debug, Error)]
pub enum WaitError {
    /// No payload arrived within the wait budget.
    #[error("no payload arrived within the wait budget")]
    Timeout,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Tag shared by every rendezvous name this process allocates.
fn process_tag() -> &'static str {
    static TAG: OnceLock<String> = OnceLock::new();
    TAG.get_or_init(|| Uuid::new_v4().simple().to_string())
}

/// Spawns the worker that deletes abandoned rendezvous slots.
///
/// Channel send is allocation-free and non-blocking, which is what `Drop`
/// needs; the worker performs the actual store round-trips.
pub(crate) fn spawn_cleanup_worker(store: Arc<dyn KvStore>) -> mpsc::UnboundedSender<String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(name) = rx.recv().await {
            if let Err(err) = store.delete(&name).await {
                tracing::warn!(rendezvous = %name, error = %err, "rendezvous cleanup failed");
            }
        }
    });
    tx
}

/// A follower's single-shot mailbox. Owns its slot name for its lifetime.
pub struct Rendezvous {
    store: Arc<dyn KvStore>,
    cleanup_tx: mpsc::UnboundedSender<String>,
    name: String,
    timeout: Duration,
    consumed: bool,
}

impl Rendezvous {
    /// Allocates a slot name and registers it in the waiters list for
    /// `key`, in arrival order.
    pub(crate) async fn create(
        store: Arc<dyn KvStore>,
        cleanup_tx: mpsc::UnboundedSender<String>,
        key: &Fingerprint,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let name = format!("rendezvous:{}:{}", process_tag(), Uuid::new_v4().simple());
        store.push_back(&key.waiters_key(), &name).await?;
        Ok(Self { store, cleanup_tx, name, timeout, consumed: false })
    }

    /// The slot name registered with the leader.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the leader delivers a payload or the timeout elapses.
    /// The slot is deleted on both exit paths.
    pub async fn wait(mut self) -> Result<String, WaitError> {
        let popped = self.store.blocking_pop_front(&self.name, self.timeout).await;
        self.consumed = true;

        if let Err(err) = self.store.delete(&self.name).await {
            tracing::warn!(rendezvous = %self.name, error = %err, "failed to delete rendezvous slot");
        }

        match popped {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => Err(WaitError::Timeout),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for Rendezvous {
    fn drop(&mut self) {
        if !self.consumed {
            let name = std::mem::take(&mut self.name);
            // Worker gone means shutdown; the slot then lapses by the
            // expiry the leader stamps during publish.
            let _ = self.cleanup_tx.send(name);
        }
    }
}
