//! Distributed lease backed by the shared store.
//!
//! A lease is a named record `{owner, expires_at}` that exists only while
//! some holder owns the critical section for a key. Acquisition is an
//! atomic set-if-absent with expiry; extension and release are
//! compare-and-expire / compare-and-delete against the owner token, so a
//! late holder can never free or refresh a successor's lease. If a holder
//! crashes, store expiry reclaims the lease within at most the acquire TTL.

use crate::store::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Errors surfaced by scoped lease acquisition.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The lease is currently held by another owner. Acquisition is a
    /// single attempt; retrying is the caller's decision.
    #[error("lease is held by another owner")]
    Unavailable,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lease timing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Acquire TTL in seconds. A crashed holder is reclaimable within this
    /// window. Defaults to `60`.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Interval between background extensions in milliseconds. Must be
    /// shorter than the TTL. Defaults to `2000`.
    #[serde(default = "default_extend_interval_ms")]
    pub extend_interval_ms: u64,
}

fn default_ttl_seconds() -> u64 {
    60
}

fn default_extend_interval_ms() -> u64 {
    2000
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            extend_interval_ms: default_extend_interval_ms(),
        }
    }
}

impl LeaseConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub fn extend_interval(&self) -> Duration {
        Duration::from_millis(self.extend_interval_ms)
    }
}

/// Named mutual-exclusion primitive with background auto-extension.
#[derive(Clone)]
pub struct DistributedLease {
    store: Arc<dyn KvStore>,
    config: LeaseConfig,
}

impl DistributedLease {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    /// Attempts to become the holder of `name`. Returns whether this caller
    /// won.
    pub async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.store.set_if_absent(name, owner, ttl).await
    }

    /// Refreshes the expiry of `name` if `owner` still holds it.
    pub async fn extend(&self, name: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.store.compare_and_expire(name, owner, ttl).await
    }

    /// Releases `name` if `owner` still holds it. Never a blind delete.
    pub async fn release(&self, name: &str, owner: &str) -> Result<bool, StoreError> {
        self.store.compare_and_delete(name, owner).await
    }

    /// Scoped acquisition: one acquire attempt, a background extender for
    /// the duration of `body`, and an ownership-verified release on exit.
    ///
    /// The extender is signalled to stop and joined before the release, so
    /// it cannot outlive the critical section. If `body`'s future is
    /// dropped early the stop channel closes and the extender shuts itself
    /// down; the lease then lapses by store expiry.
    ///
    /// # Errors
    ///
    /// [`LeaseError::Unavailable`] if another owner holds the lease; this
    /// layer does not retry.
    pub async fn with_lease<T, F, Fut>(&self, name: &str, body: F) -> Result<T, LeaseError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ttl = self.config.ttl();
        let owner = Uuid::new_v4().simple().to_string();

        if !self.try_acquire(name, &owner, ttl).await? {
            return Err(LeaseError::Unavailable);
        }
        tracing::debug!(lease = name, owner = %owner, "lease acquired");

        let (stop_tx, stop_rx) = watch::channel(false);
        let extender = tokio::spawn(extend_periodically(
            Arc::clone(&self.store),
            name.to_string(),
            owner.clone(),
            ttl,
            self.config.extend_interval(),
            stop_rx,
        ));

        let output = body().await;

        let _ = stop_tx.send(true);
        if let Err(err) = extender.await {
            tracing::warn!(lease = name, error = %err, "lease extender did not shut down cleanly");
        }

        match self.release(name, &owner).await {
            Ok(true) => tracing::debug!(lease = name, "lease released"),
            // The lease expired or was reclaimed while we held it. The
            // store's ownership check already protected the successor.
            Ok(false) => tracing::info!(lease = name, "lease was no longer ours at release"),
            Err(err) => {
                tracing::warn!(lease = name, error = %err, "lease release failed; store expiry will reclaim it");
            }
        }

        Ok(output)
    }
}

/// Background refresher for a held lease. A store error is logged and
/// retried next interval; losing ownership stops the task.
async fn extend_periodically(
    store: Arc<dyn KvStore>,
    name: String,
    owner: String,
    ttl: Duration,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // interval() fires immediately; the lease was just written.
    ticker.tick().await;

    loop {
        tokio::select! {
            // Either an explicit stop or the holder dropping the channel.
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                match store.compare_and_expire(&name, &owner, ttl).await {
                    Ok(true) => tracing::trace!(lease = %name, "lease extended"),
                    Ok(false) => {
                        tracing::warn!(lease = %name, "lease no longer owned; stopping extender");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(lease = %name, error = %err, "lease extension failed; retrying next interval");
                    }
                }
            }
        }
    }
}
