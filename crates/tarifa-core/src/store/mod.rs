//! Shared key/value store surface.
//!
//! All cross-process coordination state lives in one shared store: cache
//! entries, lease records, waiter registries and rendezvous slots. The core
//! only relies on the small command surface captured by [`KvStore`]; the
//! concrete wire protocol behind it is a deployment concern. Every mutation
//! the coordination layer depends on is an operation whose atomicity the
//! store itself guarantees (set-if-absent, compare-and-expire,
//! compare-and-delete, blocking pop).
//!
//! [`MemoryStore`] is the process-embedded implementation used by tests and
//! single-node deployments.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The operation targeted a key holding the other kind of value
    /// (a list operation on a scalar, or vice versa).
    #[error("wrong value kind at key {0}")]
    WrongKind(String),

    /// Transport or backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Abstract command surface of the shared store.
///
/// Values are UTF-8 payloads: serialized JSON documents, lease owner tokens
/// and rendezvous names. Keys carrying a TTL disappear once it elapses;
/// reads of expired keys behave as reads of absent keys.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Returns the scalar value at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally writes a scalar value with an expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically writes `value` with an expiry only if `key` is absent.
    /// Returns whether this caller performed the write.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Deletes `key` only if its current scalar value equals `expected`.
    /// Returns whether the delete occurred.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Refreshes the expiry of `key` only if its current scalar value equals
    /// `expected`. Returns whether the refresh occurred.
    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Unconditionally sets the expiry of `key` if it exists.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Unconditionally deletes `key`.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Appends to the right end of the list at `key`, creating it if absent.
    async fn push_back(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Appends to the left end of the list at `key`, creating it if absent.
    async fn push_front(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes and returns the rightmost list element, without blocking.
    async fn pop_back(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Removes and returns the leftmost list element, without blocking.
    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Removes and returns the leftmost list element, blocking until one is
    /// available or `timeout` elapses. Returns `None` on timeout.
    async fn blocking_pop_front(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// Returns whether `key` currently holds a live value.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}
