//! Process-embedded store implementation.
//!
//! Backs the [`KvStore`](super::KvStore) surface with an in-process map:
//! lazy TTL expiry on access, and a per-key [`Notify`] so blocking pops
//! park on a notification instead of polling. Multiple service instances in
//! one process can share a single `MemoryStore` behind an `Arc`, which is
//! how the integration suite exercises cross-instance coordination.

use super::{KvStore, StoreError};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Notify, time::Instant};

enum Slot {
    Scalar(String),
    List(VecDeque<String>),
}

struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-memory [`KvStore`] with real TTL semantics.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    signals: Mutex<HashMap<String, Arc<Notify>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the entry map and drops the entry for `key` if its TTL elapsed,
    /// so every operation below observes only live state.
    fn lock_live(&self, key: &str) -> MutexGuard<'_, HashMap<String, Entry>> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        entries
    }

    fn push(&self, key: &str, value: &str, front: bool) -> Result<(), StoreError> {
        {
            let mut entries = self.lock_live(key);
            match entries.get_mut(key) {
                Some(Entry { slot: Slot::List(items), .. }) => {
                    if front {
                        items.push_front(value.to_string());
                    } else {
                        items.push_back(value.to_string());
                    }
                }
                Some(_) => return Err(StoreError::WrongKind(key.to_string())),
                None => {
                    entries.insert(
                        key.to_string(),
                        Entry {
                            slot: Slot::List(VecDeque::from([value.to_string()])),
                            expires_at: None,
                        },
                    );
                }
            }
        }

        if let Some(notify) = self.signals.lock().get(key) {
            notify.notify_waiters();
        }
        Ok(())
    }

    fn pop(&self, key: &str, front: bool) -> Result<Option<String>, StoreError> {
        match self.lock_live(key).get_mut(key) {
            Some(Entry { slot: Slot::List(items), .. }) => {
                Ok(if front { items.pop_front() } else { items.pop_back() })
            }
            Some(_) => Err(StoreError::WrongKind(key.to_string())),
            None => Ok(None),
        }
    }

    fn signal(&self, key: &str) -> Arc<Notify> {
        Arc::clone(
            self.signals
                .lock()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Drops the signal for `key` once no other waiter holds it, so
    /// one-shot keys (rendezvous slots) do not accumulate.
    fn release_signal(&self, key: &str, notify: &Arc<Notify>) {
        let mut signals = self.signals.lock();
        if let Some(existing) = signals.get(key) {
            if Arc::ptr_eq(existing, notify) && Arc::strong_count(existing) == 2 {
                signals.remove(key);
            }
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.lock_live(key).get(key) {
            Some(Entry { slot: Slot::Scalar(value), .. }) => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::WrongKind(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.lock().insert(
            key.to_string(),
            Entry { slot: Slot::Scalar(value.to_string()), expires_at: Some(Instant::now() + ttl) },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.lock_live(key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry { slot: Slot::Scalar(value.to_string()), expires_at: Some(Instant::now() + ttl) },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut entries = self.lock_live(key);
        match entries.get(key) {
            Some(Entry { slot: Slot::Scalar(value), .. }) if value == expected => {
                entries.remove(key);
                Ok(true)
            }
            Some(Entry { slot: Slot::Scalar(_), .. }) | None => Ok(false),
            Some(_) => Err(StoreError::WrongKind(key.to_string())),
        }
    }

    async fn compare_and_expire(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        match self.lock_live(key).get_mut(key) {
            Some(entry) => match &entry.slot {
                Slot::Scalar(value) if value == expected => {
                    entry.expires_at = Some(Instant::now() + ttl);
                    Ok(true)
                }
                Slot::Scalar(_) => Ok(false),
                Slot::List(_) => Err(StoreError::WrongKind(key.to_string())),
            },
            None => Ok(false),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self.lock_live(key).get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn push_back(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.push(key, value, false)
    }

    async fn push_front(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.push(key, value, true)
    }

    async fn pop_back(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.pop(key, false)
    }

    async fn pop_front(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.pop(key, true)
    }

    async fn blocking_pop_front(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.pop(key, true)? {
                return Ok(Some(value));
            }

            let notify = self.signal(key);
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // A push may have landed between the failed pop and wait
            // registration; re-check before parking.
            match self.pop(key, true) {
                Ok(Some(value)) => {
                    drop(notified);
                    self.release_signal(key, &notify);
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(err) => {
                    drop(notified);
                    self.release_signal(key, &notify);
                    return Err(err);
                }
            }

            let timed_out = tokio::select! {
                () = &mut notified => false,
                () = tokio::time::sleep_until(deadline) => true,
            };
            drop(notified);
            self.release_signal(key, &notify);
            if timed_out {
                return Ok(None);
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock_live(key).contains_key(key))
    }
}
