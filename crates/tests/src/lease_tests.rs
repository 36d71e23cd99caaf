//! Lease safety under contention and leader-crash recovery.

use crate::mock_infrastructure::{
    cache_instance, quiet_breaker, summer_attrs, summer_rates, ScriptedOracle,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tarifa_core::{
    fingerprint, DistributedLease, FetchError, KvStore, LeaseConfig, LeaseError, MemoryStore,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_at_most_one_holder_at_a_time() {
    let store = Arc::new(MemoryStore::new());
    let lease = DistributedLease::new(
        Arc::clone(&store) as Arc<dyn KvStore>,
        LeaseConfig::default(),
    );
    let concurrent = Arc::new(AtomicUsize::new(0));
    let executed = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let lease = lease.clone();
        let concurrent = Arc::clone(&concurrent);
        let executed = Arc::clone(&executed);
        let rejected = Arc::clone(&rejected);
        tasks.push(tokio::spawn(async move {
            let result = lease
                .with_lease("lock:pricing:contended", || async {
                    let inside = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    assert_eq!(inside, 1, "two holders inside the critical section");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            match result {
                Ok(()) => executed.fetch_add(1, Ordering::SeqCst),
                Err(LeaseError::Unavailable) => rejected.fetch_add(1, Ordering::SeqCst),
                Err(other) => panic!("unexpected lease error: {other}"),
            };
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(executed.load(Ordering::SeqCst) >= 1);
    assert_eq!(
        executed.load(Ordering::SeqCst) + rejected.load(Ordering::SeqCst),
        8,
        "every contender either ran or was turned away"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leader_crash_recovery_elects_a_new_leader() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_instance(&store, quiet_breaker());
    let key = fingerprint(&summer_attrs()).unwrap();

    // A leader acquired the lease and was then killed mid-fetch: the lock
    // record exists but nobody will ever publish or release it.
    store
        .set_if_absent(&key.lock_key(), "crashed-leader", Duration::from_millis(900))
        .await
        .unwrap();

    // Followers observe the timeout, never a hang.
    let oracle = ScriptedOracle::succeeding(summer_rates());
    let err = {
        let oracle = Arc::clone(&oracle);
        cache.fetch(&key, move || oracle.call()).await.unwrap_err()
    };
    assert!(matches!(err, FetchError::WaitTimeout));
    assert_eq!(oracle.calls(), 0);

    // Once store expiry reclaims the lease, the next fetch leads and
    // succeeds.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!store.exists(&key.lock_key()).await.unwrap(), "expiry must reclaim the lease");

    let rates = {
        let oracle = Arc::clone(&oracle);
        cache.fetch(&key, move || oracle.call()).await.unwrap()
    };
    assert_eq!(rates, summer_rates());
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_release_cannot_free_a_successors_lease() {
    let store = Arc::new(MemoryStore::new());
    let lease = DistributedLease::new(
        Arc::clone(&store) as Arc<dyn KvStore>,
        LeaseConfig::default(),
    );

    // First holder acquires with a short TTL and "stalls".
    assert!(lease.try_acquire("lock:k", "first", Duration::from_millis(50)).await.unwrap());
    tokio::time::sleep(Duration::from_millis(80)).await;

    // A successor takes over after expiry.
    assert!(lease.try_acquire("lock:k", "second", Duration::from_secs(10)).await.unwrap());

    // The stalled first holder coming back cannot free the new lease.
    assert!(!lease.release("lock:k", "first").await.unwrap());
    assert!(store.exists("lock:k").await.unwrap());
    assert!(lease.release("lock:k", "second").await.unwrap());
}
