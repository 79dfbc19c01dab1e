//! Forward-looking lock coordinator.
//!
//! Acquiring the lock writes `now + ttl` into the lease object's metadata
//! with a conditional write. Nothing ever releases the lock; it is held by
//! everyone until the stored instant passes. Concurrent acquirers are
//! reconciled purely by the store's preconditions: at most one conditional
//! write succeeds per round, the losers re-read and find the lease held.

use crate::lease::{
    decode_not_before, encode_not_before, LeaseKey, LockHeldError, NotBeforeError,
    DEFAULT_CACHE_CONTROL, NOT_BEFORE_KEY,
};
use crate::retry::RetryConfig;
use crate::store::{self, LeaseStore, Precondition, WriteRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors returned by lock operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The lease is held until the carried instant. Never retried.
    #[error(transparent)]
    LockHeld(#[from] LockHeldError),
    /// The lease object could not be read.
    #[error("Failed to read lease object {key}: {source}")]
    Read {
        key: LeaseKey,
        #[source]
        source: store::Error,
    },
    /// The conditional write of the lease object failed.
    #[error("Failed to update lease object {key}: {source}")]
    Write {
        key: LeaseKey,
        #[source]
        source: store::Error,
    },
    /// The stored not-before metadata is corrupt. Never retried.
    #[error("Failed to parse not-before metadata of lease object {key}: {source}")]
    ParseNotBefore {
        key: LeaseKey,
        #[source]
        source: NotBeforeError,
    },
    /// The ttl is under one second or its expiry is not representable.
    #[error("Lease ttl must be at least one second and expire within the UTC range, got {0:?}")]
    InvalidTtl(Duration),
    /// The cancellation token fired before the acquisition finished.
    #[error("Lock acquisition for {key} was cancelled")]
    Cancelled { key: LeaseKey },
    /// Every round lost its conditional write to a concurrent writer.
    #[error("Failed to acquire lock {key} after all retry attempts: {source}")]
    RetryExhausted {
        key: LeaseKey,
        #[source]
        source: Box<Error>,
    },
    /// The store connection could not be closed.
    #[error("Failed to close lease store: {source}")]
    Close {
        #[source]
        source: store::Error,
    },
    /// Required builder attribute was not provided.
    #[error("Missing required builder attribute: {}", _0)]
    MissingBuilderAttribute(String),
}

impl Error {
    /// Returns the held-lease details when the lock is currently held.
    pub fn lock_held(&self) -> Option<&LockHeldError> {
        match self {
            Error::LockHeld(err) => Some(err),
            _ => None,
        }
    }

    /// Returns true when a new acquisition round may succeed.
    ///
    /// Only a write that lost a race against a concurrent writer qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Write { source, .. } if source.is_conflict())
    }
}

/// Interface for forward-looking locks.
#[async_trait]
pub trait Lockable: Send + Sync {
    /// Acquires the lock for `ttl`, returning the instant the lease expires.
    async fn acquire(&self, ttl: Duration) -> Result<DateTime<Utc>, Error>;

    /// Closes the underlying store connection without touching the lease.
    async fn close(self) -> Result<(), Error>
    where
        Self: Sized;
}

/// A remote forward-looking lock stored in a [`LeaseStore`].
#[derive(Debug)]
pub struct Lock {
    /// Store holding the lease object, owned by this lock.
    store: Box<dyn LeaseStore>,
    /// Identity of the lease object.
    key: LeaseKey,
    /// Retry policy for conflicting writes. Store transport retries are the
    /// store client's concern.
    retry: RetryConfig,
}

impl Lock {
    /// Returns the identity of the lease object.
    pub fn key(&self) -> &LeaseKey {
        &self.key
    }

    /// Acquires the lock for `ttl`.
    ///
    /// Returns [`Error::LockHeld`] if the lease is currently held, including
    /// by a previous acquisition of this same lock. The expiry instant can be
    /// read from the error:
    ///
    /// ```ignore
    /// match lock.acquire(Duration::from_secs(300)).await {
    ///     Ok(not_before) => info!("acquired until {}", not_before),
    ///     Err(e) => match e.lock_held() {
    ///         Some(held) => info!("lock is held until {}", held.not_before()),
    ///         None => return Err(e),
    ///     },
    /// }
    /// ```
    ///
    /// Conflicting writes are retried; other failures return immediately.
    pub async fn acquire(&self, ttl: Duration) -> Result<DateTime<Utc>, Error> {
        self.acquire_with_cancellation(ttl, &CancellationToken::new())
            .await
    }

    /// Acquires the lock for `ttl`, aborting with [`Error::Cancelled`] as
    /// soon as `cancel` fires, whether a store call or a backoff is pending.
    #[tracing::instrument(skip(self, cancel), name = "lock.acquire", fields(lease = %self.key))]
    pub async fn acquire_with_cancellation(
        &self,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<DateTime<Utc>, Error> {
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| Error::InvalidTtl(ttl))?;
        if ttl_secs < 1 {
            return Err(Error::InvalidTtl(ttl));
        }

        // Captured once so every round computes the same expiry.
        let now = Utc::now().timestamp();
        let not_before = now
            .checked_add(ttl_secs)
            .and_then(|expiry| DateTime::from_timestamp(expiry, 0))
            .ok_or(Error::InvalidTtl(ttl))?;

        let rounds = tokio_retry::RetryIf::spawn(
            self.retry.strategy(),
            move || async move {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled {
                        key: self.key.clone(),
                    });
                }
                self.try_acquire(now, not_before).await
            },
            |e: &Error| {
                let retry = e.is_retryable();
                if retry {
                    warn!(error = %e, "lease write lost a race");
                }
                retry
            },
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled {
                key: self.key.clone(),
            }),
            result = rounds => result,
        };

        match result {
            Err(e) if e.is_retryable() => Err(Error::RetryExhausted {
                key: self.key.clone(),
                source: Box::new(e),
            }),
            other => other,
        }
    }

    /// Runs a single read-check-write round at `now` (Unix seconds), writing
    /// `not_before` as the new expiry. Returns the stored expiry.
    pub(crate) async fn try_acquire(
        &self,
        now: i64,
        not_before: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, Error> {
        let current = self
            .store
            .read(&self.key)
            .await
            .map_err(|source| Error::Read {
                key: self.key.clone(),
                source,
            })?;

        let precondition = match current {
            Some(object) => {
                let held_until =
                    decode_not_before(&object.metadata).map_err(|source| Error::ParseNotBefore {
                        key: self.key.clone(),
                        source,
                    })?;

                if held_until.timestamp() >= now {
                    debug!(not_before = %held_until, now, "lease is held");
                    return Err(LockHeldError::new(held_until).into());
                }

                Precondition::Matches(object.version)
            }
            None => Precondition::DoesNotExist,
        };

        let mut metadata = HashMap::new();
        metadata.insert(
            NOT_BEFORE_KEY.to_string(),
            encode_not_before(not_before.timestamp()),
        );

        self.store
            .write(
                &self.key,
                WriteRequest {
                    metadata,
                    precondition,
                    cache_control: Some(DEFAULT_CACHE_CONTROL.to_string()),
                },
            )
            .await
            .map_err(|source| Error::Write {
                key: self.key.clone(),
                source,
            })?;

        info!(%not_before, "lease acquired");
        Ok(not_before)
    }

    /// Closes the store connection. The lease object is not deleted.
    pub async fn close(self) -> Result<(), Error> {
        self.store
            .close()
            .await
            .map_err(|source| Error::Close { source })
    }
}

#[async_trait]
impl Lockable for Lock {
    async fn acquire(&self, ttl: Duration) -> Result<DateTime<Utc>, Error> {
        Lock::acquire(self, ttl).await
    }

    async fn close(self) -> Result<(), Error> {
        Lock::close(self).await
    }
}

/// Builder for [`Lock`] instances.
#[derive(Default)]
pub struct LockBuilder {
    store: Option<Box<dyn LeaseStore>>,
    key: Option<LeaseKey>,
    retry: Option<RetryConfig>,
}

impl LockBuilder {
    pub fn new() -> LockBuilder {
        LockBuilder {
            ..Default::default()
        }
    }

    /// Sets the store holding the lease object.
    pub fn store(mut self, store: impl LeaseStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Sets the lease identity.
    pub fn key(mut self, key: LeaseKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Sets the retry policy for conflicting writes.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the lock. No store call is made until the lock is acquired.
    pub fn build(self) -> Result<Lock, Error> {
        Ok(Lock {
            store: self
                .store
                .ok_or_else(|| Error::MissingBuilderAttribute("store".to_string()))?,
            key: self
                .key
                .ok_or_else(|| Error::MissingBuilderAttribute("key".to_string()))?,
            retry: self.retry.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::LeaseObject;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const NOW: i64 = 1902902494;
    const TTL: i64 = 300;

    fn key() -> LeaseKey {
        LeaseKey::new("my-bucket", "my-object")
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn create_lock(store: impl LeaseStore + 'static) -> Lock {
        LockBuilder::new()
            .store(store)
            .key(key())
            .retry(fast_retry())
            .build()
            .unwrap()
    }

    async fn seed(store: &MemoryStore, metadata: &[(&str, String)]) {
        let metadata = metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        store
            .write(
                &key(),
                WriteRequest {
                    metadata,
                    precondition: Precondition::DoesNotExist,
                    cache_control: None,
                },
            )
            .await
            .unwrap();
    }

    async fn stored_not_before(store: &MemoryStore) -> i64 {
        let object = store.read(&key()).await.unwrap().unwrap();
        decode_not_before(&object.metadata).unwrap().timestamp()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    /// Store that fails a fixed number of writes with a conflict before
    /// delegating, as if another writer kept winning the race.
    #[derive(Debug)]
    struct ContendedStore {
        inner: MemoryStore,
        conflicts: AtomicUsize,
        writes: Arc<AtomicUsize>,
    }

    #[derive(Debug)]
    struct LostRace;

    impl std::fmt::Display for LostRace {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "precondition failed")
        }
    }

    impl std::error::Error for LostRace {}

    #[async_trait]
    impl LeaseStore for ContendedStore {
        async fn read(&self, key: &LeaseKey) -> Result<Option<LeaseObject>, store::Error> {
            self.inner.read(key).await
        }

        async fn write(&self, key: &LeaseKey, request: WriteRequest) -> Result<(), store::Error> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(store::Error::Conflict {
                    source: Box::new(LostRace),
                });
            }
            self.inner.write(key, request).await
        }
    }

    /// Store that counts close calls.
    #[derive(Debug, Default)]
    struct ClosingStore {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LeaseStore for ClosingStore {
        async fn read(&self, _key: &LeaseKey) -> Result<Option<LeaseObject>, store::Error> {
            Ok(None)
        }

        async fn write(&self, _key: &LeaseKey, _request: WriteRequest) -> Result<(), store::Error> {
            Ok(())
        }

        async fn close(&self) -> Result<(), store::Error> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_try_acquire_container_not_exist() {
        let store = MemoryStore::new();
        let lock = create_lock(store.clone());

        let err = lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Read {
                source: store::Error::ContainerNotFound { .. },
                ..
            }
        ));
        assert!(err.lock_held().is_none());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_try_acquire_object_not_exist() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        let not_before = lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap();
        assert_eq!(not_before, at(NOW + TTL));
        assert_eq!(stored_not_before(&store).await, NOW + TTL);
        assert_eq!(
            store.cache_control(&key()).as_deref(),
            Some(DEFAULT_CACHE_CONTROL)
        );
    }

    #[tokio::test]
    async fn test_try_acquire_lock_exists_not_expired() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        seed(&store, &[(NOT_BEFORE_KEY, encode_not_before(NOW + TTL / 2))]).await;
        let lock = create_lock(store.clone());

        let err = lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap_err();
        assert_eq!(err.to_string(), "lock held until 2030-04-20T08:04:04Z");
        assert_eq!(err.lock_held().unwrap().not_before_unix(), NOW + TTL / 2);
        assert_eq!(stored_not_before(&store).await, NOW + TTL / 2);
    }

    #[tokio::test]
    async fn test_try_acquire_held_until_exactly_now() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        seed(&store, &[(NOT_BEFORE_KEY, encode_not_before(NOW))]).await;
        let lock = create_lock(store.clone());

        let err = lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap_err();
        assert_eq!(err.lock_held().unwrap().not_before_unix(), NOW);
    }

    #[tokio::test]
    async fn test_try_acquire_lock_exists_expired() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        seed(&store, &[(NOT_BEFORE_KEY, encode_not_before(NOW - TTL))]).await;
        let lock = create_lock(store.clone());

        lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap();
        assert_eq!(stored_not_before(&store).await, NOW + TTL);
    }

    #[tokio::test]
    async fn test_try_acquire_object_without_not_before() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        seed(&store, &[]).await;
        let lock = create_lock(store.clone());

        lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap();
        assert_eq!(stored_not_before(&store).await, NOW + TTL);
    }

    #[tokio::test]
    async fn test_try_acquire_corrupted_not_before() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        seed(&store, &[(NOT_BEFORE_KEY, "soon".to_string())]).await;
        let lock = create_lock(store.clone());

        let err = lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap_err();
        assert!(matches!(err, Error::ParseNotBefore { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_try_acquire_unrepresentable_not_before() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let far_future = DateTime::<Utc>::MAX_UTC.timestamp() + 1;
        seed(&store, &[(NOT_BEFORE_KEY, encode_not_before(far_future))]).await;
        let lock = create_lock(store.clone());

        let err = lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ParseNotBefore {
                source: NotBeforeError::OutOfRange(value),
                ..
            } if value == far_future
        ));
        assert!(err.lock_held().is_none());

        // The lease record is left as found.
        let object = store.read(&key()).await.unwrap().unwrap();
        assert_eq!(
            object.metadata.get(NOT_BEFORE_KEY),
            Some(&encode_not_before(far_future))
        );
    }

    #[tokio::test]
    async fn test_try_acquire_reacquire_before_and_after_expiry() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        lock.try_acquire(NOW, at(NOW + TTL)).await.unwrap();

        let err = lock.try_acquire(NOW + 60, at(NOW + 60 + TTL)).await.unwrap_err();
        assert_eq!(err.lock_held().unwrap().not_before_unix(), NOW + TTL);

        let later = NOW + TTL + 1;
        assert_eq!(
            lock.try_acquire(later, at(later + TTL)).await.unwrap(),
            at(later + TTL)
        );
        assert_eq!(stored_not_before(&store).await, later + TTL);
    }

    #[tokio::test]
    async fn test_acquire_sets_not_before_from_now() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        let before = Utc::now().timestamp();
        let not_before = lock.acquire(Duration::from_millis(5_900)).await.unwrap();
        let after = Utc::now().timestamp();

        // Sub-second ttl components are truncated.
        let stored = stored_not_before(&store).await;
        assert!(stored >= before + 5 && stored <= after + 5);
        assert_eq!(not_before.timestamp(), stored);
    }

    #[tokio::test]
    async fn test_acquire_twice_is_held() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        let not_before = lock.acquire(Duration::from_secs(300)).await.unwrap();
        let err = lock.acquire(Duration::from_secs(300)).await.unwrap_err();

        assert_eq!(err.lock_held().unwrap().not_before(), not_before);
        assert_eq!(stored_not_before(&store).await, not_before.timestamp());
    }

    #[tokio::test]
    async fn test_acquire_missing_container_is_not_retried() {
        let store = MemoryStore::new();
        let lock = create_lock(store);

        let err = lock.acquire(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert!(err.lock_held().is_none());
    }

    #[tokio::test]
    async fn test_acquire_rejects_sub_second_ttl() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        let err = lock.acquire(Duration::from_millis(999)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTtl(_)));
        assert!(store.read(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_rejects_overflowing_ttl() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        for ttl in [
            Duration::from_secs(i64::MAX as u64),
            Duration::from_secs(u64::MAX),
        ] {
            let err = lock.acquire(ttl).await.unwrap_err();
            assert!(matches!(err, Error::InvalidTtl(d) if d == ttl));
        }
        assert!(store.read(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_rejects_ttl_past_utc_range() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        // About a million years, beyond the largest representable instant.
        let err = lock
            .acquire(Duration::from_secs(31_557_600_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTtl(_)));
        assert!(store.read(&key()).await.unwrap().is_none());

        // A long but representable lease round-trips exactly.
        let ttl = Duration::from_secs(31_557_600 * 1_000);
        let not_before = lock.acquire(ttl).await.unwrap();
        assert_eq!(stored_not_before(&store).await, not_before.timestamp());

        let err = lock.acquire(ttl).await.unwrap_err();
        assert_eq!(err.lock_held().unwrap().not_before(), not_before);
        assert_ne!(err.to_string(), "lock held until 1970-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_acquire_retries_conflicts() {
        let writes = Arc::new(AtomicUsize::new(0));
        let inner = MemoryStore::new();
        inner.create_container("my-bucket");
        let lock = create_lock(ContendedStore {
            inner: inner.clone(),
            conflicts: AtomicUsize::new(2),
            writes: Arc::clone(&writes),
        });

        lock.acquire(Duration::from_secs(5)).await.unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 3);
        assert!(inner.read(&key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_acquire_retry_exhausted() {
        let writes = Arc::new(AtomicUsize::new(0));
        let inner = MemoryStore::new();
        inner.create_container("my-bucket");
        let lock = create_lock(ContendedStore {
            inner: inner.clone(),
            conflicts: AtomicUsize::new(usize::MAX),
            writes: Arc::clone(&writes),
        });

        let err = lock.acquire(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { .. }));
        assert!(err.lock_held().is_none());
        assert_eq!(writes.load(Ordering::SeqCst), fast_retry().max_attempts);
        assert!(inner.read(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_cancelled_before_start() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = lock
            .acquire_with_cancellation(Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(store.read(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_cancelled_during_backoff() {
        let inner = MemoryStore::new();
        inner.create_container("my-bucket");
        let lock = LockBuilder::new()
            .store(ContendedStore {
                inner,
                conflicts: AtomicUsize::new(usize::MAX),
                writes: Arc::new(AtomicUsize::new(0)),
            })
            .key(key())
            .retry(RetryConfig {
                max_attempts: 6,
                initial_backoff: Duration::from_secs(60),
            })
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            lock.acquire_with_cancellation(Duration::from_secs(5), &cancel),
        )
        .await
        .expect("cancellation should abort the backoff")
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_close_closes_store_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let lock = create_lock(ClosingStore {
            closes: Arc::clone(&closes),
        });

        lock.acquire(Duration::from_secs(5)).await.unwrap();
        Lockable::close(lock).await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_keeps_lease() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = create_lock(store.clone());

        let not_before = lock.acquire(Duration::from_secs(60)).await.unwrap();
        lock.close().await.unwrap();

        assert_eq!(stored_not_before(&store).await, not_before.timestamp());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_single_winner() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        let lock = Arc::new(create_lock(store.clone()));

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let lock = Arc::clone(&lock);
                tokio::spawn(async move { lock.acquire(Duration::from_secs(5)).await })
            })
            .collect();

        let mut acquired = Vec::new();
        let mut rejected = Vec::new();
        for result in futures_util::future::join_all(handles).await {
            match result.unwrap() {
                Ok(not_before) => acquired.push(not_before),
                Err(Error::LockHeld(held)) => rejected.push(held),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(acquired.len(), 1);
        assert_eq!(rejected.len(), 2);
        for held in rejected {
            assert_eq!(held.not_before(), acquired[0]);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_locks_on_expired_lease_single_winner() {
        let store = MemoryStore::new();
        store.create_container("my-bucket");
        seed(&store, &[(NOT_BEFORE_KEY, encode_not_before(1))]).await;

        // Independent locks sharing only the store, as separate processes would.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = create_lock(store.clone());
                tokio::spawn(async move { lock.acquire(Duration::from_secs(30)).await })
            })
            .collect();

        let results: Vec<_> = futures_util::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        let held = results
            .iter()
            .filter(|r| matches!(r, Err(Error::LockHeld(_))))
            .count();
        assert_eq!(winners, 1);
        assert_eq!(held, 7);
    }

    #[test]
    fn test_builder_missing_store() {
        let result = LockBuilder::new().key(key()).build();
        assert!(matches!(
            result,
            Err(Error::MissingBuilderAttribute(attr)) if attr == "store"
        ));
    }

    #[test]
    fn test_builder_missing_key() {
        let result = LockBuilder::new().store(MemoryStore::new()).build();
        assert!(matches!(
            result,
            Err(Error::MissingBuilderAttribute(attr)) if attr == "key"
        ));
    }

    #[test]
    fn test_builder_default_retry() {
        let lock = LockBuilder::new()
            .store(MemoryStore::new())
            .key(key())
            .build()
            .unwrap();
        assert_eq!(lock.retry, RetryConfig::default());
        assert_eq!(lock.key(), &key());
    }
}
