//! Lock acquisition run driven by an [`AppConfig`].

use crate::config::AppConfig;
use chrono::{DateTime, Utc};
use objlock_core::client::Client;
use objlock_core::lease;
use objlock_core::lock::{self, LockBuilder};
use objlock_core::retry::RetryConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors that can occur while running the application.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configured lock path is not a valid lease location.
    #[error("Invalid lease location: {source}")]
    Lease {
        #[source]
        source: lease::Error,
    },
    /// The object store client could not be built or connected.
    #[error("Failed to set up object store client: {source}")]
    Client {
        #[source]
        source: objlock_object_store::client::Error,
    },
    /// Lock acquisition failed for a reason other than a held lease.
    #[error(transparent)]
    Lock {
        #[from]
        source: lock::Error,
    },
}

/// Result of a completed acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The lease is ours until `not_before`.
    Acquired { not_before: DateTime<Utc> },
    /// Someone holds the lease until `not_before`.
    Held { not_before: DateTime<Utc> },
}

/// Main application that acquires the configured lock once.
#[derive(Debug)]
pub struct App {
    config: AppConfig,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Builds the store client and lock, then makes one acquisition.
    ///
    /// A held lease is a regular outcome, not an error. The store connection
    /// is closed before returning in every case that got as far as building
    /// the lock.
    #[tracing::instrument(skip_all, name = "app.run", fields(lock = %self.config.lock.name))]
    pub async fn run(self, cancel: CancellationToken) -> Result<Outcome, Error> {
        let lock_config = &self.config.lock;
        let key = lock_config
            .key()
            .map_err(|source| Error::Lease { source })?;

        let client = lock_config
            .client_builder()
            .build()
            .map_err(|source| Error::Client { source })?
            .connect()
            .await
            .map_err(|source| Error::Client { source })?;

        let lock = LockBuilder::new()
            .store(client)
            .key(key)
            .retry(RetryConfig::merge(&self.config.retry, &lock_config.retry))
            .build()?;

        let result = lock
            .acquire_with_cancellation(lock_config.ttl, &cancel)
            .await;

        if let Err(e) = lock.close().await {
            warn!(error = %e, "failed to close lock");
        }

        match result {
            Ok(not_before) => {
                info!(%not_before, "lock acquired");
                Ok(Outcome::Acquired { not_before })
            }
            Err(lock::Error::LockHeld(held)) => {
                info!(not_before = %held.not_before(), "lock is held");
                Ok(Outcome::Held {
                    not_before: held.not_before(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
