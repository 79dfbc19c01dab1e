//! Configuration structures for object store locks.
//!
//! Defines the lease location, lease duration, credentials and client
//! options of a lock backed by an object store.

use objlock_core::lease::{self, LeaseKey};
use objlock_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Object store lock configuration.
#[derive(PartialEq, Clone, Debug, Deserialize, Serialize)]
pub struct Lock {
    /// Label identifying the lock in logs.
    pub name: String,
    /// URL of the lease object, e.g. `gs://bucket/locks/daily-report`.
    pub path: String,
    /// How long an acquisition holds the lease (e.g. "5m", "1h").
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Optional path to service account credentials file.
    pub credentials_path: Option<PathBuf>,
    /// Additional client connection options.
    pub client_options: Option<HashMap<String, String>>,
    /// Optional lock-level retry configuration.
    pub retry: Option<RetryConfig>,
}

impl Lock {
    /// Returns the lease identity encoded in `path`.
    pub fn key(&self) -> Result<LeaseKey, lease::Error> {
        LeaseKey::parse_url(&self.path)
    }

    /// Returns a client builder configured from this lock.
    pub fn client_builder(&self) -> super::client::ClientBuilder {
        let mut builder = super::client::ClientBuilder::new().path(self.path.clone());
        if let Some(options) = &self.client_options {
            builder = builder.options(options.clone());
        }
        if let Some(credentials_path) = &self.credentials_path {
            builder = builder.credentials_path(credentials_path.clone());
        }
        builder
    }
}
