//! Lease identity and metadata encoding.
//!
//! A lease is stored as an empty object whose metadata holds a single
//! `nbf` entry: the Unix timestamp in whole seconds until which the lease is
//! held. The encoding is shared with every other implementation that reads
//! or writes the same objects, so it must not change.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::fmt;
use std::num::ParseIntError;

/// Metadata key where the not-before timestamp is stored.
pub const NOT_BEFORE_KEY: &str = "nbf";

/// Cache-Control value sent with every lease write.
pub const DEFAULT_CACHE_CONTROL: &str = "private, no-cache, no-store, no-transform, max-age=0";

/// Errors raised when parsing a lease identity.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The lease location is not a valid URL.
    #[error("Invalid lease URL format: {source}")]
    ParseUrl {
        #[source]
        source: url::ParseError,
    },
    /// The lease URL has no host naming the container.
    #[error("Lease URL {0} has no container")]
    MissingContainer(String),
    /// The lease URL has no path naming the object.
    #[error("Lease URL {0} has no object name")]
    MissingName(String),
}

/// Errors raised when decoding a stored not-before timestamp.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotBeforeError {
    /// The stored value is not a base-10 integer.
    #[error("value {value:?} is not an integer: {source}")]
    Parse {
        value: String,
        #[source]
        source: ParseIntError,
    },
    /// The stored value has no UTC representation.
    #[error("timestamp {0} is outside the representable UTC range")]
    OutOfRange(i64),
}

/// Identity of a lease: the container (bucket) and object name holding it.
///
/// Distinct locks must use distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseKey {
    /// Container, bucket or namespace of the lease object.
    pub container: String,
    /// Object name inside the container.
    pub name: String,
}

impl LeaseKey {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Parses a key from a store URL such as `gs://bucket/locks/daily`.
    ///
    /// The URL host is the container and the path, without its leading
    /// slash, is the object name.
    pub fn parse_url(value: &str) -> Result<Self, Error> {
        let url = url::Url::parse(value).map_err(|source| Error::ParseUrl { source })?;
        let container = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::MissingContainer(value.to_string()))?;
        let name = url.path().trim_start_matches('/');
        if name.is_empty() {
            return Err(Error::MissingName(value.to_string()));
        }
        Ok(Self::new(container, name))
    }
}

impl fmt::Display for LeaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Encodes a not-before timestamp as base-10 ASCII seconds.
pub fn encode_not_before(not_before: i64) -> String {
    not_before.to_string()
}

/// Reads the not-before timestamp from object metadata.
///
/// A missing entry means the lease was never held and decodes to the Unix
/// epoch. Values chrono cannot represent are rejected rather than clamped.
pub fn decode_not_before(
    metadata: &HashMap<String, String>,
) -> Result<DateTime<Utc>, NotBeforeError> {
    let seconds = match metadata.get(NOT_BEFORE_KEY) {
        Some(value) => value.parse::<i64>().map_err(|source| NotBeforeError::Parse {
            value: value.clone(),
            source,
        })?,
        None => 0,
    };
    DateTime::from_timestamp(seconds, 0).ok_or(NotBeforeError::OutOfRange(seconds))
}

/// Returned when a lease is currently held by anyone, the caller included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockHeldError {
    not_before: DateTime<Utc>,
}

impl LockHeldError {
    pub fn new(not_before: DateTime<Utc>) -> Self {
        Self { not_before }
    }

    /// Instant, in UTC, when the lease expires.
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    /// Unix timestamp in seconds when the lease expires.
    pub fn not_before_unix(&self) -> i64 {
        self.not_before.timestamp()
    }
}

impl fmt::Display for LockHeldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock held until {}",
            self.not_before()
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

impl std::error::Error for LockHeldError {}
