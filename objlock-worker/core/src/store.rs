//! Lease store adapter contract.
//!
//! The lock coordinator only needs two capabilities from a remote store:
//! reading an object's metadata together with its version markers, and
//! writing metadata conditioned on either non-existence or an exact version.
//! Backends report failures through [`Error`] so the coordinator can tell a
//! lost race apart from a broken store without inspecting concrete types.

pub mod memory;

use crate::lease::LeaseKey;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;

/// Type alias for boxed backend errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors reported by lease store backends.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The write precondition did not hold or the object vanished before the
    /// write landed. Another writer won the round.
    #[error("Lease object was modified concurrently: {source}")]
    Conflict {
        #[source]
        source: BoxError,
    },
    /// The container holding the lease object does not exist.
    #[error("Container {container} does not exist")]
    ContainerNotFound { container: String },
    /// Any other backend failure. Never retried.
    #[error("Lease store operation failed: {source}")]
    Backend {
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Returns true for the only failure class that warrants a new round.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

/// Store-provided version markers of a lease object.
///
/// Values are opaque and only ever compared for equality by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectVersion {
    /// Content generation of the object.
    pub generation: Option<String>,
    /// Metadata generation of the object.
    pub metageneration: Option<String>,
}

/// Current state of an existing lease object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseObject {
    /// User metadata attached to the object.
    pub metadata: HashMap<String, String>,
    /// Version markers observed with the metadata.
    pub version: ObjectVersion,
}

/// Condition the store must verify atomically before accepting a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The object must not exist yet.
    DoesNotExist,
    /// The object must still be at exactly this version.
    Matches(ObjectVersion),
}

/// Metadata write of a lease object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Metadata replacing the object's metadata.
    pub metadata: HashMap<String, String>,
    /// Condition guarding the write.
    pub precondition: Precondition,
    /// Cache-Control value sent with the object.
    pub cache_control: Option<String>,
}

/// Trait for stores that can hold lease objects.
#[async_trait]
pub trait LeaseStore: Debug + Send + Sync {
    /// Reads the metadata and version of a lease object.
    ///
    /// # Returns
    /// * `Ok(Some(object))` - Object exists
    /// * `Ok(None)` - Object not found
    /// * `Err(e)` - Operation failed (missing container, auth error, etc.)
    async fn read(&self, key: &LeaseKey) -> Result<Option<LeaseObject>, Error>;

    /// Writes lease metadata if the request's precondition holds.
    ///
    /// Returns [`Error::Conflict`] when the precondition fails or the object
    /// was removed concurrently.
    async fn write(&self, key: &LeaseKey, request: WriteRequest) -> Result<(), Error>;

    /// Releases the connection to the store. Lease objects are left untouched.
    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
