//! In-memory lease store using DashMap.

use super::{Error, LeaseObject, LeaseStore, ObjectVersion, Precondition, WriteRequest};
use crate::lease::LeaseKey;
use dashmap::{mapref::entry::Entry, DashMap, DashSet};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Reasons a conditional write was refused.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum PreconditionError {
    /// A create found the object already present.
    #[error("Object {0} already exists")]
    AlreadyExists(LeaseKey),
    /// An update found the object gone.
    #[error("Object {0} not found")]
    NotFound(LeaseKey),
    /// An update found the object at a different version.
    #[error("Object {key} is at generation {actual:?}, expected {expected:?}")]
    VersionMismatch {
        key: LeaseKey,
        expected: ObjectVersion,
        actual: ObjectVersion,
    },
}

#[derive(Debug, Clone)]
struct StoredObject {
    metadata: HashMap<String, String>,
    cache_control: Option<String>,
    generation: u64,
    metageneration: u64,
}

impl StoredObject {
    fn version(&self) -> ObjectVersion {
        ObjectVersion {
            generation: Some(self.generation.to_string()),
            metageneration: Some(self.metageneration.to_string()),
        }
    }
}

/// Thread-safe in-memory lease store.
///
/// Each write replaces the whole object and therefore gets a fresh
/// generation with metageneration `1`, the way object stores version
/// rewritten objects. Preconditions are checked under the entry lock so
/// concurrent writers racing on the same version see exactly one winner.
/// Containers must be created before objects can be read or written in them.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    containers: Arc<DashSet<String>>,
    objects: Arc<DashMap<LeaseKey, StoredObject>>,
    generations: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container. Creating an existing container is a no-op.
    pub fn create_container(&self, container: impl Into<String>) {
        self.containers.insert(container.into());
    }

    /// Removes an object, as an operator cleaning up a lease would.
    pub fn remove(&self, key: &LeaseKey) -> bool {
        self.objects.remove(key).is_some()
    }

    /// Returns the Cache-Control value stored with an object.
    pub fn cache_control(&self, key: &LeaseKey) -> Option<String> {
        self.objects
            .get(key)
            .and_then(|entry| entry.cache_control.clone())
    }

    fn ensure_container(&self, key: &LeaseKey) -> Result<(), Error> {
        if self.containers.contains(&key.container) {
            Ok(())
        } else {
            Err(Error::ContainerNotFound {
                container: key.container.clone(),
            })
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait::async_trait]
impl LeaseStore for MemoryStore {
    async fn read(&self, key: &LeaseKey) -> Result<Option<LeaseObject>, Error> {
        self.ensure_container(key)?;
        Ok(self.objects.get(key).map(|entry| LeaseObject {
            metadata: entry.metadata.clone(),
            version: entry.version(),
        }))
    }

    async fn write(&self, key: &LeaseKey, request: WriteRequest) -> Result<(), Error> {
        self.ensure_container(key)?;

        let stored = StoredObject {
            metadata: request.metadata,
            cache_control: request.cache_control,
            generation: self.next_generation(),
            metageneration: 1,
        };

        match (self.objects.entry(key.clone()), request.precondition) {
            (Entry::Vacant(vacant), Precondition::DoesNotExist) => {
                vacant.insert(stored);
                Ok(())
            }
            (Entry::Occupied(_), Precondition::DoesNotExist) => Err(Error::Conflict {
                source: Box::new(PreconditionError::AlreadyExists(key.clone())),
            }),
            (Entry::Vacant(_), Precondition::Matches(_)) => Err(Error::Conflict {
                source: Box::new(PreconditionError::NotFound(key.clone())),
            }),
            (Entry::Occupied(mut occupied), Precondition::Matches(expected)) => {
                let actual = occupied.get().version();
                if actual != expected {
                    return Err(Error::Conflict {
                        source: Box::new(PreconditionError::VersionMismatch {
                            key: key.clone(),
                            expected,
                            actual,
                        }),
                    });
                }
                occupied.insert(stored);
                Ok(())
            }
        }
    }
}
