//! Object store client holding lease objects.
//!
//! Implements the lease store contract on top of the `object_store` crate so
//! leases can live in Google Cloud Storage, S3, Azure Blob Storage or memory.
//! Lease objects are empty; the not-before timestamp travels as user
//! metadata and conflicts are detected with conditional puts.
//!
//! For `s3://` paths set the `aws_conditional_put` client option (`etag`);
//! object_store rejects `PutMode::Create` and `PutMode::Update` on S3
//! otherwise.

use dashmap::DashMap;
use object_store::{
    path::Path, Attribute, Attributes, GetOptions, ObjectStore, PutMode, PutOptions, PutPayload,
    UpdateVersion,
};
use objlock_core::lease::LeaseKey;
use objlock_core::store::{
    self, LeaseObject, LeaseStore, ObjectVersion, Precondition, WriteRequest,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// User agent sent with every request unless overridden by client options.
pub const DEFAULT_USER_AGENT: &str = concat!("objlock/", env!("CARGO_PKG_VERSION"));

/// Client option key for the user agent.
const USER_AGENT_KEY: &str = "user_agent";

/// Client option key for the Google service account file.
const GOOGLE_SERVICE_ACCOUNT_KEY: &str = "google_service_account";

/// URL scheme of the in-memory store.
const MEMORY_SCHEME: &str = "memory";

/// Errors that can occur while building or connecting the client.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The store path is not a valid URL.
    #[error("Invalid URL format: {source}")]
    ParseUrl {
        #[source]
        source: url::ParseError,
    },
    /// The object store handle could not be created.
    #[error("Object store error: {source}")]
    ObjectStore {
        #[source]
        source: object_store::Error,
    },
    /// A credentials file was given for a non-GCS scheme.
    #[error("Credentials file is only supported for gs:// paths, got {0}://")]
    UnsupportedCredentials(String),
    /// The store path names no container.
    #[error("Path {0} has no container")]
    MissingContainer(String),
    /// Required builder attribute was not provided.
    #[error("Missing required builder attribute: {}", _0)]
    MissingBuilderAttribute(String),
}

/// Object store backed lease store.
///
/// One `ObjectStore` handle is kept per container and created on first use
/// from `{scheme}://{container}` with the configured client options.
#[derive(Debug, Clone)]
pub struct Client {
    /// URL scheme of the backing store, e.g. `gs` or `s3`.
    scheme: String,
    /// Container primed on connect.
    container: Option<String>,
    /// Options passed to `object_store::parse_url_opts`.
    options: HashMap<String, String>,
    /// Object store handles keyed by container.
    stores: Arc<DashMap<String, Arc<dyn ObjectStore>>>,
}

impl Client {
    /// Returns the object store handle for a container, creating it on demand.
    fn store_for(&self, container: &str) -> Result<Arc<dyn ObjectStore>, Error> {
        if let Some(store) = self.stores.get(container) {
            return Ok(Arc::clone(store.value()));
        }

        // The in-memory store has no notion of a bucket in its URL.
        let url = if self.scheme == MEMORY_SCHEME {
            url::Url::parse("memory:///")
        } else {
            url::Url::parse(&format!("{}://{}", self.scheme, container))
        }
        .map_err(|source| Error::ParseUrl { source })?;

        let (store, _) = object_store::parse_url_opts(&url, self.options.iter())
            .map_err(|source| Error::ObjectStore { source })?;
        let store: Arc<dyn ObjectStore> = Arc::from(store);

        let store = self
            .stores
            .entry(container.to_string())
            .or_insert(store)
            .value()
            .clone();
        Ok(store)
    }
}

impl objlock_core::client::Client for Client {
    type Error = Error;

    /// Creates the object store handle for the configured container so that
    /// configuration problems surface before the first lock attempt.
    #[tracing::instrument(skip(self), name = "object_store.connect", fields(scheme = %self.scheme))]
    async fn connect(self) -> Result<Self, Error> {
        if let Some(container) = &self.container {
            self.store_for(container)?;
            info!(container = %container, "object store client connected");
        }
        Ok(self)
    }
}

/// Collects user metadata from object attributes.
fn metadata_from(attributes: &Attributes) -> HashMap<String, String> {
    attributes
        .iter()
        .filter_map(|(attribute, value)| match attribute {
            Attribute::Metadata(key) => {
                let value: &str = value.as_ref();
                Some((key.to_string(), value.to_string()))
            }
            _ => None,
        })
        .collect()
}

/// Classifies a failed conditional put.
///
/// A refused precondition, an object created under our feet or an object
/// deleted under our feet all mean another party changed the lease.
fn write_error(source: object_store::Error) -> store::Error {
    match source {
        object_store::Error::Precondition { .. }
        | object_store::Error::AlreadyExists { .. }
        | object_store::Error::NotFound { .. } => store::Error::Conflict {
            source: Box::new(source),
        },
        _ => store::Error::Backend {
            source: Box::new(source),
        },
    }
}

#[async_trait::async_trait]
impl LeaseStore for Client {
    #[tracing::instrument(skip(self), name = "object_store.read", fields(lease = %key))]
    async fn read(&self, key: &LeaseKey) -> Result<Option<LeaseObject>, store::Error> {
        let object_store = self
            .store_for(&key.container)
            .map_err(|e| store::Error::Backend { source: Box::new(e) })?;
        let path = Path::from(key.name.as_str());

        let options = GetOptions {
            head: true,
            ..Default::default()
        };

        match object_store.get_opts(&path, options).await {
            Ok(result) => Ok(Some(LeaseObject {
                metadata: metadata_from(&result.attributes),
                version: ObjectVersion {
                    generation: result.meta.version,
                    metageneration: result.meta.e_tag,
                },
            })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(source) => Err(store::Error::Backend {
                source: Box::new(source),
            }),
        }
    }

    #[tracing::instrument(skip(self, request), name = "object_store.write", fields(lease = %key))]
    async fn write(&self, key: &LeaseKey, request: WriteRequest) -> Result<(), store::Error> {
        let object_store = self
            .store_for(&key.container)
            .map_err(|e| store::Error::Backend { source: Box::new(e) })?;
        let path = Path::from(key.name.as_str());

        let mode = match request.precondition {
            Precondition::DoesNotExist => PutMode::Create,
            Precondition::Matches(version) => PutMode::Update(UpdateVersion {
                e_tag: version.metageneration,
                version: version.generation,
            }),
        };

        let mut attributes = Attributes::new();
        if let Some(cache_control) = request.cache_control {
            attributes.insert(Attribute::CacheControl, cache_control.into());
        }
        for (name, value) in request.metadata {
            attributes.insert(Attribute::Metadata(name.into()), value.into());
        }

        let options = PutOptions {
            mode,
            attributes,
            ..Default::default()
        };

        let result = object_store
            .put_opts(&path, PutPayload::new(), options)
            .await
            .map_err(write_error)?;

        debug!(e_tag = ?result.e_tag, version = ?result.version, "lease object written");
        Ok(())
    }

    async fn close(&self) -> Result<(), store::Error> {
        self.stores.clear();
        debug!("object store client closed");
        Ok(())
    }
}

/// Builder for [`Client`] instances.
#[derive(Default)]
pub struct ClientBuilder {
    /// Store URL, e.g. `gs://bucket` or `gs://bucket/locks/daily`.
    path: Option<String>,
    /// Optional path to service account credentials file.
    credentials_path: Option<PathBuf>,
    /// Additional client connection options.
    options: Option<HashMap<String, String>>,
    /// Pre-built object store handles keyed by container.
    stores: Vec<(String, Arc<dyn ObjectStore>)>,
}

impl ClientBuilder {
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            ..Default::default()
        }
    }

    /// Sets the store URL. Its scheme selects the backend and its host, if
    /// any, is the container primed on connect.
    pub fn path(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }

    /// Sets the service account credentials file for Google Cloud Storage.
    pub fn credentials_path(mut self, credentials_path: PathBuf) -> Self {
        self.credentials_path = Some(credentials_path);
        self
    }

    /// Sets additional `object_store` configuration options.
    pub fn options(mut self, options: HashMap<String, String>) -> Self {
        self.options = Some(options);
        self
    }

    /// Uses an existing object store handle for a container.
    pub fn store(mut self, container: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.push((container.into(), store));
        self
    }

    /// Builds the client without contacting the store.
    pub fn build(self) -> Result<Client, Error> {
        let path = self
            .path
            .ok_or_else(|| Error::MissingBuilderAttribute("path".to_string()))?;
        let url = url::Url::parse(&path).map_err(|source| Error::ParseUrl { source })?;
        let scheme = url.scheme().to_string();
        let container = url
            .host_str()
            .filter(|host| !host.is_empty())
            .map(str::to_string);

        if scheme != MEMORY_SCHEME && container.is_none() && self.stores.is_empty() {
            return Err(Error::MissingContainer(path));
        }

        let mut options = self.options.unwrap_or_default();
        options
            .entry(USER_AGENT_KEY.to_string())
            .or_insert_with(|| DEFAULT_USER_AGENT.to_string());

        if let Some(credentials_path) = self.credentials_path {
            if scheme != "gs" {
                return Err(Error::UnsupportedCredentials(scheme));
            }
            options.insert(
                GOOGLE_SERVICE_ACCOUNT_KEY.to_string(),
                credentials_path.to_string_lossy().to_string(),
            );
        }

        let stores = DashMap::new();
        for (container, store) in self.stores {
            stores.insert(container, store);
        }

        Ok(Client {
            scheme,
            container,
            options,
            stores: Arc::new(stores),
        })
    }
}
