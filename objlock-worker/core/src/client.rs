//! Connection step for lease store clients.
//!
//! Backends are built without I/O and connected once before the first
//! acquisition, so configuration problems surface before any lease is read.

use crate::store::LeaseStore;
use std::future::Future;

/// A lease store that needs a connection step before use.
pub trait Client: LeaseStore + Sized {
    /// Error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connects to the backend, consuming the unconnected client.
    fn connect(self) -> impl Future<Output = Result<Self, Self::Error>> + Send;
}
