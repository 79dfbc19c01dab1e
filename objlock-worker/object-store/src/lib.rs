//! Object store backend for objlock leases.
//!
//! Stores lease objects in Google Cloud Storage, S3, Azure Blob Storage or
//! memory through the `object_store` crate, using conditional puts to resolve
//! concurrent acquisitions.
//!
//! S3 only honours conditional puts when the `aws_conditional_put` client
//! option is set (e.g. `aws_conditional_put: etag`); without it every lease
//! write fails.

/// Object store client implementing the lease store contract.
pub mod client;
/// Lock configuration structures.
pub mod config;
