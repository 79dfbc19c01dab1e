//! Objlock core library providing a forward-looking distributed lease.
//!
//! A lease is an object in a remote store whose metadata carries a
//! not-before timestamp. Acquiring the lock writes a future timestamp with a
//! conditional write; anyone observing a timestamp that has not yet passed
//! treats the lock as held. The lock never releases, it expires.

/// Connection trait for lease store clients.
pub mod client;
/// Lease identity, metadata encoding and the lock held error.
pub mod lease;
/// Lock coordinator implementing the read-check-conditional-write protocol.
pub mod lock;
/// Retry policy for conflicting acquisition attempts.
pub mod retry;
/// Lease store adapter contract and the in-memory implementation.
pub mod store;
