//! Storage trait definitions for evaluation results
//!
//! `ObjectStore` is the only abstraction the evaluation pipeline needs from a
//! blob backend: a conditional write that never replaces an existing object,
//! and a plain read. Keys are content hashes computed by the caller.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The object did not exist and was written.
    Created,
    /// An object already existed under the key; nothing was written.
    AlreadyExists,
}

/// Write-once blob store.
///
/// Guarantees:
/// - `put_if_absent` never overwrites an existing object; a collision is
///   reported as `PutOutcome::AlreadyExists`, not as an error.
/// - `get` returns the bytes of the first successful write for the key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key` unless an object already exists there.
    async fn put_if_absent(&self, key: &str, data: &[u8]) -> StorageResult<PutOutcome>;

    /// Read the object stored under `key`. Returns `StorageError::NotFound` if absent.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Check whether an object exists under `key`.
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Reject keys the backends cannot address safely.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.starts_with('.') {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}
