//! Object storage capability.
//!
//! The pipeline persists artifacts through the [`ObjectStore`] trait and
//! nothing else: `put` a blob under a key, `get` it back. Two stores ship
//! with the crate:
//!
//! - [`MemoryStore`], an in-process map used by tests and dry runs;
//! - [`LocalStore`], a directory tree where each key is a relative path,
//!   written with write-then-rename so readers never see a partial object.
//!
//! Network object stores plug in by implementing the trait.
pub mod error;
mod local;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{BackendError, StorageError, StorageResult};
pub use local::LocalStore;
pub use memory::MemoryStore;

use error::InvalidKeySnafu;

/// Minimal blob store used by the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()>;

    /// Fetch the object stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        (**self).put(key, bytes).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        (**self).get(key).await
    }
}

/// Check that `key` is a relative, `/`-separated path without `.` or `..`
/// segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key.starts_with('/') {
        Some("key must be relative")
    } else if key.contains('\\') {
        Some("key must use '/' separators")
    } else if key
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        Some("key has an empty, '.' or '..' segment")
    } else {
        None
    };
    match reason {
        Some(reason) => InvalidKeySnafu { key, reason }.fail(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_must_stay_inside_the_store() {
        assert!(validate_key("datasets/v1/dataset.parquet").is_ok());
        for bad in ["", "/etc/passwd", "a/../b", "a//b", "./a", "a\\b", "a/"] {
            assert!(
                matches!(validate_key(bad), Err(StorageError::InvalidKey { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
