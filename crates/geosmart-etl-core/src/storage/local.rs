//! Directory-backed object store.
use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;
use tokio::{fs, io::AsyncWriteExt};

use super::{
    ObjectStore, validate_key,
    error::{BackendError, NotFoundSnafu, OtherIoSnafu, StorageResult},
};

/// Object store rooted at a local directory; keys map to relative paths.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

async fn create_parent_dir(abs: &Path) -> StorageResult<()> {
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: parent.display().to_string(),
            })?;
    }
    Ok(())
}

/// Removes a temporary file on drop unless disarmed.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// Call after a successful rename.
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            // Best-effort cleanup while another error is already propagating.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Sibling temp path unique to this process and call.
fn temp_path_for(abs: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = abs.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.{seq}.tmp", std::process::id()));
    abs.with_file_name(name)
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, bytes: Bytes) -> StorageResult<()> {
        let abs = self.resolve(key)?;
        create_parent_dir(&abs).await?;

        let tmp_path = temp_path_for(&abs);
        let mut guard = TempFileGuard::new(tmp_path.clone());
        {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: tmp_path.display().to_string(),
                })?;
            file.write_all(&bytes)
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: tmp_path.display().to_string(),
                })?;
            file.sync_all()
                .await
                .map_err(BackendError::Local)
                .context(OtherIoSnafu {
                    path: tmp_path.display().to_string(),
                })?;
        }

        fs::rename(&tmp_path, &abs)
            .await
            .map_err(BackendError::Local)
            .context(OtherIoSnafu {
                path: abs.display().to_string(),
            })?;
        guard.disarm();
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let abs = self.resolve(key)?;
        match fs::read(&abs).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => NotFoundSnafu { key }.fail(),
            Err(e) => Err(BackendError::Local(e)).context(OtherIoSnafu {
                path: abs.display().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn put_creates_nested_object_and_get_reads_it() -> TestResult {
        let tmp = TempDir::new()?;
        let store = LocalStore::new(tmp.path());

        store
            .put("datasets/v1/profile.json", Bytes::from_static(b"{}"))
            .await?;
        assert!(tmp.path().join("datasets/v1/profile.json").exists());
        assert_eq!(store.get("datasets/v1/profile.json").await?, Bytes::from_static(b"{}"));
        Ok(())
    }

    #[tokio::test]
    async fn put_overwrites_and_leaves_no_temp_file() -> TestResult {
        let tmp = TempDir::new()?;
        let store = LocalStore::new(tmp.path());

        store.put("a/data.bin", Bytes::from_static(b"original")).await?;
        store.put("a/data.bin", Bytes::from_static(b"updated")).await?;

        assert_eq!(store.get("a/data.bin").await?, Bytes::from_static(b"updated"));
        assert_eq!(dir_entries(&tmp.path().join("a"))?, vec!["data.bin"]);
        Ok(())
    }

    fn dir_entries(dir: &Path) -> io::Result<Vec<String>> {
        let mut names = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    #[tokio::test]
    async fn concurrent_puts_to_one_key_use_separate_temp_files() -> TestResult {
        let tmp = TempDir::new()?;
        let store = LocalStore::new(tmp.path());
        let first = vec![b'a'; 256 * 1024];
        let second = vec![b'b'; 256 * 1024];

        let (a, b) = tokio::join!(
            store.put("v1/dataset.parquet", Bytes::from(first.clone())),
            store.put("v1/dataset.parquet", Bytes::from(second.clone())),
        );
        a?;
        b?;

        let stored = store.get("v1/dataset.parquet").await?;
        assert!(stored == first || stored == second);
        assert_eq!(dir_entries(&tmp.path().join("v1"))?, vec!["dataset.parquet"]);
        Ok(())
    }

    #[test]
    fn temp_paths_are_unique_siblings() {
        let target = Path::new("/store/v1/dataset.parquet");
        let a = temp_path_for(target);
        let b = temp_path_for(target);
        assert_ne!(a, b);
        assert_eq!(a.parent(), target.parent());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() -> TestResult {
        let tmp = TempDir::new()?;
        let store = LocalStore::new(tmp.path());
        let err = store.get("nope/profile.json").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { key, .. } if key == "nope/profile.json"));
        Ok(())
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let store = LocalStore::new(tmp.path().join("root"));
        let err = store
            .put("../outside.bin", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
        assert!(!tmp.path().join("outside.bin").exists());
        Ok(())
    }
}
