use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::error::StorageError;
use crate::storage_traits::{validate_key, ObjectStore, PutOutcome, StorageResult};

/// Filesystem-backed object store with git-style 2-char sharding.
///
/// Layout: `<root>/objects/<first 2 key chars>/<remaining key chars>`
pub struct FsObjectStore {
    objects_dir: PathBuf,
}

impl FsObjectStore {
    /// Create a new `FsObjectStore` rooted at `root`. Creates `root/objects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let objects_dir = root.as_ref().join("objects");
        fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        if key.len() > 2 && key.is_char_boundary(2) {
            self.objects_dir.join(&key[..2]).join(&key[2..])
        } else {
            self.objects_dir.join(key)
        }
    }
}

fn write_no_clobber(path: &Path, data: &[u8]) -> StorageResult<PutOutcome> {
    if path.exists() {
        return Ok(PutOutcome::AlreadyExists);
    }

    let shard_dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "object path has no parent"))?;
    fs::create_dir_all(shard_dir)?;

    // Write to a temp file in the same directory, then link it into place
    // without replacing a concurrent writer's object.
    let mut tmp = NamedTempFile::new_in(shard_dir)?;
    tmp.write_all(data)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(PutOutcome::Created),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(PutOutcome::AlreadyExists),
        Err(e) => Err(StorageError::Io(e.error)),
    }
}

fn join_error(err: tokio::task::JoinError) -> StorageError {
    StorageError::Io(io::Error::other(err))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_if_absent(&self, key: &str, data: &[u8]) -> StorageResult<PutOutcome> {
        validate_key(key)?;
        let path = self.object_path(key);
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || write_no_clobber(&path, &data))
            .await
            .map_err(join_error)?
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        let path = self.object_path(key);
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || {
            fs::read(&path).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    StorageError::NotFound { key: owned_key }
                } else {
                    StorageError::Io(e)
                }
            })
        })
        .await
        .map_err(join_error)?
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.object_path(key).exists())
    }
}
