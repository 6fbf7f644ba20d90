//! Memory and filesystem implementations of the session storage traits.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;
use tracing::trace;

use super::{BlobStore, KvStore};
use crate::error::{CaptureError, CaptureResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: Value) -> CaptureResult<()> {
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> CaptureResult<Option<Value>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn delete(&self, key: &str) -> CaptureResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> CaptureResult<Vec<String>> {
        Ok(lock(&self.entries)
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.blobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> CaptureResult<()> {
        lock(&self.blobs).insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> CaptureResult<Option<Vec<u8>>> {
        Ok(lock(&self.blobs).get(key).cloned())
    }

    async fn delete(&self, key: &str) -> CaptureResult<()> {
        lock(&self.blobs).remove(key);
        Ok(())
    }
}

/// Maps keys to file names inside one directory.
///
/// Keys are base64url encoded so any key is a valid, reversible file name.
#[derive(Clone, Debug)]
struct KeyedDir {
    dir: PathBuf,
    extension: &'static str,
}

impl KeyedDir {
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", URL_SAFE_NO_PAD.encode(key), self.extension))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != self.extension {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let raw = URL_SAFE_NO_PAD.decode(stem).ok()?;
        String::from_utf8(raw).ok()
    }

    async fn read(&self, key: &str) -> CaptureResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CaptureError::io_at("read session entry", &path, e)),
        }
    }

    /// Write through a temporary file in the same directory, then rename.
    async fn write(&self, key: &str, bytes: Vec<u8>) -> CaptureResult<()> {
        let dir = self.dir.clone();
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || -> CaptureResult<()> {
            std::fs::create_dir_all(&dir)
                .map_err(|e| CaptureError::io_at("create session directory", &dir, e))?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .map_err(|e| CaptureError::io_at("create temporary entry", &dir, e))?;
            tmp.write_all(&bytes)
                .map_err(|e| CaptureError::io_at("write temporary entry", tmp.path(), e))?;
            tmp.persist(&path)
                .map_err(|e| CaptureError::io_at("persist session entry", &path, e.error))?;
            trace!(path = %path.display(), size = bytes.len(), "Persisted session entry");
            Ok(())
        })
        .await
        .map_err(|e| CaptureError::processing("write session entry", e.to_string()))?
    }

    async fn remove(&self, key: &str) -> CaptureResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaptureError::io_at("delete session entry", &path, e)),
        }
    }

    async fn list(&self, prefix: &str) -> CaptureResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CaptureError::io_at("list session entries", &self.dir, e)),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CaptureError::io_at("list session entries", &self.dir, e))?
        {
            if let Some(key) = self.key_for(&entry.path()) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

/// One JSON file per key.
#[derive(Clone, Debug)]
pub struct FsKvStore {
    files: KeyedDir,
}

impl FsKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            files: KeyedDir {
                dir: dir.into(),
                extension: "json",
            },
        }
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    async fn put(&self, key: &str, value: Value) -> CaptureResult<()> {
        let bytes = serde_json::to_vec_pretty(&value)?;
        self.files.write(key, bytes).await
    }

    async fn get(&self, key: &str) -> CaptureResult<Option<Value>> {
        match self.files.read(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> CaptureResult<()> {
        self.files.remove(key).await
    }

    async fn keys(&self, prefix: &str) -> CaptureResult<Vec<String>> {
        self.files.list(prefix).await
    }
}

/// One file per blob.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    files: KeyedDir,
}

impl FsBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            files: KeyedDir {
                dir: dir.into(),
                extension: "blob",
            },
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> CaptureResult<()> {
        self.files.write(key, bytes).await
    }

    async fn get(&self, key: &str) -> CaptureResult<Option<Vec<u8>>> {
        self.files.read(key).await
    }

    async fn delete(&self, key: &str) -> CaptureResult<()> {
        self.files.remove(key).await
    }
}
