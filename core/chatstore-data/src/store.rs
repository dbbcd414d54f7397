//! Device-local key-value port.
//!
//! The local source persists one blob per logical collection through this
//! trait, so it can run against a real directory or an in-memory double.

use crate::error::DataResult;
use async_trait::async_trait;
use chatstore_types::new_record_id;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// A string-keyed store of byte slots.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a slot. Returns `None` if it was never written.
    async fn read(&self, key: &str) -> DataResult<Option<Vec<u8>>>;

    /// Replaces the content of a slot.
    async fn write(&self, key: &str, bytes: Vec<u8>) -> DataResult<()>;

    /// Removes a slot. Removing a missing slot is not an error.
    async fn remove(&self, key: &str) -> DataResult<()>;
}

/// In-memory store. Clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of slots currently held.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Returns true if no slot has been written.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn read(&self, key: &str) -> DataResult<Option<Vec<u8>>> {
        Ok(self.slots.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: Vec<u8>) -> DataResult<()> {
        self.slots.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, key: &str) -> DataResult<()> {
        self.slots.write().await.remove(key);
        Ok(())
    }
}

/// File-backed store: one `<slot>.json` file per key under a root directory.
///
/// Writes stage into a uniquely named temp file and rename it into place,
/// so concurrent writes to one slot never observe a partial file.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> DataResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "opened file store");
        Ok(Self { root })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", slot_file_name(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn read(&self, key: &str) -> DataResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.slot_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, bytes: Vec<u8>) -> DataResult<()> {
        let path = self.slot_path(key);
        let tmp = path.with_extension(format!("json.{}.tmp", new_record_id()));
        let staged = match tokio::fs::write(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = staged {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> DataResult<()> {
        match tokio::fs::remove_file(self.slot_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Maps a slot key to a safe file name. Alphanumerics, `-` and `_` are kept;
/// every other byte is hex-escaped as `%XX`.
fn slot_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    if out.is_empty() {
        out.push_str("%00");
    }
    out
}
