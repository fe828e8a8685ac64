//! Remote blob store capability — backup/restore of the on-disk files.
//!
//! The store consumes this interface at exactly two points: construction
//! (hydrate local files from remote copies) and close (persist local files
//! remotely). It never touches the hot path, and the core carries zero
//! dependency on any concrete storage vendor — inject whatever implements
//! the trait.
//!
//! Blobs written by the store are LZ4-compressed (`compress_prepend_size`);
//! the payload is otherwise opaque to the backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::StoreError;

/// Opaque handle to one remote blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobHandle {
    locator: String,
}

impl BlobHandle {
    pub fn locator(&self) -> &str {
        &self.locator
    }
}

/// Minimal remote storage capability.
pub trait BlobStore: Send {
    /// Open a handle to the blob named by `locator`, creating an empty blob
    /// when none exists yet.
    fn open(&mut self, locator: &str) -> Result<BlobHandle, StoreError>;

    /// Replace the blob's contents.
    fn put(&mut self, handle: &BlobHandle, bytes: &[u8]) -> Result<(), StoreError>;

    /// Read `[start, end)`; `end` clamps to the blob length, so
    /// `get_range(h, 0, u64::MAX)` fetches the whole blob.
    fn get_range(&mut self, handle: &BlobHandle, start: u64, end: u64)
        -> Result<Vec<u8>, StoreError>;

    /// Release the handle.
    fn close(&mut self, handle: BlobHandle) -> Result<(), StoreError>;
}

/// In-memory blob store.
///
/// Reference implementation of the capability, shared between clones so a
/// test can hand one copy to a store and inspect the other after close.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw contents of a blob, if present.
    pub fn blob(&self, locator: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(locator).cloned())
    }

    /// Number of blobs held.
    pub fn blob_count(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.blobs
            .lock()
            .map_err(|_| StoreError::Io("blob store lock poisoned".into()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn open(&mut self, locator: &str) -> Result<BlobHandle, StoreError> {
        self.lock()?.entry(locator.to_string()).or_default();
        Ok(BlobHandle {
            locator: locator.to_string(),
        })
    }

    fn put(&mut self, handle: &BlobHandle, bytes: &[u8]) -> Result<(), StoreError> {
        self.lock()?.insert(handle.locator.clone(), bytes.to_vec());
        Ok(())
    }

    fn get_range(
        &mut self,
        handle: &BlobHandle,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, StoreError> {
        let blobs = self.lock()?;
        let blob = blobs
            .get(&handle.locator)
            .ok_or_else(|| StoreError::Io(format!("unknown blob: {}", handle.locator)))?;

        let len = blob.len() as u64;
        let start = start.min(len) as usize;
        let end = end.min(len) as usize;
        Ok(blob[start..end.max(start)].to_vec())
    }

    fn close(&mut self, _handle: BlobHandle) -> Result<(), StoreError> {
        Ok(())
    }
}
