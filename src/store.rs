//! Remote storage collaborators.
//!
//! The index never talks to the network itself. It is handed two capabilities:
//!
//! - [`Feed`]: owner-signed mutable records addressed by a [`Topic`]. Every trie
//!   node has exactly one record, repointed on each change.
//! - [`BlobStore`]: immutable content-addressed blobs. A node's encoding is
//!   uploaded here and its record holds only the blob reference, so node size
//!   is not bounded by the record size. Façades keep value payloads here too.
//!
//! [`Storage`] bundles the two for an [`Index`](crate::Index).
//!
//! [`MemoryFeed`] and [`MemoryBlobStore`] are complete in-process
//! implementations used by tests, benches and embedders without a network.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default payload bound of a single mutable record (one storage chunk).
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

/// Errors reported by storage collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record or blob at this address.
    #[error("record not found")]
    NotFound,

    /// `create_record` on a topic that already has a record.
    #[error("record already exists")]
    AlreadyExists,

    /// The payload exceeds what one record can hold.
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// The owner has no write credential.
    #[error("owner is not allowed to write")]
    Unauthorized,

    /// Transport or backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Address key of a mutable record: the SHA-256 of a manifest name.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic([u8; 32]);

impl Topic {
    /// Hash a manifest name into its record topic.
    pub fn from_name(name: &str) -> Self {
        Self(Sha256::digest(name.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({self})")
    }
}

/// Storage address returned by the feed for a written record.
pub type RecordAddress = [u8; 32];

/// The identity records are read and written as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    address: String,
    writable: bool,
}

impl Owner {
    /// An owner holding a write credential.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            writable: true,
        }
    }

    /// A view without a write credential, e.g. an imported shared index.
    pub fn read_only(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            writable: false,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn can_write(&self) -> bool {
        self.writable
    }
}

/// Owner-scoped mutable records.
///
/// Calls are blocking; timeouts and retries belong to the implementation.
pub trait Feed: Send + Sync {
    /// Create the first record under `topic`. Fails with
    /// [`StoreError::AlreadyExists`] if one is present.
    fn create_record(
        &self,
        topic: &Topic,
        owner: &Owner,
        payload: &[u8],
    ) -> Result<RecordAddress, StoreError>;

    /// Read the latest payload under `topic`.
    fn read_record(
        &self,
        topic: &Topic,
        owner: &Owner,
    ) -> Result<(RecordAddress, Vec<u8>), StoreError>;

    /// Overwrite the latest payload under `topic`, creating it if needed.
    fn update_record(
        &self,
        topic: &Topic,
        owner: &Owner,
        payload: &[u8],
    ) -> Result<RecordAddress, StoreError>;
}

/// Immutable content-addressed blobs.
pub trait BlobStore: Send + Sync {
    fn upload_blob(&self, data: &[u8]) -> Result<Vec<u8>, StoreError>;

    fn download_blob(&self, reference: &[u8]) -> Result<Vec<u8>, StoreError>;
}

/// The record feed and blob store an index persists its nodes through.
#[derive(Clone)]
pub struct Storage {
    feed: Arc<dyn Feed>,
    blobs: Arc<dyn BlobStore>,
}

impl Storage {
    pub fn new(feed: Arc<dyn Feed>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { feed, blobs }
    }

    /// A fresh [`MemoryFeed`] with the default record bound and a
    /// [`MemoryBlobStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryFeed::new()), Arc::new(MemoryBlobStore::new()))
    }

    pub fn feed(&self) -> &dyn Feed {
        &*self.feed
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        &*self.blobs
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// Counters of remote operations, used to reason about write amplification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub reads: usize,
    pub writes: usize,
}

/// In-process [`Feed`] keyed by `(owner, topic)`.
#[derive(Debug)]
pub struct MemoryFeed {
    records: RwLock<HashMap<(String, Topic), Vec<u8>>>,
    max_payload: usize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a feed whose records hold at most `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_payload,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Number of records currently held, across all owners.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop one record. Returns whether it existed.
    pub fn remove_record(&self, topic: &Topic, owner: &Owner) -> bool {
        self.records
            .write()
            .remove(&(owner.address().to_string(), *topic))
            .is_some()
    }

    /// Drop every record, leaving the counters untouched.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    fn address(owner: &Owner, topic: &Topic) -> RecordAddress {
        let mut hasher = Sha256::new();
        hasher.update(owner.address().as_bytes());
        hasher.update(topic.as_bytes());
        hasher.finalize().into()
    }

    fn check_write(&self, owner: &Owner, payload: &[u8]) -> Result<(), StoreError> {
        if !owner.can_write() {
            return Err(StoreError::Unauthorized);
        }
        if payload.len() > self.max_payload {
            return Err(StoreError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }
        Ok(())
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Feed for MemoryFeed {
    fn create_record(
        &self,
        topic: &Topic,
        owner: &Owner,
        payload: &[u8],
    ) -> Result<RecordAddress, StoreError> {
        self.check_write(owner, payload)?;
        let mut records = self.records.write();
        let key = (owner.address().to_string(), *topic);
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }
        records.insert(key, payload.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(Self::address(owner, topic))
    }

    fn read_record(
        &self,
        topic: &Topic,
        owner: &Owner,
    ) -> Result<(RecordAddress, Vec<u8>), StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let records = self.records.read();
        records
            .get(&(owner.address().to_string(), *topic))
            .map(|payload| (Self::address(owner, topic), payload.clone()))
            .ok_or(StoreError::NotFound)
    }

    fn update_record(
        &self,
        topic: &Topic,
        owner: &Owner,
        payload: &[u8],
    ) -> Result<RecordAddress, StoreError> {
        self.check_write(owner, payload)?;
        self.records
            .write()
            .insert((owner.address().to_string(), *topic), payload.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(Self::address(owner, topic))
    }
}

/// In-process [`BlobStore`]; references are SHA-256 digests of the content.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload_blob(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        let reference = Sha256::digest(data).to_vec();
        self.blobs
            .write()
            .entry(reference.clone())
            .or_insert_with(|| data.to_vec());
        Ok(reference)
    }

    fn download_blob(&self, reference: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .get(reference)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}
