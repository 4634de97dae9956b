//! Registry of open indexes for one owner.
//!
//! Each open index sits behind its own [`parking_lot::Mutex`], so a put,
//! delete or batch write holds exactly one exclusive lock for its table while
//! other tables stay available. The registry itself is a
//! [`parking_lot::RwLock`]. Creating or opening an index holds its write lock
//! across the root read or write, so two callers racing on one identity see
//! exactly one success; other remote calls run without it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::index::Index;
use crate::store::{BlobStore, Feed, Owner, Storage};
use crate::{Config, WriteMode};

/// Shared handle to an open index.
pub type IndexHandle = Arc<Mutex<Index>>;

struct OpenIndex {
    config: Config,
    handle: IndexHandle,
}

/// Open indexes of one owner plus the blob store their values live in.
pub struct Session {
    storage: Storage,
    owner: Owner,
    open: RwLock<HashMap<String, OpenIndex>>,
}

impl Session {
    pub fn new(feed: Arc<dyn Feed>, blobs: Arc<dyn BlobStore>, owner: Owner) -> Self {
        Self {
            storage: Storage::new(feed, blobs),
            owner,
            open: RwLock::new(HashMap::new()),
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    fn key(collection: &str, index: &str) -> Result<String> {
        for part in [collection, index] {
            if part.is_empty() || part.contains('/') {
                return Err(Error::InvalidName(part.to_string()));
            }
        }
        Ok(Index::identity(collection, index))
    }

    /// Check, build and register under one write lock, so the identity is
    /// claimed by at most one caller.
    fn register(
        &self,
        name: String,
        build: impl FnOnce() -> Result<(Index, Config)>,
    ) -> Result<IndexHandle> {
        let mut open = self.open.write();
        if open.contains_key(&name) {
            return Err(Error::TableAlreadyOpen(name));
        }
        let (index, config) = build()?;
        let handle = Arc::new(Mutex::new(index));
        open.insert(
            name,
            OpenIndex {
                config,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    fn lookup(&self, collection: &str, index: &str) -> Result<(Config, IndexHandle)> {
        let name = Self::key(collection, index)?;
        let open = self.open.read();
        let entry = open.get(&name).ok_or(Error::TableNotOpen(name))?;
        Ok((entry.config.clone(), entry.handle.clone()))
    }

    /// Create a new index and keep it open.
    pub fn create_index(&self, collection: &str, index: &str, config: Config) -> Result<IndexHandle> {
        let name = Self::key(collection, index)?;
        self.register(name, || {
            let created = Index::create(
                self.storage.clone(),
                self.owner.clone(),
                collection,
                index,
                config.index_type,
            )?;
            Ok((created, config))
        })
    }

    /// Open an existing index. Its type comes from the stored root; `mode` is
    /// what [`put_value`](Self::put_value) will use.
    pub fn open_index(&self, collection: &str, index: &str, mode: WriteMode) -> Result<IndexHandle> {
        let name = Self::key(collection, index)?;
        self.register(name.clone(), || {
            let opened = Index::open(self.storage.clone(), self.owner.clone(), collection, index)?;
            let config = Config {
                index_type: opened.index_type(),
                mode,
            };
            debug!(%name, "index opened in session");
            Ok((opened, config))
        })
    }

    /// Forget an open index. Handles already given out stay usable.
    pub fn close_index(&self, collection: &str, index: &str) -> Result<()> {
        let name = Self::key(collection, index)?;
        self.open
            .write()
            .remove(&name)
            .map(|_| ())
            .ok_or(Error::TableNotOpen(name))
    }

    /// Drop every key of an open index and close it.
    pub fn delete_index(&self, collection: &str, index: &str) -> Result<()> {
        let (_, handle) = self.lookup(collection, index)?;
        handle.lock().delete_index()?;
        self.close_index(collection, index)?;
        info!(collection, index, "index deleted from session");
        Ok(())
    }

    /// Handle to an open index.
    pub fn index(&self, collection: &str, index: &str) -> Result<IndexHandle> {
        self.lookup(collection, index).map(|(_, handle)| handle)
    }

    pub fn config(&self, collection: &str, index: &str) -> Result<Config> {
        self.lookup(collection, index).map(|(config, _)| config)
    }

    /// Identities of the open indexes, sorted.
    pub fn open_indexes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.open.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Store `value` as a blob and index its reference under `key`.
    pub fn put_value(&self, collection: &str, index: &str, key: &str, value: &[u8]) -> Result<()> {
        let (config, handle) = self.lookup(collection, index)?;
        let mut index = handle.lock();
        index.check_writable()?;
        let reference = self.storage.blobs().upload_blob(value)?;
        index.put(key, reference, config.mode)
    }

    /// Payloads of every reference stored under `key`, oldest first.
    pub fn get_values(&self, collection: &str, index: &str, key: &str) -> Result<Vec<Vec<u8>>> {
        let (_, handle) = self.lookup(collection, index)?;
        let refs = handle.lock().get(key)?;
        refs.iter()
            .map(|r| self.storage.blobs().download_blob(r).map_err(Error::from))
            .collect()
    }

    /// Remove `key`, returning the blob references it held.
    pub fn delete_value(&self, collection: &str, index: &str, key: &str) -> Result<Vec<Vec<u8>>> {
        let (_, handle) = self.lookup(collection, index)?;
        let removed = handle.lock().delete(key)?;
        Ok(removed)
    }
}
