//! The remote-backed trie index.
//!
//! An [`Index`] owns the identity of one trie (`collection/index/`), which is
//! also the name of its root node. Every node is a [`Manifest`] uploaded as a
//! blob and pointed to by its own mutable record; point operations read the nodes on the key's path and
//! write back only the nodes whose entries changed, children before parents.

use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::encoding::{encode_key, encode_number};
use crate::error::{Error, Result};
use crate::iterator::IndexIterator;
use crate::manifest::{Entry, IndexType, Manifest};
use crate::store::{Owner, Storage, Topic};
use crate::trie::{locate, NodeAccess, RemoteNodes, Step};
use crate::WriteMode;

/// A prefix-compressed trie persisted node by node through a [`Storage`].
///
/// Mutations take `&mut self`: the trie assumes a single writer, and records
/// carry no version, so concurrent writers on one trie lose updates.
pub struct Index {
    storage: Storage,
    owner: Owner,
    name: String,
    index_type: IndexType,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("index_type", &self.index_type)
            .field("owner", &self.owner)
            .finish()
    }
}

impl Index {
    /// Root node name of the index `index` in `collection`.
    pub fn identity(collection: &str, index: &str) -> String {
        format!("{collection}/{index}/")
    }

    /// Create a new, empty index by writing its root record.
    ///
    /// Fails with [`Error::ManifestCreate`] if the root already exists.
    pub fn create(
        storage: Storage,
        owner: Owner,
        collection: &str,
        index: &str,
        index_type: IndexType,
    ) -> Result<Self> {
        if !owner.can_write() {
            warn!(collection, index, "refusing to create index without write credential");
            return Err(Error::ReadOnlyIndex);
        }
        let name = Self::identity(collection, index);
        let mut root = Manifest::new(name.clone(), index_type);
        RemoteNodes::new(&storage, &owner).create(&mut root)?;
        info!(%name, %index_type, "created index");
        Ok(Self {
            storage,
            owner,
            name,
            index_type,
        })
    }

    /// Open an existing index. Its type is read from the stored root.
    pub fn open(storage: Storage, owner: Owner, collection: &str, index: &str) -> Result<Self> {
        let name = Self::identity(collection, index);
        let root = RemoteNodes::new(&storage, &owner)
            .load(&name)?
            .ok_or_else(|| Error::NoManifestFound(name.clone()))?;
        debug!(%name, index_type = %root.index_type, "opened index");
        Ok(Self {
            index_type: root.index_type,
            storage,
            owner,
            name,
        })
    }

    /// Identity of this index, also the name of its root node.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn is_read_only(&self) -> bool {
        !self.owner.can_write()
    }

    pub(crate) fn nodes(&self) -> RemoteNodes<'_> {
        RemoteNodes::new(&self.storage, &self.owner)
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            warn!(name = %self.name, "write refused on read-only index");
            return Err(Error::ReadOnlyIndex);
        }
        Ok(())
    }

    /// Stored form of a caller key.
    pub(crate) fn encode(&self, key: &str) -> Result<String> {
        encode_key(self.index_type, key)
    }

    /// Load the root node. [`Error::NoManifestFound`] if it was never created.
    pub fn root(&self) -> Result<Manifest> {
        self.nodes()
            .load(&self.name)?
            .ok_or_else(|| Error::NoManifestFound(self.name.clone()))
    }

    /// Load any node of this trie by its full name.
    pub fn node(&self, name: &str) -> Result<Option<Manifest>> {
        self.nodes().load(name)
    }

    /// Insert or update `key`.
    ///
    /// With [`WriteMode::Append`] the value is added to the key's existing
    /// references; with [`WriteMode::Replace`] it becomes the only one.
    pub fn put(&mut self, key: &str, value: impl Into<Vec<u8>>, mode: WriteMode) -> Result<()> {
        self.check_writable()?;
        let key = self.encode(key)?;
        let nodes = self.nodes();
        let mut root = self.root()?;
        NodeAccess::Remote(&nodes).merge_entry(&mut root, Entry::leaf(key, vec![value.into()]), mode)?;
        if root.is_dirty() {
            nodes.persist(&mut root)?;
        }
        Ok(())
    }

    /// All references stored under `key`, oldest first.
    pub fn get(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        let key = self.encode(key)?;
        let nodes = self.nodes();
        let mut node = self.root()?;
        let mut offset = 0;
        loop {
            match locate(&node, &key[offset..]) {
                Step::Leaf(idx) => return Ok(node.entries.swap_remove(idx).refs),
                Step::Descend(idx) => {
                    let entry = &node.entries[idx];
                    offset += entry.name.len();
                    node = nodes.load(&node.child_name(entry))?.ok_or(Error::NotFound)?;
                }
                Step::Missing => return Err(Error::NotFound),
            }
        }
    }

    /// Remove `key`, returning the references it held.
    ///
    /// A branch left empty is unlinked from its parent; a branch left with a
    /// single entry is folded into the parent's edge so the trie stays
    /// prefix-compressed.
    pub fn delete(&mut self, key: &str) -> Result<Vec<Vec<u8>>> {
        self.check_writable()?;
        let key = self.encode(key)?;
        let nodes = self.nodes();

        // Descend to the leaf, keeping each node on the path and the edge taken.
        let mut path: Vec<(Manifest, usize)> = Vec::new();
        let mut node = self.root()?;
        let mut offset = 0;
        let removed = loop {
            match locate(&node, &key[offset..]) {
                Step::Leaf(idx) => break node.remove_entry(idx).refs,
                Step::Descend(idx) => {
                    let entry = &node.entries[idx];
                    offset += entry.name.len();
                    let child = nodes.load(&node.child_name(entry))?.ok_or(Error::NotFound)?;
                    path.push((std::mem::replace(&mut node, child), idx));
                }
                Step::Missing => return Err(Error::NotFound),
            }
        };

        while let Some((mut parent, idx)) = path.pop() {
            match node.entries.len() {
                0 => {
                    debug!(branch = %node.name, "pruning empty branch");
                    parent.remove_entry(idx);
                }
                1 => {
                    debug!(branch = %node.name, "folding single-entry branch into parent");
                    let mut only = node.entries.remove(0);
                    let edge = &mut parent.entries[idx];
                    only.name.insert_str(0, &edge.name);
                    *edge = only;
                    parent.mark_dirty();
                }
                _ => {
                    if node.is_dirty() {
                        nodes.persist(&mut node)?;
                    }
                }
            }
            node = parent;
        }
        if node.is_dirty() {
            nodes.persist(&mut node)?;
        }
        Ok(removed)
    }

    /// Drop every key by pointing the root record at an empty root.
    ///
    /// Former nodes stay behind in the store unreferenced.
    pub fn delete_index(&mut self) -> Result<()> {
        self.check_writable()?;
        let root = Manifest::new(self.name.clone(), self.index_type);
        let payload = root.to_bytes()?;
        self.storage
            .blobs()
            .upload_blob(&payload)
            .and_then(|reference| {
                self.storage
                    .feed()
                    .update_record(&Topic::from_name(&self.name), &self.owner, &reference)
            })
            .map_err(|source| Error::DeletingIndex {
                name: self.name.clone(),
                source,
            })?;
        info!(name = %self.name, "deleted index");
        Ok(())
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root()?.entries.is_empty())
    }

    /// Number of keys, by walking the whole trie.
    pub fn count(&self) -> Result<usize> {
        let mut it = self.iter("", None, None)?;
        let mut count = 0;
        while it.advance()? {
            count += 1;
        }
        Ok(count)
    }

    /// Iterate keys `>= start` (empty: from the first key) up to and including
    /// `end`, yielding at most `limit` results.
    ///
    /// Bounds are caller keys; on a `Number` index they must parse as integers.
    pub fn iter(
        &self,
        start: &str,
        end: Option<&str>,
        limit: Option<usize>,
    ) -> Result<IndexIterator<'_>> {
        let start = if start.is_empty() {
            String::new()
        } else {
            self.encode(start)?
        };
        let end = end.map(|e| self.encode(e)).transpose()?;
        IndexIterator::new(self, &start, end, limit)
    }

    /// Iterate a `Number` index over `start..=end`.
    ///
    /// Order is numeric for non-negative keys. Negative keys are stored with a
    /// leading `-` and zero padding, so they all come before `0` but among
    /// themselves in order of magnitude: `-5` before `-10`.
    pub fn int_iter(
        &self,
        start: i64,
        end: Option<i64>,
        limit: Option<usize>,
    ) -> Result<IndexIterator<'_>> {
        IndexIterator::new(self, &encode_number(start), end.map(encode_number), limit)
    }

    pub fn put_number(&mut self, key: i64, value: impl Into<Vec<u8>>, mode: WriteMode) -> Result<()> {
        self.put(&key.to_string(), value, mode)
    }

    pub fn get_number(&self, key: i64) -> Result<Vec<Vec<u8>>> {
        self.get(&key.to_string())
    }

    pub fn delete_number(&mut self, key: i64) -> Result<Vec<Vec<u8>>> {
        self.delete(&key.to_string())
    }

    /// Start an in-memory batch of puts against this index.
    pub fn batch(&mut self, mode: WriteMode) -> Result<Batch<'_>> {
        self.check_writable()?;
        Ok(Batch::new(self, mode))
    }
}
