//! Split/merge over trie nodes, written once for both node homes.
//!
//! Nodes are either remote (one record per node, addressed by the hash of the
//! node name) or in memory (owned through [`Entry::child`]). The decision tree
//! that keeps the trie prefix-compressed and sorted only sees [`NodeAccess`],
//! so [`Index`](crate::Index) puts and [`Batch`](crate::Batch) puts cannot drift
//! apart; merging a batch into the stored trie is the same walk again.

use std::cell::Cell;

use tracing::debug;

use crate::encoding::{common_prefix_len, first_byte};
use crate::error::{Error, Result};
use crate::manifest::{Entry, EntryType, Manifest};
use crate::store::{Owner, Storage, StoreError, Topic};
use crate::WriteMode;

/// Remote reads and writes of trie nodes for one owner.
///
/// A node's record holds the blob reference of its JSON encoding.
pub(crate) struct RemoteNodes<'a> {
    storage: &'a Storage,
    owner: &'a Owner,
    written: Cell<usize>,
}

impl<'a> RemoteNodes<'a> {
    pub(crate) fn new(storage: &'a Storage, owner: &'a Owner) -> Self {
        Self {
            storage,
            owner,
            written: Cell::new(0),
        }
    }

    /// Fetch a node; `None` if its record does not exist.
    pub(crate) fn load(&self, name: &str) -> Result<Option<Manifest>> {
        let topic = Topic::from_name(name);
        debug!(name, %topic, "reading manifest");
        let reference = match self.storage.feed().read_record(&topic, self.owner) {
            Ok((_, reference)) => reference,
            Err(StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let payload = self.storage.blobs().download_blob(&reference)?;
        Manifest::from_bytes(name, &payload).map(Some)
    }

    /// Upload the encoding of a node, returning the reference its record holds.
    fn upload(&self, node: &Manifest) -> Result<Vec<u8>> {
        let payload = node.to_bytes()?;
        self.storage
            .blobs()
            .upload_blob(&payload)
            .map_err(|e| Error::manifest_create(&node.name, e))
    }

    /// Write the first record of a node. Fails if the record exists.
    pub(crate) fn create(&self, node: &mut Manifest) -> Result<()> {
        let topic = Topic::from_name(&node.name);
        let reference = self.upload(node)?;
        debug!(name = %node.name, %topic, "creating manifest");
        self.storage
            .feed()
            .create_record(&topic, self.owner, &reference)
            .map_err(|e| Error::manifest_create(&node.name, e))?;
        node.dirty = false;
        self.written.set(self.written.get() + 1);
        Ok(())
    }

    /// Point the record of a node at its current encoding and mark it clean.
    pub(crate) fn persist(&self, node: &mut Manifest) -> Result<()> {
        let topic = Topic::from_name(&node.name);
        let reference = self.upload(node)?;
        debug!(name = %node.name, %topic, entries = node.entries.len(), "writing manifest");
        self.storage
            .feed()
            .update_record(&topic, self.owner, &reference)
            .map_err(|e| Error::manifest_create(&node.name, e))?;
        node.dirty = false;
        self.written.set(self.written.get() + 1);
        Ok(())
    }

    /// Persist every in-memory descendant of `node`, then `node` itself.
    fn persist_tree(&self, node: &mut Manifest) -> Result<()> {
        for entry in &mut node.entries {
            if let Some(mut child) = entry.child.take() {
                self.persist_tree(&mut child)?;
            }
        }
        self.persist(node)
    }

    /// Records written through this handle so far.
    pub(crate) fn written(&self) -> usize {
        self.written.get()
    }
}

/// Where the children of the nodes being mutated live.
pub(crate) enum NodeAccess<'a> {
    /// Children are remote records; changed nodes are written back.
    Remote(&'a RemoteNodes<'a>),
    /// Children hang off their entries; nothing is written.
    InMemory,
}

impl NodeAccess<'_> {
    /// Take the child behind an intermediate entry out for mutation.
    fn open_child(&self, parent_name: &str, entry: &mut Entry) -> Result<Manifest> {
        if let Some(child) = entry.child.take() {
            return Ok(*child);
        }
        let name = format!("{parent_name}{}", entry.name);
        match self {
            NodeAccess::Remote(nodes) => nodes.load(&name)?.ok_or(Error::NoManifestFound(name)),
            NodeAccess::InMemory => Err(Error::NoManifestFound(name)),
        }
    }

    /// Hand a child back to its edge, writing it if it changed.
    fn close_child(&self, entry: &mut Entry, mut child: Manifest) -> Result<()> {
        match self {
            NodeAccess::Remote(nodes) => {
                if child.dirty {
                    nodes.persist_tree(&mut child)?;
                }
                Ok(())
            }
            NodeAccess::InMemory => {
                entry.child = Some(Box::new(child));
                Ok(())
            }
        }
    }

    /// Prepare an edge that is about to be added to a node as-is.
    fn adopt(&self, entry: &mut Entry) -> Result<()> {
        match self {
            NodeAccess::Remote(nodes) => match entry.child.take() {
                Some(mut child) => nodes.persist_tree(&mut child),
                None => Ok(()),
            },
            NodeAccess::InMemory => Ok(()),
        }
    }

    /// Merge `entry` (named relative to `node`) into `node`.
    ///
    /// A leaf entry is an insert of one key. An intermediate entry brings a
    /// whole in-memory branch along, which is how a batch lands on the stored
    /// trie. `node` is marked dirty if its own entries change; changed
    /// descendants are closed (written or re-attached) before returning.
    pub(crate) fn merge_entry(
        &self,
        node: &mut Manifest,
        mut entry: Entry,
        mode: WriteMode,
    ) -> Result<()> {
        // An unnamed branch holds entries that already belong to `node`.
        if entry.entry_type == EntryType::Intermediate && entry.name.is_empty() {
            if let Some(child) = entry.child.take() {
                for inner in child.entries {
                    self.merge_entry(node, inner, mode)?;
                }
            }
            return Ok(());
        }

        for idx in 0..node.entries.len() {
            let existing = &node.entries[idx];

            if entry.name.is_empty() || existing.name.is_empty() {
                if entry.name.is_empty() && existing.name.is_empty() {
                    mode.apply(&mut node.entries[idx].refs, entry.refs);
                    node.mark_dirty();
                    return Ok(());
                }
                if entry.name.is_empty() {
                    break;
                }
                continue;
            }

            let shared = common_prefix_len(&existing.name, &entry.name);
            if shared == 0 {
                if first_byte(&existing.name) > first_byte(&entry.name) {
                    break;
                }
                continue;
            }
            return self.merge_at(node, idx, entry, shared, mode);
        }

        self.adopt(&mut entry)?;
        node.insert_entry(entry);
        Ok(())
    }

    /// `entry` shares `shared` leading bytes with `node.entries[idx]`.
    fn merge_at(
        &self,
        node: &mut Manifest,
        idx: usize,
        mut entry: Entry,
        shared: usize,
        mode: WriteMode,
    ) -> Result<()> {
        let existing = &node.entries[idx];
        let covers_existing = shared == existing.name.len();

        if covers_existing && existing.is_leaf() && entry.is_leaf() && shared == entry.name.len() {
            mode.apply(&mut node.entries[idx].refs, entry.refs);
            node.mark_dirty();
            return Ok(());
        }

        if covers_existing && !existing.is_leaf() {
            // The key runs into this branch.
            let mut child = self.open_child(&node.name, &mut node.entries[idx])?;
            entry.name.drain(..shared);
            self.merge_entry(&mut child, entry, mode)?;
            return self.close_child(&mut node.entries[idx], child);
        }

        // Fork: the shared prefix becomes a new node holding both sides.
        let prefix = existing.name[..shared].to_string();
        debug!(node = %node.name, %prefix, "splitting entry");
        let mut split = Manifest::new(format!("{}{}", node.name, prefix), node.index_type);
        let mut previous = std::mem::replace(&mut node.entries[idx], Entry::intermediate(prefix));
        previous.name.drain(..shared);
        entry.name.drain(..shared);
        split.entries.push(previous);
        self.merge_entry(&mut split, entry, mode)?;
        self.close_child(&mut node.entries[idx], split)?;
        node.mark_dirty();
        Ok(())
    }
}

/// Next step of a point lookup inside one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// `entries[idx]` is the leaf of the key.
    Leaf(usize),
    /// The key continues below the intermediate `entries[idx]`.
    Descend(usize),
    /// The key cannot be in this node.
    Missing,
}

/// Locate `key` (relative to `node`) among the entries of `node`.
///
/// Entries are sorted, so an entry whose first byte exceeds the key's ends the
/// search early.
pub(crate) fn locate(node: &Manifest, key: &str) -> Step {
    for (idx, entry) in node.entries.iter().enumerate() {
        if entry.is_leaf() {
            if entry.name == key {
                return Step::Leaf(idx);
            }
        } else if !entry.name.is_empty() && key.starts_with(entry.name.as_str()) {
            return Step::Descend(idx);
        }

        match (first_byte(&entry.name), first_byte(key)) {
            (Some(e), Some(k)) if e > k => return Step::Missing,
            (Some(_), None) => return Step::Missing,
            _ => {}
        }
    }
    Step::Missing
}
