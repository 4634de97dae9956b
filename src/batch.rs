//! Bulk loading through an in-memory trie.
//!
//! A [`Batch`] applies every put to a private trie whose children hang off
//! their entries, so no record is read or written until [`Batch::write`]. The
//! write then merges that trie into the stored one with the same split/merge
//! walk a single put uses, writing each changed node once.

use tracing::{debug, info};

use crate::error::Result;
use crate::index::Index;
use crate::manifest::{Entry, Manifest};
use crate::trie::NodeAccess;
use crate::WriteMode;

/// Puts accumulated against one [`Index`], created by [`Index::batch`].
///
/// Holds the index mutably, so nothing else writes to it until the batch is
/// written or dropped. Dropping a batch discards its puts.
#[derive(Debug)]
pub struct Batch<'a> {
    index: &'a mut Index,
    mode: WriteMode,
    root: Option<Manifest>,
    puts: usize,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(index: &'a mut Index, mode: WriteMode) -> Self {
        Self {
            index,
            mode,
            root: None,
            puts: 0,
        }
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Record `key -> value` in memory.
    pub fn put(&mut self, key: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        let key = self.index.encode(key)?;
        let index = &*self.index;
        let root = self
            .root
            .get_or_insert_with(|| Manifest::new(index.name(), index.index_type()));
        NodeAccess::InMemory.merge_entry(root, Entry::leaf(key, vec![value.into()]), self.mode)?;
        self.puts += 1;
        Ok(())
    }

    pub fn put_number(&mut self, key: i64, value: impl Into<Vec<u8>>) -> Result<()> {
        self.put(&key.to_string(), value)
    }

    /// Puts recorded so far, counting repeated keys each time.
    pub fn len(&self) -> usize {
        self.puts
    }

    pub fn is_empty(&self) -> bool {
        self.puts == 0
    }

    /// Merge the in-memory trie into the stored one.
    ///
    /// Returns the number of records written. A batch without puts writes
    /// nothing.
    pub fn write(self) -> Result<usize> {
        let Some(memory) = self.root else {
            debug!(index = %self.index.name(), "empty batch, nothing to write");
            return Ok(0);
        };

        let nodes = self.index.nodes();
        let access = NodeAccess::Remote(&nodes);
        let mut stored = self.index.root()?;
        for entry in memory.entries {
            access.merge_entry(&mut stored, entry, self.mode)?;
        }
        if stored.is_dirty() {
            nodes.persist(&mut stored)?;
        }

        info!(
            index = %self.index.name(),
            keys = self.puts,
            nodes_written = nodes.written(),
            "batch written"
        );
        Ok(nodes.written())
    }
}
