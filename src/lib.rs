//! # dfs-index
//!
//! An ordered, multi-valued index (key → one or more opaque references) built
//! out of a remote storage substrate that only offers owner-signed mutable
//! records and immutable blobs.
//!
//! ## Features
//!
//! - **Prefix-compressed trie**: every node is one mutable record, addressed by
//!   the hash of the key prefix it represents and pointing at the node's
//!   encoding in the blob store, so a node's fanout is not bounded by the
//!   record size
//! - **Point operations**: put (replace or append), get, delete with branch
//!   pruning
//! - **Range queries**: seek, inclusive end bound and result limit over a
//!   resumable stack-based cursor
//! - **Numeric keys**: `Number` indexes store zero-padded 20 digit keys so that
//!   byte order equals numeric order
//! - **Batched bulk loads**: mutate an in-memory trie, then merge it into the
//!   stored one writing each touched node once
//!
//! ## Example
//!
//! ```rust
//! use dfs_index::{Index, IndexType, Owner, Storage, WriteMode};
//!
//! let owner = Owner::new("0xabc");
//! let mut index =
//!     Index::create(Storage::in_memory(), owner, "docs", "by_title", IndexType::String).unwrap();
//!
//! index.put("apple", b"ref-1".to_vec(), WriteMode::Replace).unwrap();
//! index.put("apricot", b"ref-2".to_vec(), WriteMode::Replace).unwrap();
//!
//! assert_eq!(index.get("apple").unwrap(), vec![b"ref-1".to_vec()]);
//!
//! let mut it = index.iter("ap", None, None).unwrap();
//! while it.advance().unwrap() {
//!     println!("{} -> {:?}", it.key(), it.value());
//! }
//! ```

#![warn(clippy::all)]

pub mod batch;
pub mod encoding;
pub mod error;
pub mod index;
pub mod iterator;
pub mod manifest;
pub mod session;
pub mod store;
mod trie;

pub use batch::Batch;
pub use error::{Error, Result};
pub use index::Index;
pub use iterator::IndexIterator;
pub use manifest::{Entry, EntryType, IndexType, Manifest};
pub use session::{IndexHandle, Session};
pub use store::{
    BlobStore, Feed, FeedStats, MemoryBlobStore, MemoryFeed, Owner, Storage, StoreError, Topic,
};

use serde::{Deserialize, Serialize};

/// How a put treats a key that already holds references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteMode {
    /// The key's reference list becomes the new single value.
    #[default]
    Replace,
    /// The new value is added after the existing ones.
    Append,
}

impl WriteMode {
    pub(crate) fn apply(self, refs: &mut Vec<Vec<u8>>, incoming: Vec<Vec<u8>>) {
        match self {
            WriteMode::Replace => *refs = incoming,
            WriteMode::Append => refs.extend(incoming),
        }
    }
}

/// Per-index settings a façade keeps next to its table metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Key family; decides key encoding.
    pub index_type: IndexType,
    /// Insertion mode used by [`Session::put_value`]; `Append` for
    /// multi-valued indexes.
    pub mode: WriteMode,
}

impl Config {
    pub fn new(index_type: IndexType) -> Self {
        Self {
            index_type,
            ..Self::default()
        }
    }

    /// Settings of a multi-valued index.
    pub fn multi_valued(index_type: IndexType) -> Self {
        Self {
            index_type,
            mode: WriteMode::Append,
        }
    }
}

#[cfg(test)]
mod proptests;
