//! Trie nodes and their wire format.
//!
//! A [`Manifest`] is one persisted trie node: the full key prefix it stands for
//! plus its sorted list of [`Entry`] edges. The JSON shape is
//!
//! ```text
//! { "name": string, "index_type": string, "creation_time": int64,
//!   "entries": [ { "name": string, "type": "L"|"I", "ref": [base64,...] }, ... ] }
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key family of an index; fixed at creation and decides key encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    #[default]
    String,
    Number,
    Bytes,
    Map,
    List,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexType::String => "string",
            IndexType::Number => "number",
            IndexType::Bytes => "bytes",
            IndexType::Map => "map",
            IndexType::List => "list",
        };
        f.write_str(name)
    }
}

/// Kind of trie edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    /// Terminal edge owning the references of one key.
    #[serde(rename = "L")]
    Leaf,
    /// Edge to a child manifest named `parent.name + entry.name`.
    #[serde(rename = "I")]
    Intermediate,
}

/// An edge of the trie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Key suffix relative to the owning manifest's name.
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Payload references of a leaf, oldest first. Empty for intermediates.
    #[serde(rename = "ref", with = "refs_base64", default)]
    pub refs: Vec<Vec<u8>>,
    /// Child held in memory instead of behind a remote record.
    #[serde(skip)]
    pub(crate) child: Option<Box<Manifest>>,
}

impl Entry {
    pub fn leaf(name: impl Into<String>, refs: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Leaf,
            refs,
            child: None,
        }
    }

    pub fn intermediate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Intermediate,
            refs: Vec::new(),
            child: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.entry_type == EntryType::Leaf
    }

    /// The in-memory child, if this edge carries one.
    pub fn child(&self) -> Option<&Manifest> {
        self.child.as_deref()
    }
}

/// A persisted trie node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Full key prefix of this node, starting with the index identity.
    pub name: String,
    pub index_type: IndexType,
    /// Epoch seconds, set once.
    pub creation_time: i64,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(skip)]
    pub(crate) dirty: bool,
}

impl Manifest {
    /// A new, empty node. It starts dirty since it was never written.
    pub fn new(name: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            name: name.into(),
            index_type,
            creation_time: now_epoch_secs(),
            entries: Vec::new(),
            dirty: true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Name of the child node behind `entry`.
    pub fn child_name(&self, entry: &Entry) -> String {
        let mut name = String::with_capacity(self.name.len() + entry.name.len());
        name.push_str(&self.name);
        name.push_str(&entry.name);
        name
    }

    /// Position at which an entry named `name` keeps the entries sorted.
    ///
    /// The empty name sorts first; every other name is ordered byte-wise, which
    /// for prefix-compressed siblings is the order of their first byte.
    pub fn insert_position(&self, name: &str) -> usize {
        self.entries
            .partition_point(|e| e.name.as_bytes() < name.as_bytes())
    }

    /// Insert an entry in sorted position and mark the node dirty.
    pub fn insert_entry(&mut self, entry: Entry) -> usize {
        let idx = self.insert_position(&entry.name);
        self.entries.insert(idx, entry);
        self.dirty = true;
        idx
    }

    /// Remove the entry at `idx` and mark the node dirty.
    pub fn remove_entry(&mut self, idx: usize) -> Entry {
        self.dirty = true;
        self.entries.remove(idx)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::manifest_create(&self.name, e))
    }

    /// Decode a record payload. `name` is only used for error context.
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| Error::ManifestUnmarshal {
            name: name.to_string(),
            source,
        })
    }
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Reference lists travel as arrays of base64 strings; `null` reads as empty.
mod refs_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(refs: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(refs.iter().map(|r| STANDARD.encode(r)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<Vec<String>> = Option::deserialize(deserializer)?;
        encoded
            .unwrap_or_default()
            .iter()
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}
