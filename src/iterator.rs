//! Range iteration over an [`Index`].
//!
//! Traversal is depth-first over an explicit stack of `(node, cursor)` frames,
//! so each [`advance`](IndexIterator::advance) resumes where the previous one
//! stopped and reads at most the nodes it newly enters.

use smallvec::SmallVec;
use tracing::debug;

use crate::encoding::decode_number_key;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::manifest::Manifest;

/// A node being walked and the next entry to visit in it.
#[derive(Debug)]
struct Frame {
    node: Manifest,
    next: usize,
}

/// Forward-only cursor over the keys of an index, in ascending byte order.
///
/// Keys are reported in stored form; on a `Number` index use
/// [`int_key`](Self::int_key) to get the integer back.
#[derive(Debug)]
pub struct IndexIterator<'a> {
    index: &'a Index,
    /// Length of the index identity, stripped from node names.
    root_len: usize,
    stack: SmallVec<[Frame; 8]>,
    end: Option<String>,
    limit: Option<usize>,
    returned: usize,
    current: Option<(String, Vec<Vec<u8>>)>,
    done: bool,
}

impl<'a> IndexIterator<'a> {
    /// `start` and `end` are stored keys.
    pub(crate) fn new(
        index: &'a Index,
        start: &str,
        end: Option<String>,
        limit: Option<usize>,
    ) -> Result<Self> {
        let mut it = Self {
            index,
            root_len: index.name().len(),
            stack: SmallVec::new(),
            end,
            limit,
            returned: 0,
            current: None,
            done: false,
        };
        it.seek_stored(start)?;
        Ok(it)
    }

    /// Reposition before the first key `>= key` (a caller key).
    ///
    /// The root is read again; the end bound and the limit are kept, and keys
    /// already returned still count against the limit.
    pub fn seek(&mut self, key: &str) -> Result<()> {
        let key = if key.is_empty() {
            String::new()
        } else {
            self.index.encode(key)?
        };
        self.seek_stored(&key)
    }

    fn seek_stored(&mut self, key: &str) -> Result<()> {
        let nodes = self.index.nodes();
        let mut node = nodes
            .load(self.index.name())?
            .ok_or_else(|| Error::EmptyIndex(self.index.name().to_string()))?;
        self.stack.clear();
        self.current = None;
        self.done = false;

        let mut rest = key;
        loop {
            let mut descend = None;
            let mut resume = node.entries.len();
            for (idx, entry) in node.entries.iter().enumerate() {
                if !entry.is_leaf() && !entry.name.is_empty() && rest.starts_with(entry.name.as_str())
                {
                    descend = Some(idx);
                    break;
                }
                if entry.name.as_bytes() >= rest.as_bytes() {
                    resume = idx;
                    break;
                }
            }

            match descend {
                Some(idx) => {
                    let entry = &node.entries[idx];
                    let child_name = node.child_name(entry);
                    rest = &rest[entry.name.len()..];
                    let child = nodes
                        .load(&child_name)?
                        .ok_or(Error::NoManifestFound(child_name))?;
                    // Everything after this branch in the parent is still ahead.
                    self.stack.push(Frame {
                        node: std::mem::replace(&mut node, child),
                        next: idx + 1,
                    });
                }
                None => {
                    self.stack.push(Frame { node, next: resume });
                    break;
                }
            }
        }
        debug!(index = %self.index.name(), seek = key, depth = self.stack.len(), "iterator positioned");
        Ok(())
    }

    /// Move to the next key. Returns `false` once exhausted, past the end
    /// bound, or after `limit` keys; it keeps returning `false` afterwards.
    pub fn advance(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        if self.limit.is_some_and(|limit| self.returned >= limit) {
            return self.finish();
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return self.finish();
            };
            if frame.next >= frame.node.entries.len() {
                self.stack.pop();
                continue;
            }

            let entry = &frame.node.entries[frame.next];
            frame.next += 1;

            let mut key = String::with_capacity(frame.node.name.len() + entry.name.len());
            key.push_str(&frame.node.name[self.root_len..]);
            key.push_str(&entry.name);
            if self.end.as_deref().is_some_and(|end| key.as_str() > end) {
                return self.finish();
            }

            if entry.is_leaf() {
                self.current = Some((key, entry.refs.clone()));
                self.returned += 1;
                return Ok(true);
            }

            let child_name = frame.node.child_name(entry);
            match self.index.node(&child_name) {
                Ok(Some(child)) => self.stack.push(Frame { node: child, next: 0 }),
                Ok(None) => {
                    self.done = true;
                    return Err(Error::NoManifestFound(child_name));
                }
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }
    }

    fn finish(&mut self) -> Result<bool> {
        self.done = true;
        self.current = None;
        self.stack.clear();
        Ok(false)
    }

    /// Stored key of the current entry; empty before the first advance.
    pub fn key(&self) -> &str {
        self.current.as_ref().map_or("", |(key, _)| key.as_str())
    }

    /// Current key of a `Number` index.
    pub fn int_key(&self) -> Result<i64> {
        decode_number_key(self.key())
    }

    /// First reference of the current key.
    pub fn value(&self) -> Option<&[u8]> {
        self.values().first().map(Vec::as_slice)
    }

    /// Every reference of the current key, oldest first.
    pub fn values(&self) -> &[Vec<u8>] {
        match &self.current {
            Some((_, refs)) => refs,
            None => &[],
        }
    }

    /// Keys returned so far.
    pub fn returned(&self) -> usize {
        self.returned
    }
}

impl Iterator for IndexIterator<'_> {
    type Item = Result<(String, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => {
                let value = self.value().map(<[u8]>::to_vec).unwrap_or_default();
                Some(Ok((self.key().to_string(), value)))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
