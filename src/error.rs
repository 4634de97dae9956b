//! Error types for index operations.

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Index`](crate::Index), [`IndexIterator`](crate::IndexIterator),
/// [`Batch`](crate::Batch) and [`Session`](crate::Session).
#[derive(Error, Debug)]
pub enum Error {
    /// The key is absent. Part of normal control flow.
    #[error("key not found")]
    NotFound,

    /// The root record of an index does not exist: the trie was never created.
    #[error("no manifest found for index {0}")]
    NoManifestFound(String),

    /// A non-integer key was supplied to a `Number` index.
    #[error("key is not a number: {0:?}")]
    KeyNotANumber(String),

    /// A write was attempted by an owner without a write credential.
    #[error("index is read-only")]
    ReadOnlyIndex,

    /// A stored manifest could not be decoded.
    #[error("could not decode manifest {name}: {source}")]
    ManifestUnmarshal {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A manifest could not be encoded or written.
    #[error("could not persist manifest {name}: {source}")]
    ManifestCreate {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Blanking the root record failed.
    #[error("could not delete index {name}: {source}")]
    DeletingIndex {
        name: String,
        #[source]
        source: StoreError,
    },

    /// An iterator was opened over an index with no root record.
    #[error("index {0} is empty")]
    EmptyIndex(String),

    /// The session has no open index under this name.
    #[error("index {0} is not open")]
    TableNotOpen(String),

    /// The session already holds an open index under this name.
    #[error("index {0} is already open")]
    TableAlreadyOpen(String),

    /// Collection and index names must be non-empty and free of `/`.
    #[error("invalid collection or index name: {0:?}")]
    InvalidName(String),

    /// Any other collaborator failure, passed through verbatim.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub(crate) fn manifest_create(
        name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::ManifestCreate {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Whether this is the expected "key absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}
