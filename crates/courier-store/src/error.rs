//! Error types for the record store.

use thiserror::Error;

use crate::schema::Collection;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened or upgraded.
    ///
    /// This is terminal for the session: nothing else will work.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The requested record was not found.
    #[error("record not found: {collection}/{key}")]
    NotFound {
        /// Collection that was searched.
        collection: Collection,
        /// Key that was missing.
        key: String,
    },

    /// A write precondition failed because the record changed underneath.
    #[error("concurrent modification of {collection}/{key}")]
    ConcurrentModification {
        /// Collection of the contended record.
        collection: Collection,
        /// Key of the contended record.
        key: String,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub(crate) fn not_found(collection: Collection, key: &str) -> Self {
        Self::NotFound {
            collection,
            key: key.to_string(),
        }
    }

    pub(crate) fn conflict(collection: Collection, key: &str) -> Self {
        Self::ConcurrentModification {
            collection,
            key: key.to_string(),
        }
    }
}
