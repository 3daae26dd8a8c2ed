//! Error types for the backend.
//!
//! Store failures are translated into the backend taxonomy so callers can
//! tell a missing record from a lost race or a dead database.

use courier_core::{CallId, IdError, UserId};
use courier_store::{CallStatus, Collection, StoreError};
use thiserror::Error;

/// A result type using `BackendError`.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur in backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The store could not be opened or upgraded.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The requested record does not exist.
    #[error("record not found: {collection}/{key}")]
    RecordNotFound {
        /// Collection that was searched.
        collection: Collection,
        /// Key that was missing.
        key: String,
    },

    /// A record with this key already exists.
    #[error("record already exists: {collection}/{key}")]
    AlreadyExists {
        /// Collection of the record.
        collection: Collection,
        /// Key of the record.
        key: String,
    },

    /// Another writer kept winning the race for this record.
    #[error("concurrent modification of {collection}/{key}")]
    ConcurrentModification {
        /// Collection of the contended record.
        collection: Collection,
        /// Key of the contended record.
        key: String,
    },

    /// The local account directory is full.
    #[error("account limit reached: at most {limit} local accounts")]
    CapacityExceeded {
        /// Maximum number of local accounts.
        limit: usize,
    },

    /// The account was never logged in on this device.
    #[error("account {0} is not registered on this device")]
    AccountNotRegistered(UserId),

    /// Another user already holds this username.
    #[error("username already taken: {0}")]
    UsernameTaken(String),

    /// The requested call status change is not allowed.
    #[error("invalid status change for call {call_id}: cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        /// The call being changed.
        call_id: CallId,
        /// The current status.
        from: CallStatus,
        /// The requested status.
        to: CallStatus,
    },

    /// The balance would drop below zero.
    #[error("insufficient balance for {uid}: have {balance}, need {amount}")]
    InsufficientBalance {
        /// The user being charged.
        uid: UserId,
        /// Current balance.
        balance: i64,
        /// Amount requested.
        amount: i64,
    },

    /// The stream host has closed the stream chat.
    #[error("stream chat is disabled")]
    StreamChatDisabled,

    /// An identifier was blank.
    #[error("invalid id: {0}")]
    InvalidId(#[from] IdError),

    /// Another writer kept changing a local preference.
    #[error("concurrent update of preference {key}")]
    PreferenceConflict {
        /// Preference key.
        key: &'static str,
    },

    /// Every numeric user id has been handed out.
    #[error("numeric user ids exhausted")]
    NumericIdExhausted,

    /// A stored preference could not be parsed.
    #[error("corrupt preference {key}: {reason}")]
    CorruptPreference {
        /// Preference key.
        key: &'static str,
        /// Parse failure.
        reason: String,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => Self::StorageUnavailable(reason),
            StoreError::NotFound { collection, key } => Self::RecordNotFound { collection, key },
            StoreError::ConcurrentModification { collection, key } => {
                Self::ConcurrentModification { collection, key }
            }
            other => Self::Store(other),
        }
    }
}

impl BackendError {
    pub(crate) fn not_found(collection: Collection, key: impl Into<String>) -> Self {
        Self::RecordNotFound {
            collection,
            key: key.into(),
        }
    }

    /// Returns true if nothing else will work for the rest of the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. }
                | Self::PreferenceConflict { .. }
                | Self::Store(StoreError::Database(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_backend_taxonomy() {
        let err: BackendError = StoreError::Unavailable("locked".to_string()).into();
        assert!(err.is_fatal());
        assert!(!err.is_retriable());

        let err: BackendError = StoreError::NotFound {
            collection: Collection::Chats,
            key: "c1".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            BackendError::RecordNotFound {
                collection: Collection::Chats,
                ..
            }
        ));

        let err: BackendError = StoreError::ConcurrentModification {
            collection: Collection::Users,
            key: "u1".to_string(),
        }
        .into();
        assert!(err.is_retriable());

        let err: BackendError = StoreError::Database("io".to_string()).into();
        assert!(matches!(err, BackendError::Store(_)));
        assert!(err.is_retriable());
    }

    #[test]
    fn undecodable_record_is_not_retriable() {
        let err: BackendError = StoreError::Serialization("bad cbor".to_string()).into();
        assert!(matches!(err, BackendError::Store(_)));
        assert!(!err.is_retriable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn domain_errors_are_neither_fatal_nor_retriable() {
        let err = BackendError::CapacityExceeded { limit: 3 };
        assert!(!err.is_fatal());
        assert!(!err.is_retriable());
        assert_eq!(
            err.to_string(),
            "account limit reached: at most 3 local accounts"
        );
    }
}
