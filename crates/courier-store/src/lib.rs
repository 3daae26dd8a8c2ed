//! `RocksDB` record store for courier.
//!
//! This crate provides the persistent record store behind the courier backend:
//! a set of named collections holding uniquely-keyed records, plus a small
//! string preference area used for local account bookkeeping.
//!
//! # Architecture
//!
//! Each [`Collection`] is a column family. Values carry a version header (see
//! [`codec`]) so that writes can be made conditional on what the writer last
//! read. Read-modify-write goes through [`RecordStore::update`], which retries
//! on [`StoreError::ConcurrentModification`] instead of silently losing the
//! other writer's update.
//!
//! Auxiliary column families:
//!
//! - `prefs`: local preference/flag storage (string keys and values)
//! - `meta`: store metadata, currently the schema version
//!
//! # Example
//!
//! ```no_run
//! use courier_core::UserId;
//! use courier_store::{RecordStore, RocksStore, User};
//!
//! let store = RocksStore::open("/tmp/courier-db").unwrap();
//!
//! let user = User::new(UserId::new("alice").unwrap(), "alice", "Alice");
//! store.insert(&user).unwrap();
//!
//! let loaded: Option<User> = store.get("alice").unwrap();
//! assert!(loaded.is_some());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod error;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;
pub use schema::Collection;
pub use types::{
    AdConfig, AlertLevel, CallKind, CallSession, CallStatus, Chat, ChatKind, ChatSnapshot,
    DeliveryStatus, DeviceSession, Edit, FrameMedia, Gift, Guest, JoinRequest, LiveStream,
    MediaKind, Message, MessageKind, Presence, Privacy, Reaction, Report, ReportStatus,
    SnapshotLine, Story, StoryFrame, StreamMessage, SystemAlert, ThemeMode, User, UsernameClaim,
    Visibility, STREAM_KEY,
};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A stored value together with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Version of the stored value; bumped on every write, starting at 1.
    pub version: u64,
    /// The value itself.
    pub value: T,
}

/// Condition a write requires of the currently stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Write unconditionally.
    Any,
    /// The key must not exist.
    Absent,
    /// The stored record must be at exactly this version.
    Version(u64),
}

impl Precondition {
    /// Whether a record at `current` (or absent, for `None`) satisfies this.
    #[must_use]
    pub const fn holds(self, current: Option<u64>) -> bool {
        match (self, current) {
            (Self::Any, _) | (Self::Absent, None) => true,
            (Self::Version(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// One write in an atomic [`Store::commit`] batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace a record.
    Put {
        /// Target collection.
        collection: Collection,
        /// Record key.
        key: String,
        /// Encoded record body (without version header).
        body: Vec<u8>,
        /// Required state of the stored record.
        precondition: Precondition,
    },
    /// Remove a record.
    Delete {
        /// Target collection.
        collection: Collection,
        /// Record key.
        key: String,
        /// Required state of the stored record.
        precondition: Precondition,
    },
}

impl WriteOp {
    /// Build a put of a typed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized.
    pub fn put<R: Record>(record: &R, precondition: Precondition) -> Result<Self> {
        Ok(Self::Put {
            collection: R::COLLECTION,
            key: record.key().to_string(),
            body: codec::serialize(record)?,
            precondition,
        })
    }

    /// Build a delete of a typed record.
    #[must_use]
    pub fn delete<R: Record>(key: &str, precondition: Precondition) -> Self {
        Self::Delete {
            collection: R::COLLECTION,
            key: key.to_string(),
            precondition,
        }
    }

    /// The collection this write targets.
    #[must_use]
    pub const fn collection(&self) -> Collection {
        match self {
            Self::Put { collection, .. } | Self::Delete { collection, .. } => *collection,
        }
    }

    /// The key this write targets.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

/// A record that lives in a collection.
pub trait Record: Serialize + DeserializeOwned {
    /// The collection holding records of this type.
    const COLLECTION: Collection;

    /// The unique key of this record within its collection.
    fn key(&self) -> &str;
}

/// The storage trait defining all raw database operations.
///
/// This trait abstracts the storage layer at the byte level so it stays object
/// safe; typed access is provided by [`RecordStore`].
pub trait Store: Send + Sync {
    /// Get a record body and its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_raw(&self, collection: Collection, key: &str) -> Result<Option<Versioned<Vec<u8>>>>;

    /// Insert or replace a record body, returning the new version.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrentModification` if the precondition fails.
    fn put_raw(
        &self,
        collection: Collection,
        key: &str,
        body: &[u8],
        precondition: Precondition,
    ) -> Result<u64>;

    /// Delete a record, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrentModification` if the precondition fails.
    fn delete_raw(&self, collection: Collection, key: &str, precondition: Precondition)
        -> Result<bool>;

    /// List every record in a collection, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_raw(&self, collection: Collection) -> Result<Vec<(String, Versioned<Vec<u8>>)>>;

    /// Apply several writes atomically.
    ///
    /// Either every precondition holds and every write lands, or nothing is
    /// written. Preconditions are checked against the state before the batch.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrentModification` if any precondition fails.
    fn commit(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Read a local preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_pref(&self, key: &str) -> Result<Option<String>>;

    /// Write a local preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn set_pref(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a local preference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn remove_pref(&self, key: &str) -> Result<()>;

    /// Replace a local preference only if it still holds `expected`.
    ///
    /// `None` on either side means the preference is absent: an `expected`
    /// of `None` requires it to be unset and a `value` of `None` removes it.
    /// Returns `false`, writing nothing, when the current value differs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn swap_pref(&self, key: &str, expected: Option<&str>, value: Option<&str>) -> Result<bool>;
}

/// Typed access to records on top of any [`Store`].
pub trait RecordStore: Store {
    /// Get a record by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    fn get<R: Record>(&self, key: &str) -> Result<Option<R>> {
        Ok(self.get_versioned::<R>(key)?.map(|v| v.value))
    }

    /// Get a record by key together with its version.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    fn get_versioned<R: Record>(&self, key: &str) -> Result<Option<Versioned<R>>> {
        self.get_raw(R::COLLECTION, key)?
            .map(|raw| {
                Ok(Versioned {
                    version: raw.version,
                    value: codec::deserialize(&raw.value)?,
                })
            })
            .transpose()
    }

    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put<R: Record>(&self, record: &R) -> Result<u64> {
        self.put_if(record, Precondition::Any)
    }

    /// Insert a record whose key must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrentModification` if the key already exists.
    fn insert<R: Record>(&self, record: &R) -> Result<u64> {
        self.put_if(record, Precondition::Absent)
    }

    /// Write a record under an explicit precondition.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConcurrentModification` if the precondition fails.
    fn put_if<R: Record>(&self, record: &R, precondition: Precondition) -> Result<u64> {
        let body = codec::serialize(record)?;
        self.put_raw(R::COLLECTION, record.key(), &body, precondition)
    }

    /// Delete a record, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete<R: Record>(&self, key: &str) -> Result<bool> {
        self.delete_raw(R::COLLECTION, key, Precondition::Any)
    }

    /// List every record of a type, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    fn list<R: Record>(&self) -> Result<Vec<R>> {
        self.list_raw(R::COLLECTION)?
            .into_iter()
            .map(|(_, raw)| codec::deserialize(&raw.value))
            .collect()
    }

    /// Read, mutate and conditionally write back a record.
    ///
    /// The write only lands if nobody else wrote the record since it was read;
    /// otherwise the whole cycle is retried, up to `attempts` times.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the record does not exist,
    /// `StoreError::ConcurrentModification` once attempts are exhausted, or
    /// whatever error `mutate` returns.
    fn update<R, E, F>(&self, key: &str, attempts: u32, mut mutate: F) -> std::result::Result<R, E>
    where
        R: Record,
        E: From<StoreError>,
        F: FnMut(&mut R) -> std::result::Result<(), E>,
    {
        for attempt in 1..=attempts.max(1) {
            let Versioned { version, mut value } = self
                .get_versioned::<R>(key)?
                .ok_or_else(|| StoreError::not_found(R::COLLECTION, key))?;

            mutate(&mut value)?;

            match self.put_if(&value, Precondition::Version(version)) {
                Ok(_) => return Ok(value),
                Err(StoreError::ConcurrentModification { .. }) => {
                    tracing::debug!(
                        collection = %R::COLLECTION,
                        key,
                        attempt,
                        "version conflict, retrying update"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::conflict(R::COLLECTION, key).into())
    }
}

impl<S: Store + ?Sized> RecordStore for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_semantics() {
        assert!(Precondition::Any.holds(None));
        assert!(Precondition::Any.holds(Some(3)));
        assert!(Precondition::Absent.holds(None));
        assert!(!Precondition::Absent.holds(Some(1)));
        assert!(Precondition::Version(2).holds(Some(2)));
        assert!(!Precondition::Version(2).holds(Some(3)));
        assert!(!Precondition::Version(2).holds(None));
    }
}
