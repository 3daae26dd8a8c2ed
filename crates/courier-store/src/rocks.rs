//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::codec;
use crate::error::{Result, StoreError};
use crate::schema::{all_column_families, cf, Collection, SCHEMA_VERSION, SCHEMA_VERSION_KEY};
use crate::{Precondition, Store, Versioned, WriteOp};

/// Number of lock stripes guarding check-and-write sequences.
const LOCK_STRIPES: usize = 64;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: Vec<Mutex<()>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// Missing column families are created, so a database written by an older
    /// schema opens without migration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the database cannot be opened or
    /// was written by a newer schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let store = Self {
            db: Arc::new(db),
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        };
        store.upgrade_schema()?;

        tracing::info!(path = %path.as_ref().display(), version = SCHEMA_VERSION, "record store opened");
        Ok(store)
    }

    /// Check the recorded schema version and bump it if older.
    fn upgrade_schema(&self) -> Result<()> {
        let meta = self
            .cf(cf::META)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let found = self
            .db
            .get_cf(&meta, SCHEMA_VERSION_KEY)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map(|bytes| {
                <[u8; 4]>::try_from(bytes.as_slice())
                    .map(u32::from_be_bytes)
                    .map_err(|_| StoreError::Unavailable("malformed schema version".to_string()))
            })
            .transpose()?;

        match found {
            Some(v) if v > SCHEMA_VERSION => Err(StoreError::Unavailable(format!(
                "database schema v{v} is newer than supported v{SCHEMA_VERSION}"
            ))),
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            previous => {
                self.db
                    .put_cf(&meta, SCHEMA_VERSION_KEY, SCHEMA_VERSION.to_be_bytes())
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                tracing::info!(from = ?previous, to = SCHEMA_VERSION, "schema version recorded");
                Ok(())
            }
        }
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Lock the stripe guarding a key.
    fn lock(&self, collection: Collection, key: &str) -> MutexGuard<'_, ()> {
        self.locks[codec::lock_stripe(collection.cf_name(), key, self.locks.len())].lock()
    }

    fn lock_pref(&self, key: &str) -> MutexGuard<'_, ()> {
        self.locks[codec::lock_stripe(cf::PREFS, key, self.locks.len())].lock()
    }

    fn read_pref(&self, cf: &Arc<BoundColumnFamily<'_>>, key: &str) -> Result<Option<String>> {
        self.db
            .get_cf(cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| String::from_utf8(data).map_err(|e| StoreError::Serialization(e.to_string())))
            .transpose()
    }

    /// Read the stored version of a key, if present.
    fn current_version(&self, cf: &Arc<BoundColumnFamily<'_>>, key: &str) -> Result<Option<u64>> {
        self.db
            .get_pinned_cf(cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|value| codec::decode_value(&value).map(|(version, _)| version))
            .transpose()
    }

    fn check(
        precondition: Precondition,
        current: Option<u64>,
        collection: Collection,
        key: &str,
    ) -> Result<()> {
        if precondition.holds(current) {
            Ok(())
        } else {
            tracing::debug!(%collection, key, ?precondition, ?current, "precondition failed");
            Err(StoreError::conflict(collection, key))
        }
    }
}

impl Store for RocksStore {
    fn get_raw(&self, collection: Collection, key: &str) -> Result<Option<Versioned<Vec<u8>>>> {
        let cf = self.cf(collection.cf_name())?;

        self.db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| {
                let (version, body) = codec::decode_value(&data)?;
                Ok(Versioned {
                    version,
                    value: body.to_vec(),
                })
            })
            .transpose()
    }

    fn put_raw(
        &self,
        collection: Collection,
        key: &str,
        body: &[u8],
        precondition: Precondition,
    ) -> Result<u64> {
        let cf = self.cf(collection.cf_name())?;
        let _guard = self.lock(collection, key);

        let current = self.current_version(&cf, key)?;
        Self::check(precondition, current, collection, key)?;

        let version = codec::next_version(current);
        self.db
            .put_cf(&cf, key.as_bytes(), codec::encode_value(version, body))
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(%collection, key, version, "record written");
        Ok(version)
    }

    fn delete_raw(
        &self,
        collection: Collection,
        key: &str,
        precondition: Precondition,
    ) -> Result<bool> {
        let cf = self.cf(collection.cf_name())?;
        let _guard = self.lock(collection, key);

        let current = self.current_version(&cf, key)?;
        Self::check(precondition, current, collection, key)?;

        if current.is_none() {
            return Ok(false);
        }

        self.db
            .delete_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(%collection, key, "record deleted");
        Ok(true)
    }

    fn list_raw(&self, collection: Collection) -> Result<Vec<(String, Versioned<Vec<u8>>)>> {
        let cf = self.cf(collection.cf_name())?;

        let mut records = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let key = String::from_utf8(key.into_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let (version, body) = codec::decode_value(&value)?;
            records.push((
                key,
                Versioned {
                    version,
                    value: body.to_vec(),
                },
            ));
        }

        Ok(records)
    }

    fn commit(&self, ops: Vec<WriteOp>) -> Result<()> {
        // Lock every involved stripe in ascending order so concurrent commits
        // cannot deadlock each other.
        let mut stripes: Vec<usize> = ops
            .iter()
            .map(|op| codec::lock_stripe(op.collection().cf_name(), op.key(), self.locks.len()))
            .collect();
        stripes.sort_unstable();
        stripes.dedup();
        let _guards: Vec<_> = stripes.iter().map(|&i| self.locks[i].lock()).collect();

        let mut batch = WriteBatch::default();

        for op in &ops {
            let collection = op.collection();
            let cf = self.cf(collection.cf_name())?;
            let current = self.current_version(&cf, op.key())?;

            match op {
                WriteOp::Put {
                    key,
                    body,
                    precondition,
                    ..
                } => {
                    Self::check(*precondition, current, collection, key)?;
                    let version = codec::next_version(current);
                    batch.put_cf(&cf, key.as_bytes(), codec::encode_value(version, body));
                }
                WriteOp::Delete {
                    key, precondition, ..
                } => {
                    Self::check(*precondition, current, collection, key)?;
                    batch.delete_cf(&cf, key.as_bytes());
                }
            }
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(writes = ops.len(), "batch committed");
        Ok(())
    }

    fn get_pref(&self, key: &str) -> Result<Option<String>> {
        let cf = self.cf(cf::PREFS)?;
        self.read_pref(&cf, key)
    }

    fn set_pref(&self, key: &str, value: &str) -> Result<()> {
        let cf = self.cf(cf::PREFS)?;
        let _guard = self.lock_pref(key);

        self.db
            .put_cf(&cf, key.as_bytes(), value.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn remove_pref(&self, key: &str) -> Result<()> {
        let cf = self.cf(cf::PREFS)?;
        let _guard = self.lock_pref(key);

        self.db
            .delete_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn swap_pref(&self, key: &str, expected: Option<&str>, value: Option<&str>) -> Result<bool> {
        let cf = self.cf(cf::PREFS)?;
        let _guard = self.lock_pref(key);

        let current = self.read_pref(&cf, key)?;
        if current.as_deref() != expected {
            tracing::debug!(key, "preference changed underneath, not swapped");
            return Ok(false);
        }

        match value {
            Some(value) => self.db.put_cf(&cf, key.as_bytes(), value.as_bytes()),
            None => self.db.delete_cf(&cf, key.as_bytes()),
        }
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Report, ReportStatus, User};
    use crate::RecordStore;
    use courier_core::{ReportId, UserId};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn create_test_user(uid: &str) -> User {
        User::new(UserId::new(uid).unwrap(), uid, uid.to_uppercase())
    }

    #[test]
    fn user_crud() {
        let (store, _dir) = create_test_store();
        let user = create_test_user("alice");

        // Create
        assert_eq!(store.insert(&user).unwrap(), 1);

        // Read
        let retrieved: User = store.get("alice").unwrap().unwrap();
        assert_eq!(retrieved.display_name, "ALICE");

        // Update
        let updated: User = store
            .update("alice", 3, |u: &mut User| -> Result<()> {
                u.balance += 10;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.balance, 10);
        assert_eq!(store.get_versioned::<User>("alice").unwrap().unwrap().version, 2);

        // Delete
        assert!(store.delete::<User>("alice").unwrap());
        assert!(store.get::<User>("alice").unwrap().is_none());
        assert!(!store.delete::<User>("alice").unwrap());
    }

    #[test]
    fn insert_rejects_existing_key() {
        let (store, _dir) = create_test_store();
        let user = create_test_user("alice");

        store.insert(&user).unwrap();
        let err = store.insert(&user).unwrap_err();
        assert!(matches!(err, StoreError::ConcurrentModification { .. }));
    }

    #[test]
    fn stale_version_write_is_rejected() {
        let (store, _dir) = create_test_store();
        let user = create_test_user("alice");
        store.put(&user).unwrap();

        let seen = store.get_versioned::<User>("alice").unwrap().unwrap();

        // Another writer gets there first.
        let mut other = seen.value.clone();
        other.balance = 50;
        store.put(&other).unwrap();

        let mut mine = seen.value;
        mine.balance = 1;
        let err = store
            .put_if(&mine, Precondition::Version(seen.version))
            .unwrap_err();
        assert!(matches!(err, StoreError::ConcurrentModification { .. }));

        let stored: User = store.get("alice").unwrap().unwrap();
        assert_eq!(stored.balance, 50);
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let (store, _dir) = create_test_store();

        let result = store.update("ghost", 3, |_: &mut User| -> Result<()> { Ok(()) });
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn concurrent_updates_do_not_lose_writes() {
        let (store, _dir) = create_test_store();
        store.put(&create_test_user("alice")).unwrap();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update("alice", 1_000, |u: &mut User| -> Result<()> {
                                u.balance += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let user: User = store.get("alice").unwrap().unwrap();
        assert_eq!(user.balance, 100);
    }

    #[test]
    fn list_returns_every_record() {
        let (store, _dir) = create_test_store();
        for uid in ["carol", "alice", "bob"] {
            store.put(&create_test_user(uid)).unwrap();
        }

        let users: Vec<User> = store.list().unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);

        // Other collections are unaffected.
        assert!(store.list::<Report>().unwrap().is_empty());
    }

    #[test]
    fn commit_is_all_or_nothing() {
        let (store, _dir) = create_test_store();
        store.put(&create_test_user("alice")).unwrap();

        let report = Report {
            id: ReportId::new("r1").unwrap(),
            reporter_id: UserId::new("alice").unwrap(),
            description: "spam".to_string(),
            timestamp: 0,
            status: ReportStatus::Pending,
        };

        // The user insert fails its precondition, so the report must not land.
        let ops = vec![
            WriteOp::put(&report, Precondition::Absent).unwrap(),
            WriteOp::put(&create_test_user("alice"), Precondition::Absent).unwrap(),
        ];
        assert!(matches!(
            store.commit(ops),
            Err(StoreError::ConcurrentModification { .. })
        ));
        assert!(store.get::<Report>("r1").unwrap().is_none());

        let ops = vec![
            WriteOp::put(&report, Precondition::Absent).unwrap(),
            WriteOp::delete::<User>("alice", Precondition::Version(1)),
        ];
        store.commit(ops).unwrap();
        assert!(store.get::<Report>("r1").unwrap().is_some());
        assert!(store.get::<User>("alice").unwrap().is_none());
    }

    #[test]
    fn prefs_roundtrip() {
        let (store, _dir) = create_test_store();

        assert!(store.get_pref("active").unwrap().is_none());
        store.set_pref("active", "alice").unwrap();
        assert_eq!(store.get_pref("active").unwrap().as_deref(), Some("alice"));
        store.remove_pref("active").unwrap();
        assert!(store.get_pref("active").unwrap().is_none());
    }

    #[test]
    fn swap_pref_only_replaces_the_expected_value() {
        let (store, _dir) = create_test_store();

        assert!(!store.swap_pref("list", Some("[]"), Some("[\"a\"]")).unwrap());
        assert!(store.get_pref("list").unwrap().is_none());

        assert!(store.swap_pref("list", None, Some("[\"a\"]")).unwrap());
        assert!(!store.swap_pref("list", None, Some("[\"b\"]")).unwrap());
        assert_eq!(store.get_pref("list").unwrap().as_deref(), Some("[\"a\"]"));

        assert!(store.swap_pref("list", Some("[\"a\"]"), None).unwrap());
        assert!(store.get_pref("list").unwrap().is_none());
    }

    #[test]
    fn concurrent_pref_swaps_do_not_lose_writes() {
        let (store, _dir) = create_test_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        loop {
                            let current = store.get_pref("counter").unwrap();
                            let next = current
                                .as_deref()
                                .map_or(0, |v| v.parse::<u32>().unwrap())
                                + 1;
                            let next = next.to_string();
                            if store
                                .swap_pref("counter", current.as_deref(), Some(&next))
                                .unwrap()
                            {
                                break;
                            }
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_pref("counter").unwrap().as_deref(), Some("200"));
    }

    #[test]
    fn reopen_preserves_records() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.put(&create_test_user("alice")).unwrap();
        }

        let store = RocksStore::open(dir.path()).unwrap();
        assert!(store.get::<User>("alice").unwrap().is_some());
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            let meta = store.cf(cf::META).unwrap();
            store
                .db
                .put_cf(&meta, SCHEMA_VERSION_KEY, (SCHEMA_VERSION + 1).to_be_bytes())
                .unwrap();
        }

        assert!(matches!(
            RocksStore::open(dir.path()),
            Err(StoreError::Unavailable(_))
        ));
    }
}
