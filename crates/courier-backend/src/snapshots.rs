//! Chat snapshots.
//!
//! A snapshot is a time-boxed export of a chat's messages. Expired snapshots
//! are invisible to [`Snapshots::list`] right away and are physically removed
//! by [`Snapshots::prune_expired`], a maintenance pass the caller runs and
//! awaits (see `courierd`).

use courier_core::{time, ChatId, SnapshotId};
use courier_store::{
    codec, ChatSnapshot, Collection, Precondition, RecordStore, SnapshotLine, Store, StoreError,
    Versioned,
};

use crate::error::{BackendError, Result};
use crate::messages::{preview_text, SYNTHESIZED_CHAT_NAME};
use crate::notify::Change;
use crate::service::Backend;

/// Outcome of one pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Snapshots that were deleted.
    pub removed: Vec<SnapshotId>,
    /// Snapshots that could not be deleted, with the last error.
    pub failed: Vec<(SnapshotId, String)>,
}

impl PruneReport {
    /// Returns true if nothing was expired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Handle to chat snapshots.
pub struct Snapshots<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Snapshots<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Store a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn add(&self, snapshot: &ChatSnapshot) -> Result<()> {
        self.backend.store().put(snapshot)?;
        tracing::debug!(
            snapshot_id = %snapshot.id,
            chat_id = %snapshot.chat_id,
            lines = snapshot.messages.len(),
            "saved snapshot"
        );
        self.backend.emit_record(snapshot);
        Ok(())
    }

    /// Export the current messages of a chat.
    ///
    /// Deleted messages are left out. The snapshot lives for `ttl_seconds`,
    /// or the configured default when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn capture(&self, chat_id: &ChatId, ttl_seconds: Option<u64>) -> Result<ChatSnapshot> {
        let chat_name = self
            .backend
            .chats()
            .get(chat_id)?
            .map_or_else(|| SYNTHESIZED_CHAT_NAME.to_string(), |chat| chat.name);

        let messages = self
            .backend
            .messages()
            .list(chat_id)?
            .into_iter()
            .filter(|m| !m.is_deleted)
            .map(|m| SnapshotLine {
                text: preview_text(&m),
                time: time::clock_label(m.local_timestamp).unwrap_or_default(),
                sender: m.sender_name,
            })
            .collect();

        let now = time::now_millis();
        let ttl = ttl_seconds.unwrap_or(self.backend.config().snapshot_ttl_seconds);
        let snapshot = ChatSnapshot {
            id: SnapshotId::generate(),
            chat_id: chat_id.clone(),
            chat_name,
            timestamp: now,
            messages,
            expires_at: time::add_seconds(now, ttl),
        };
        self.add(&snapshot)?;
        Ok(snapshot)
    }

    /// Get a snapshot by id, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get(&self, id: &SnapshotId) -> Result<Option<ChatSnapshot>> {
        Ok(self.backend.store().get(id.as_str())?)
    }

    /// Snapshots that have not expired at `now`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list(&self, now: i64) -> Result<Vec<ChatSnapshot>> {
        let mut snapshots: Vec<ChatSnapshot> = self
            .backend
            .store()
            .list::<ChatSnapshot>()?
            .into_iter()
            .filter(|s| !s.is_expired(now))
            .collect();
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    /// Delete every snapshot that has expired at `now`.
    ///
    /// Each delete is tried up to `prune_retries + 1` times; snapshots that
    /// still fail are reported and picked up again by the next pass. A
    /// snapshot written again after it was listed is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the expired snapshots cannot be listed, or
    /// `BackendError::StorageUnavailable` as soon as a delete hits it.
    pub fn prune_expired(&self, now: i64) -> Result<PruneReport> {
        let store = self.backend.store();
        let retries = self.backend.config().prune_retries;
        let mut report = PruneReport::default();

        let mut expired = Vec::new();
        for (_, Versioned { version, value }) in store.list_raw(Collection::Snapshots)? {
            let snapshot: ChatSnapshot = codec::deserialize(&value)?;
            if snapshot.is_expired(now) {
                expired.push((snapshot, version));
            }
        }

        for (snapshot, version) in expired {
            let mut last_error = None;
            let mut changed = false;
            for attempt in 0..=retries {
                match store.delete_raw(
                    Collection::Snapshots,
                    snapshot.id.as_str(),
                    Precondition::Version(version),
                ) {
                    Ok(_) => {
                        last_error = None;
                        break;
                    }
                    Err(StoreError::ConcurrentModification { .. }) => {
                        // Re-saved or removed since it was listed
                        tracing::debug!(snapshot_id = %snapshot.id, "snapshot changed, skipped");
                        changed = true;
                        break;
                    }
                    Err(e) => {
                        let e = BackendError::from(e);
                        if e.is_fatal() {
                            return Err(e);
                        }
                        tracing::warn!(
                            snapshot_id = %snapshot.id,
                            attempt,
                            error = %e,
                            "snapshot delete failed"
                        );
                        last_error = Some(e.to_string());
                    }
                }
            }

            match last_error {
                _ if changed => {}
                None => {
                    self.backend
                        .emit(Change::new(Collection::Snapshots, snapshot.id.as_str()));
                    report.removed.push(snapshot.id);
                }
                Some(error) => report.failed.push((snapshot.id, error)),
            }
        }

        if !report.is_empty() {
            tracing::info!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                "pruned expired snapshots"
            );
        }
        Ok(report)
    }
}
