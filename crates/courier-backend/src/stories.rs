//! Story collection.

use courier_core::{StoryId, UserId};
use courier_store::{Collection, RecordStore, Store, Story};

use crate::error::Result;
use crate::notify::Change;
use crate::service::Backend;

/// Handle to the story collection.
pub struct Stories<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Stories<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Publish or replace a story.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn add(&self, story: &Story) -> Result<()> {
        self.backend.store().put(story)?;
        tracing::debug!(story_id = %story.id, owner = %story.user_id, "saved story");
        self.backend.emit_record(story);
        Ok(())
    }

    /// Get a story by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get(&self, id: &StoryId) -> Result<Option<Story>> {
        Ok(self.backend.store().get(id.as_str())?)
    }

    /// Delete a story, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn delete(&self, id: &StoryId) -> Result<bool> {
        let existed = self.backend.store().delete::<Story>(id.as_str())?;
        if existed {
            self.backend.emit(Change::new(Collection::Stories, id.as_str()));
        }
        Ok(existed)
    }

    /// Every story, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list(&self) -> Result<Vec<Story>> {
        let mut stories = self.backend.store().list::<Story>()?;
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stories)
    }

    /// Stories that have not expired at `now`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list_active(&self, now: i64) -> Result<Vec<Story>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|story| !story.is_expired(now))
            .collect())
    }

    /// Active stories of one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list_for_user(&self, uid: &UserId, now: i64) -> Result<Vec<Story>> {
        Ok(self
            .list_active(now)?
            .into_iter()
            .filter(|story| story.user_id == *uid)
            .collect())
    }

    /// Mark a story as viewed.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such story.
    pub fn mark_seen(&self, id: &StoryId) -> Result<Story> {
        let story: Story = self.backend.store().update(
            id.as_str(),
            self.backend.attempts(),
            |story: &mut Story| -> Result<()> {
                story.seen = true;
                Ok(())
            },
        )?;
        self.backend.emit_record(&story);
        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::error::BackendError;
    use courier_store::RocksStore;

    fn setup() -> (Backend<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (Backend::with_defaults(store), dir)
    }

    fn story(id: &str, owner: &str, created_at: i64, expires_at: i64) -> Story {
        Story {
            id: StoryId::new(id).unwrap(),
            user_id: UserId::new(owner).unwrap(),
            username: owner.to_string(),
            avatar: String::new(),
            frames: Vec::new(),
            seen: false,
            created_at,
            expires_at,
        }
    }

    #[test]
    fn list_active_drops_expired_and_sorts_newest_first() {
        let (backend, _dir) = setup();
        let stories = backend.stories();
        stories.add(&story("old", "alice", 1, 50)).unwrap();
        stories.add(&story("mid", "bob", 2, 500)).unwrap();
        stories.add(&story("new", "alice", 3, 500)).unwrap();

        let ids: Vec<String> = stories
            .list_active(100)
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "mid"]);
        assert_eq!(stories.list().unwrap().len(), 3);

        let alice = UserId::new("alice").unwrap();
        assert_eq!(stories.list_for_user(&alice, 100).unwrap().len(), 1);
    }

    #[test]
    fn mark_seen_and_delete() {
        let (backend, _dir) = setup();
        let stories = backend.stories();
        let s = story("s1", "alice", 1, 500);
        stories.add(&s).unwrap();

        assert!(stories.mark_seen(&s.id).unwrap().seen);
        assert!(stories.delete(&s.id).unwrap());
        assert!(matches!(
            stories.mark_seen(&s.id).unwrap_err(),
            BackendError::RecordNotFound { .. }
        ));
    }
}
