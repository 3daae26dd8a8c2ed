//! Chat collection.

use courier_core::{ChatId, UserId};
use courier_store::{Chat, Collection, RecordStore, Store};

use crate::error::{BackendError, Result};
use crate::notify::Change;
use crate::service::Backend;

/// Handle to the chat collection.
pub struct Chats<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Chats<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Get a chat by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get(&self, id: &ChatId) -> Result<Option<Chat>> {
        Ok(self.backend.store().get(id.as_str())?)
    }

    /// Insert or replace a chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn create(&self, chat: &Chat) -> Result<()> {
        self.backend.store().put(chat)?;
        tracing::debug!(chat_id = %chat.id, kind = ?chat.kind, "saved chat");
        self.backend.emit_record(chat);
        Ok(())
    }

    /// Apply a change to a stored chat and notify.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such chat, or
    /// whatever `mutate` returns.
    pub fn update<F>(&self, id: &ChatId, mutate: F) -> Result<Chat>
    where
        F: FnMut(&mut Chat) -> Result<()>,
    {
        let chat: Chat = self
            .backend
            .store()
            .update(id.as_str(), self.backend.attempts(), mutate)?;
        self.backend.emit_record(&chat);
        Ok(chat)
    }

    /// Delete a chat, returning whether it existed.
    ///
    /// Messages of the chat are left in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn delete(&self, id: &ChatId) -> Result<bool> {
        let existed = self.backend.store().delete::<Chat>(id.as_str())?;
        if existed {
            self.backend.emit(Change::new(Collection::Chats, id.as_str()));
        }
        Ok(existed)
    }

    /// Find a group or channel by its public handle, case-insensitively.
    /// A leading `@` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get_by_group_username(&self, username: &str) -> Result<Option<Chat>> {
        let username = username.trim_start_matches('@');
        if username.is_empty() {
            return Ok(None);
        }
        Ok(self.backend.store().list::<Chat>()?.into_iter().find(|chat| {
            chat.group_username
                .as_deref()
                .is_some_and(|handle| handle.trim_start_matches('@').eq_ignore_ascii_case(username))
        }))
    }

    /// Chats shown in a user's chat list: pinned first, then most recent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list_for_user(&self, uid: &UserId) -> Result<Vec<Chat>> {
        let mut chats: Vec<Chat> = self
            .backend
            .store()
            .list::<Chat>()?
            .into_iter()
            .filter(|chat| chat.visible_to(uid))
            .collect();
        chats.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.last_message_time.unwrap_or(0).cmp(&a.last_message_time.unwrap_or(0)))
        });
        Ok(chats)
    }

    /// Set the pinned flag of a chat.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such chat.
    pub fn set_pinned(&self, id: &ChatId, pinned: bool) -> Result<Chat> {
        self.update(id, |chat| {
            chat.pinned = pinned;
            Ok(())
        })
    }

    /// Reset the unread counter of a chat.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such chat.
    pub fn mark_read(&self, id: &ChatId) -> Result<Chat> {
        self.update(id, |chat| {
            chat.unread_count = 0;
            Ok(())
        })
    }

    /// Get a chat that must exist.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such chat.
    pub fn require(&self, id: &ChatId) -> Result<Chat> {
        self.get(id)?
            .ok_or_else(|| BackendError::not_found(Collection::Chats, id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use courier_store::{ChatKind, RocksStore};

    fn setup() -> (Backend<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (Backend::with_defaults(store), dir)
    }

    fn chat_id(s: &str) -> ChatId {
        ChatId::new(s).unwrap()
    }

    #[test]
    fn create_get_delete() {
        let (backend, _dir) = setup();
        let chats = backend.chats();
        let chat = Chat::new(chat_id("news"), "News", ChatKind::Channel);

        chats.create(&chat).unwrap();
        assert_eq!(chats.get(&chat.id).unwrap(), Some(chat.clone()));

        assert!(chats.delete(&chat.id).unwrap());
        assert!(!chats.delete(&chat.id).unwrap());
        assert_eq!(chats.get(&chat.id).unwrap(), None);
    }

    #[test]
    fn update_of_missing_chat_is_not_found() {
        let (backend, _dir) = setup();
        let err = backend.chats().set_pinned(&chat_id("ghost"), true).unwrap_err();
        assert!(matches!(err, BackendError::RecordNotFound { .. }));
    }

    #[test]
    fn group_username_lookup_ignores_case_and_at() {
        let (backend, _dir) = setup();
        let mut chat = Chat::new(chat_id("g1"), "Rustaceans", ChatKind::Group);
        chat.group_username = Some("RustLang".to_string());
        backend.chats().create(&chat).unwrap();

        let found = backend.chats().get_by_group_username("@rustlang").unwrap();
        assert_eq!(found.map(|c| c.id), Some(chat_id("g1")));
        assert!(backend.chats().get_by_group_username("other").unwrap().is_none());
        assert!(backend.chats().get_by_group_username("@").unwrap().is_none());
    }

    #[test]
    fn list_for_user_filters_and_orders() {
        let (backend, _dir) = setup();
        let chats = backend.chats();
        let alice = UserId::new("alice").unwrap();
        let bob = UserId::new("bob").unwrap();
        let carol = UserId::new("carol").unwrap();

        let mut news = Chat::new(chat_id("news"), "News", ChatKind::Channel);
        news.last_message_time = Some(10);
        let mut dm = Chat::new(ChatId::private(&alice, &bob), "DM", ChatKind::Private);
        dm.last_message_time = Some(20);
        let other = Chat::new(ChatId::private(&bob, &carol), "Other", ChatKind::Private);
        let mut pinned = Chat::new(chat_id("team"), "Team", ChatKind::Group);
        pinned.admin_ids.push(alice.clone());
        pinned.pinned = true;

        for chat in [&news, &dm, &other, &pinned] {
            chats.create(chat).unwrap();
        }

        let ids: Vec<String> = chats
            .list_for_user(&alice)
            .unwrap()
            .into_iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, vec!["team".to_string(), dm.id.to_string(), "news".to_string()]);
    }
}
