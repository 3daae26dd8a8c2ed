//! Message collection.
//!
//! Sending a message and refreshing its chat's preview is one atomic
//! commit: the message lands together with the chat update, or not at all.
//! A message sent to a chat that does not exist yet creates the chat.

use std::sync::Arc;

use courier_core::{time, ChatId, MessageId, UserId};
use courier_store::{
    Chat, ChatKind, Collection, DeliveryStatus, Edit, Message, MessageKind, Precondition, Reaction,
    RecordStore, Store, StoreError, WriteOp,
};

use crate::error::{BackendError, Result};
use crate::notify::{Change, Subscription};
use crate::service::Backend;

/// Name given to chats created by a first message.
pub const SYNTHESIZED_CHAT_NAME: &str = "Chat";

/// Status line of chats created by a first message.
pub const SYNTHESIZED_CHAT_STATUS: &str = "Active";

/// Text shown in a chat list for a message.
///
/// Non-empty text wins; otherwise the content kind is named.
#[must_use]
pub fn preview_text(message: &Message) -> String {
    if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
        return text.to_string();
    }
    match (message.kind, message.media_kind) {
        (MessageKind::Voice, _) => "Voice Message".to_string(),
        (_, Some(media)) => media.label().to_string(),
        _ => "Media".to_string(),
    }
}

/// The chat record created when a message arrives for an unknown chat.
fn synthesized_chat(message: &Message, preview: String) -> Chat {
    let kind = if message.chat_id.is_private() {
        ChatKind::Private
    } else {
        ChatKind::Group
    };
    let mut chat = Chat::new(message.chat_id.clone(), SYNTHESIZED_CHAT_NAME, kind);
    chat.status = SYNTHESIZED_CHAT_STATUS.to_string();
    chat.last_message = Some(preview);
    chat.last_message_time = Some(message.local_timestamp);
    chat.unread_count = 1;
    chat
}

/// Handle to the message collection.
pub struct Messages<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Messages<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Store a message in `chat_id` and update the chat's preview.
    ///
    /// The store assigns the message timestamp. A pending message is marked
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::ConcurrentModification` if the chat kept
    /// changing underneath for every attempt.
    pub fn send(&self, chat_id: &ChatId, mut message: Message) -> Result<Message> {
        let store = self.backend.store();
        message.chat_id = chat_id.clone();
        message.timestamp = time::now_millis();
        if message.status == DeliveryStatus::Pending {
            message.status = DeliveryStatus::Sent;
        }
        let preview = preview_text(&message);

        for attempt in 1..=self.backend.attempts().max(1) {
            let (chat, precondition) = match store.get_versioned::<Chat>(chat_id.as_str())? {
                Some(stored) => {
                    let mut chat = stored.value;
                    chat.last_message = Some(preview.clone());
                    chat.last_message_time = Some(message.local_timestamp);
                    (chat, Precondition::Version(stored.version))
                }
                None => (synthesized_chat(&message, preview.clone()), Precondition::Absent),
            };

            let ops = vec![
                WriteOp::put(&message, Precondition::Any)?,
                WriteOp::put(&chat, precondition)?,
            ];
            match store.commit(ops) {
                Ok(()) => {
                    tracing::debug!(
                        chat_id = %chat_id,
                        message_id = %message.id,
                        created_chat = precondition == Precondition::Absent,
                        "sent message"
                    );
                    self.emit(&message);
                    self.backend.emit_record(&chat);
                    return Ok(message);
                }
                Err(StoreError::ConcurrentModification { .. }) => {
                    tracing::debug!(chat_id = %chat_id, attempt, "chat changed during send, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BackendError::ConcurrentModification {
            collection: Collection::Chats,
            key: chat_id.to_string(),
        })
    }

    /// Get a message by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get(&self, id: &MessageId) -> Result<Option<Message>> {
        Ok(self.backend.store().get(id.as_str())?)
    }

    /// Messages of a chat, oldest first.
    ///
    /// Ordered by store timestamp, then by author-local timestamp, then by
    /// id, so the order is total and stable.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .backend
            .store()
            .list::<Message>()?
            .into_iter()
            .filter(|m| m.chat_id == *chat_id)
            .collect();
        messages.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.local_timestamp.cmp(&b.local_timestamp))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(messages)
    }

    /// Remove a message for everyone, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn delete(&self, id: &MessageId) -> Result<bool> {
        let store = self.backend.store();
        let Some(message) = store.get::<Message>(id.as_str())? else {
            return Ok(false);
        };
        let existed = store.delete::<Message>(id.as_str())?;
        if existed {
            self.emit(&message);
        }
        Ok(existed)
    }

    /// Mark a message deleted without removing the record.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such message.
    pub fn soft_delete(&self, id: &MessageId) -> Result<Message> {
        self.update(id, |m| {
            m.is_deleted = true;
            Ok(())
        })
    }

    /// Replace the text of a message, keeping the previous text in its
    /// edit history.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such message.
    pub fn edit(&self, id: &MessageId, text: &str) -> Result<Message> {
        let now = time::now_millis();
        self.update(id, |m| {
            if let Some(previous) = m.text.take() {
                m.edit_history.push(Edit {
                    text: previous,
                    time: now,
                });
            }
            m.text = Some(text.to_string());
            Ok(())
        })
    }

    /// Toggle `uid`'s `emoji` reaction on a message.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such message.
    pub fn react(&self, id: &MessageId, uid: &UserId, emoji: &str) -> Result<Message> {
        self.update(id, |m| {
            match m.reactions.iter_mut().find(|r| r.emoji == emoji) {
                Some(reaction) => {
                    if let Some(pos) = reaction.user_ids.iter().position(|u| u == uid) {
                        reaction.user_ids.remove(pos);
                    } else {
                        reaction.user_ids.push(uid.clone());
                    }
                }
                None => m.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    user_ids: vec![uid.clone()],
                }),
            }
            m.reactions.retain(|r| !r.user_ids.is_empty());
            Ok(())
        })
    }

    /// Record that `uid` has seen a message.
    ///
    /// A message seen by anyone other than its sender is marked read.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such message.
    pub fn mark_seen(&self, id: &MessageId, uid: &UserId) -> Result<Message> {
        self.update(id, |m| {
            if m.sender_id != *uid && !m.seen_by.contains(uid) {
                m.seen_by.push(uid.clone());
                m.status = DeliveryStatus::Read;
            }
            Ok(())
        })
    }

    /// Observe the messages of a chat.
    ///
    /// `handler` is called right away with the current list, then again
    /// after every committed change to a message of that chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails; no handler is left
    /// registered in that case. Later load failures are logged.
    pub fn subscribe<F>(&self, chat_id: &ChatId, handler: F) -> Result<Subscription>
    where
        F: Fn(&[Message]) + Send + Sync + 'static,
        S: 'static,
    {
        let handler = Arc::new(handler);

        let backend = self.backend.clone();
        let watched = chat_id.clone();
        let on_change = Arc::clone(&handler);
        let subscription = self.backend.changes().subscribe(move |change| {
            if change.collection != Collection::Messages
                || change.parent.as_deref() != Some(watched.as_str())
            {
                return;
            }
            match backend.messages().list(&watched) {
                Ok(messages) => on_change(&messages),
                Err(e) => tracing::error!(error = %e, chat_id = %watched, "failed to reload messages"),
            }
        });

        let current = self.list(chat_id)?;
        handler(&current);
        Ok(subscription)
    }

    fn update<F>(&self, id: &MessageId, mutate: F) -> Result<Message>
    where
        F: FnMut(&mut Message) -> Result<()>,
    {
        let message: Message = self
            .backend
            .store()
            .update(id.as_str(), self.backend.attempts(), mutate)?;
        self.emit(&message);
        Ok(message)
    }

    fn emit(&self, message: &Message) {
        self.backend.emit(Change::scoped(
            Collection::Messages,
            message.id.as_str(),
            message.chat_id.as_str(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;
    use courier_store::{MediaKind, RocksStore};

    fn setup() -> (Backend<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (Backend::with_defaults(store), dir)
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn text(chat: &ChatId, body: &str, local: i64) -> Message {
        Message::text(chat.clone(), uid("alice"), "Alice", body, local)
    }

    #[test]
    fn preview_prefers_text_then_kind() {
        let chat = ChatId::new("c1").unwrap();
        assert_eq!(preview_text(&text(&chat, "hi", 1)), "hi");

        let mut voice = Message::new(chat.clone(), uid("a"), "A", MessageKind::Voice, 1);
        voice.text = Some(String::new());
        assert_eq!(preview_text(&voice), "Voice Message");

        let mut sticker = Message::new(chat.clone(), uid("a"), "A", MessageKind::Media, 1);
        sticker.media_kind = Some(MediaKind::Sticker);
        assert_eq!(preview_text(&sticker), "Sticker");

        let mut image = Message::new(chat.clone(), uid("a"), "A", MessageKind::Media, 1);
        image.media_kind = Some(MediaKind::Image);
        assert_eq!(preview_text(&image), "Image");

        let bare = Message::new(chat, uid("a"), "A", MessageKind::Media, 1);
        assert_eq!(preview_text(&bare), "Media");
    }

    #[test]
    fn send_updates_existing_chat_preview() {
        let (backend, _dir) = setup();
        let chat_id = ChatId::new("c1").unwrap();
        backend
            .chats()
            .create(&Chat::new(chat_id.clone(), "Team", ChatKind::Group))
            .unwrap();

        let sent = backend.messages().send(&chat_id, text(&chat_id, "hello", 42)).unwrap();
        assert!(sent.timestamp > 0);
        assert_eq!(sent.status, DeliveryStatus::Sent);

        let chat = backend.chats().require(&chat_id).unwrap();
        assert_eq!(chat.name, "Team");
        assert_eq!(chat.last_message.as_deref(), Some("hello"));
        assert_eq!(chat.last_message_time, Some(42));
    }

    #[test]
    fn send_to_unknown_chat_synthesizes_it() {
        let (backend, _dir) = setup();
        let chat_id = ChatId::private(&uid("alice"), &uid("bob"));

        backend.messages().send(&chat_id, text(&chat_id, "hey", 7)).unwrap();

        let chat = backend.chats().require(&chat_id).unwrap();
        assert_eq!(chat.name, SYNTHESIZED_CHAT_NAME);
        assert_eq!(chat.status, SYNTHESIZED_CHAT_STATUS);
        assert_eq!(chat.kind, ChatKind::Private);
        assert_eq!(chat.unread_count, 1);
        assert_eq!(chat.last_message.as_deref(), Some("hey"));

        let group_id = ChatId::new("lobby").unwrap();
        backend.messages().send(&group_id, text(&group_id, "yo", 8)).unwrap();
        assert_eq!(backend.chats().require(&group_id).unwrap().kind, ChatKind::Group);
    }

    #[test]
    fn list_is_ordered_and_scoped() {
        let (backend, _dir) = setup();
        let messages = backend.messages();
        let c1 = ChatId::new("c1").unwrap();
        let c2 = ChatId::new("c2").unwrap();

        for (i, body) in ["one", "two", "three"].into_iter().enumerate() {
            messages.send(&c1, text(&c1, body, i64::try_from(i).unwrap())).unwrap();
        }
        messages.send(&c2, text(&c2, "elsewhere", 0)).unwrap();

        let texts: Vec<String> = messages
            .list(&c1)
            .unwrap()
            .into_iter()
            .filter_map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn edit_keeps_history() {
        let (backend, _dir) = setup();
        let chat_id = ChatId::new("c1").unwrap();
        let sent = backend.messages().send(&chat_id, text(&chat_id, "helo", 1)).unwrap();

        let edited = backend.messages().edit(&sent.id, "hello").unwrap();
        assert_eq!(edited.text.as_deref(), Some("hello"));
        assert_eq!(edited.edit_history.len(), 1);
        assert_eq!(edited.edit_history[0].text, "helo");
    }

    #[test]
    fn reactions_toggle() {
        let (backend, _dir) = setup();
        let chat_id = ChatId::new("c1").unwrap();
        let sent = backend.messages().send(&chat_id, text(&chat_id, "hi", 1)).unwrap();
        let messages = backend.messages();

        let m = messages.react(&sent.id, &uid("bob"), "👍").unwrap();
        assert_eq!(m.reactions.len(), 1);
        let m = messages.react(&sent.id, &uid("carol"), "👍").unwrap();
        assert_eq!(m.reactions[0].user_ids.len(), 2);
        messages.react(&sent.id, &uid("bob"), "👍").unwrap();
        let m = messages.react(&sent.id, &uid("carol"), "👍").unwrap();
        assert!(m.reactions.is_empty());
    }

    #[test]
    fn seen_by_sender_does_not_mark_read() {
        let (backend, _dir) = setup();
        let chat_id = ChatId::new("c1").unwrap();
        let sent = backend.messages().send(&chat_id, text(&chat_id, "hi", 1)).unwrap();

        let m = backend.messages().mark_seen(&sent.id, &uid("alice")).unwrap();
        assert_eq!(m.status, DeliveryStatus::Sent);
        let m = backend.messages().mark_seen(&sent.id, &uid("bob")).unwrap();
        assert_eq!(m.status, DeliveryStatus::Read);
        assert_eq!(m.seen_by, vec![uid("bob")]);
    }

    #[test]
    fn soft_delete_keeps_record() {
        let (backend, _dir) = setup();
        let chat_id = ChatId::new("c1").unwrap();
        let sent = backend.messages().send(&chat_id, text(&chat_id, "oops", 1)).unwrap();

        backend.messages().soft_delete(&sent.id).unwrap();
        assert!(backend.messages().get(&sent.id).unwrap().unwrap().is_deleted);

        assert!(backend.messages().delete(&sent.id).unwrap());
        assert!(!backend.messages().delete(&sent.id).unwrap());
    }

    #[test]
    fn subscription_sees_only_its_chat() {
        let (backend, _dir) = setup();
        let c1 = ChatId::new("c1").unwrap();
        let c2 = ChatId::new("c2").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        let sub = backend
            .messages()
            .subscribe(&c1, move |messages| log.lock().push(messages.len()))
            .unwrap();

        backend.messages().send(&c1, text(&c1, "a", 1)).unwrap();
        backend.messages().send(&c2, text(&c2, "b", 1)).unwrap();
        backend.messages().send(&c1, text(&c1, "c", 2)).unwrap();
        drop(sub);
        backend.messages().send(&c1, text(&c1, "d", 3)).unwrap();

        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }
}
