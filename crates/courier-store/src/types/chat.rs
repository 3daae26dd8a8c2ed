use courier_core::{ChatId, MessageId, UserId};
use serde::{Deserialize, Serialize};

use crate::schema::Collection;
use crate::Record;

/// Kind of chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// Two participants, membership encoded in the chat id.
    Private,
    /// Many participants, administered by `admin_ids`.
    Group,
    /// Broadcast chat, visible to everyone.
    Channel,
}

/// A chat record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Unique identifier for the chat.
    pub id: ChatId,
    /// Display name.
    pub name: String,
    /// Status line shown under the name.
    pub status: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: String,
    /// Kind of chat.
    pub kind: ChatKind,
    /// Public handle for deep links.
    #[serde(default)]
    pub group_username: Option<String>,
    /// Preview of the latest message.
    #[serde(default)]
    pub last_message: Option<String>,
    /// Author-local timestamp of the latest message.
    #[serde(default)]
    pub last_message_time: Option<i64>,
    /// Unread counter.
    #[serde(default)]
    pub unread_count: u32,
    /// Pinned to the top of the list.
    #[serde(default)]
    pub pinned: bool,
    /// Minimum delay between messages of one member.
    #[serde(default)]
    pub slow_mode_seconds: Option<u32>,
    /// Administrators of a group or channel.
    #[serde(default)]
    pub admin_ids: Vec<UserId>,
    /// Avatar of the other participant of a private chat.
    #[serde(default)]
    pub peer_avatar: Option<String>,
}

impl Chat {
    /// Create an empty chat.
    #[must_use]
    pub fn new(id: ChatId, name: impl Into<String>, kind: ChatKind) -> Self {
        Self {
            id,
            name: name.into(),
            status: String::new(),
            avatar: String::new(),
            kind,
            group_username: None,
            last_message: None,
            last_message_time: None,
            unread_count: 0,
            pinned: false,
            slow_mode_seconds: None,
            admin_ids: Vec::new(),
            peer_avatar: None,
        }
    }

    /// Whether the chat shows up in the user's chat list.
    ///
    /// Channels are public, groups are listed for their administrators and
    /// private chats for the two participants.
    #[must_use]
    pub fn visible_to(&self, uid: &UserId) -> bool {
        match self.kind {
            ChatKind::Channel => true,
            ChatKind::Group => self.admin_ids.contains(uid),
            ChatKind::Private => self.id.involves(uid),
        }
    }
}

impl Record for Chat {
    const COLLECTION: Collection = Collection::Chats;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Kind of message content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Voice recording.
    Voice,
    /// Generated by the system.
    System,
    /// Attachment; see `media_kind`.
    Media,
}

/// Kind of attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Arbitrary file.
    File,
    /// Sticker.
    Sticker,
}

impl MediaKind {
    /// Capitalized label, as shown in chat previews.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Video => "Video",
            Self::File => "File",
            Self::Sticker => "Sticker",
        }
    }
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Not yet stored.
    #[default]
    Pending,
    /// Stored.
    Sent,
    /// Seen by the recipient.
    Read,
    /// Could not be delivered.
    Failed,
}

/// A reaction and the users who added it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Reaction emoji.
    pub emoji: String,
    /// Users who reacted with it.
    pub user_ids: Vec<UserId>,
}

/// A previous text of an edited message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// Text before the edit.
    pub text: String,
    /// When the edit happened.
    pub time: i64,
}

/// A message record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message.
    pub id: MessageId,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Author.
    pub sender_id: UserId,
    /// Author name at send time.
    pub sender_name: String,
    /// Text content.
    #[serde(default)]
    pub text: Option<String>,
    /// Voice recording URL.
    #[serde(default)]
    pub audio: Option<String>,
    /// Attachment URL.
    #[serde(default)]
    pub media_url: Option<String>,
    /// Attachment kind.
    #[serde(default)]
    pub media_kind: Option<MediaKind>,
    /// Content kind.
    pub kind: MessageKind,
    /// Delivery state.
    #[serde(default)]
    pub status: DeliveryStatus,
    /// Message this one replies to.
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    /// Original author of a forwarded message.
    #[serde(default)]
    pub forwarded_from: Option<UserId>,
    /// Whether the message was forwarded.
    #[serde(default)]
    pub is_forwarded: bool,
    /// Whether the forward attribution is hidden.
    #[serde(default)]
    pub forward_hidden: bool,
    /// Store-assigned timestamp; messages are ordered by it.
    #[serde(default)]
    pub timestamp: i64,
    /// Author-local timestamp.
    pub local_timestamp: i64,
    /// Users who have seen the message.
    #[serde(default)]
    pub seen_by: Vec<UserId>,
    /// Soft-delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Previous texts, oldest first.
    #[serde(default)]
    pub edit_history: Vec<Edit>,
    /// Reactions.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Create an empty message of the given kind.
    #[must_use]
    pub fn new(
        chat_id: ChatId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        kind: MessageKind,
        local_timestamp: i64,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            chat_id,
            sender_id,
            sender_name: sender_name.into(),
            text: None,
            audio: None,
            media_url: None,
            media_kind: None,
            kind,
            status: DeliveryStatus::Pending,
            reply_to: None,
            forwarded_from: None,
            is_forwarded: false,
            forward_hidden: false,
            timestamp: 0,
            local_timestamp,
            seen_by: Vec::new(),
            is_deleted: false,
            edit_history: Vec::new(),
            reactions: Vec::new(),
        }
    }

    /// Create a text message.
    #[must_use]
    pub fn text(
        chat_id: ChatId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        text: impl Into<String>,
        local_timestamp: i64,
    ) -> Self {
        let mut message = Self::new(
            chat_id,
            sender_id,
            sender_name,
            MessageKind::Text,
            local_timestamp,
        );
        message.text = Some(text.into());
        message
    }
}

impl Record for Message {
    const COLLECTION: Collection = Collection::Messages;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn chat_visibility() {
        let alice = uid("alice");
        let bob = uid("bob");

        let channel = Chat::new(ChatId::new("news").unwrap(), "News", ChatKind::Channel);
        assert!(channel.visible_to(&alice));

        let mut group = Chat::new(ChatId::new("team").unwrap(), "Team", ChatKind::Group);
        assert!(!group.visible_to(&alice));
        group.admin_ids.push(alice.clone());
        assert!(group.visible_to(&alice));

        let private = Chat::new(ChatId::private(&alice, &bob), "DM", ChatKind::Private);
        assert!(private.visible_to(&alice));
        assert!(private.visible_to(&bob));
        assert!(!private.visible_to(&uid("carol")));
    }

    #[test]
    fn media_labels_are_capitalized() {
        assert_eq!(MediaKind::Image.label(), "Image");
        assert_eq!(MediaKind::File.label(), "File");
    }
}
