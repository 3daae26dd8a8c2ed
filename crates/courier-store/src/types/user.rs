use courier_core::{ChatId, UserId};
use serde::{Deserialize, Serialize};

use crate::schema::Collection;
use crate::Record;

/// A user record.
///
/// Users are never hard-deleted; every change is a merge into the stored
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Globally unique identifier.
    pub uid: UserId,
    /// Short numeric handle, assigned on registration.
    pub numeric_id: u64,
    /// Login name, unique among users (case-insensitive).
    pub username: String,
    /// Name shown to other users.
    pub display_name: String,
    /// Free-form profile text.
    #[serde(default)]
    pub bio: Option<String>,
    /// Birth date as entered by the user.
    #[serde(default)]
    pub birth_date: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Plaintext password. Local-only, never meant as a security boundary.
    #[serde(default)]
    pub password: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// In-app currency balance.
    #[serde(default)]
    pub balance: i64,
    /// Gift inventory.
    #[serde(default)]
    pub gifts: Vec<Gift>,
    /// Channels the user joined.
    #[serde(default)]
    pub joined_channels: Vec<ChatId>,
    /// Chats the user archived.
    #[serde(default)]
    pub archived_chats: Vec<ChatId>,
    /// Administrator flag.
    #[serde(default)]
    pub is_admin: bool,
    /// Banned by an administrator.
    #[serde(default)]
    pub is_banned: bool,
    /// Moderation warnings received.
    #[serde(default)]
    pub warnings: u32,
    /// Bot account flag.
    #[serde(default)]
    pub is_bot: bool,
    /// Token for bot accounts.
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Web app opened by bot accounts.
    #[serde(default)]
    pub web_app_url: Option<String>,
    /// Bots owned by this user.
    #[serde(default)]
    pub owned_bots: Vec<UserId>,
    /// Chat background image.
    #[serde(default)]
    pub chat_background: Option<String>,
    /// Whether the chat background is blurred.
    #[serde(default)]
    pub chat_background_blur: bool,
    /// Premium subscription flag.
    #[serde(default)]
    pub is_premium: bool,
    /// When premium lapses.
    #[serde(default)]
    pub premium_expiry: Option<i64>,
    /// Inviter requested at registration.
    #[serde(default)]
    pub inviter_uid: Option<UserId>,
    /// Inviter that was credited for this user.
    #[serde(default)]
    pub referred_by: Option<UserId>,
    /// Number of users registered through this user's invite.
    #[serde(default)]
    pub referral_count: u32,
    /// Interface language.
    #[serde(default)]
    pub language: Option<String>,
    /// Seasonal theme.
    #[serde(default)]
    pub theme_mode: ThemeMode,
    /// Online state.
    #[serde(default)]
    pub presence: Presence,
    /// Devices signed in to this account.
    #[serde(default)]
    pub sessions: Vec<DeviceSession>,
    /// Users this user blocked.
    #[serde(default)]
    pub blocked_users: Vec<UserId>,
    /// Address book.
    #[serde(default)]
    pub contacts: Vec<UserId>,
    /// Shareable invite link.
    #[serde(default)]
    pub invite_link: String,
    /// Last time the username changed.
    #[serde(default)]
    pub username_changed_at: Option<i64>,
    /// Privacy preferences.
    #[serde(default)]
    pub privacy: Privacy,
}

impl User {
    /// Create a user with empty inventory and default preferences.
    #[must_use]
    pub fn new(uid: UserId, username: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid,
            numeric_id: 0,
            username: username.into(),
            display_name: display_name.into(),
            bio: None,
            birth_date: None,
            phone: None,
            password: None,
            avatar: None,
            balance: 0,
            gifts: Vec::new(),
            joined_channels: Vec::new(),
            archived_chats: Vec::new(),
            is_admin: false,
            is_banned: false,
            warnings: 0,
            is_bot: false,
            bot_token: None,
            web_app_url: None,
            owned_bots: Vec::new(),
            chat_background: None,
            chat_background_blur: false,
            is_premium: false,
            premium_expiry: None,
            inviter_uid: None,
            referred_by: None,
            referral_count: 0,
            language: None,
            theme_mode: ThemeMode::default(),
            presence: Presence::default(),
            sessions: Vec::new(),
            blocked_users: Vec::new(),
            contacts: Vec::new(),
            invite_link: String::new(),
            username_changed_at: None,
            privacy: Privacy::default(),
        }
    }

    /// Whether the premium flag is set but its expiry has passed.
    #[must_use]
    pub fn premium_lapsed(&self, now: i64) -> bool {
        self.is_premium && self.premium_expiry.is_some_and(|expiry| expiry < now)
    }

    /// Whether `other` is on this user's block list.
    #[must_use]
    pub fn has_blocked(&self, other: &UserId) -> bool {
        self.blocked_users.contains(other)
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> &str {
        self.uid.as_str()
    }
}

/// Reservation of a username by one user.
///
/// Keyed by the ASCII-lowercased name, so two users can never hold names
/// that differ only in case. Written in the same commit as the user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameClaim {
    /// Lowercased username.
    pub name: String,
    /// Holder of the username.
    pub uid: UserId,
}

impl UsernameClaim {
    /// Claim `username` for `uid`.
    #[must_use]
    pub fn new(username: &str, uid: UserId) -> Self {
        Self {
            name: Self::key_for(username),
            uid,
        }
    }

    /// The record key a username is claimed under.
    #[must_use]
    pub fn key_for(username: &str) -> String {
        username.to_ascii_lowercase()
    }
}

impl Record for UsernameClaim {
    const COLLECTION: Collection = Collection::Usernames;

    fn key(&self) -> &str {
        &self.name
    }
}

/// A gift held in a user's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gift {
    /// Inventory entry id.
    pub id: String,
    /// Catalog id of the gift.
    pub gift_id: String,
    /// Display name.
    pub name: String,
    /// Price paid.
    pub price: i64,
    /// Emoji shown for the gift.
    pub emoji: String,
    /// Rarity label.
    pub rarity: String,
    /// When the gift was acquired.
    pub acquired_at: i64,
    /// Sender, if it was a present.
    #[serde(default)]
    pub from_user: Option<UserId>,
    /// Whether the gift was upgraded.
    #[serde(default)]
    pub is_upgraded: bool,
    /// Serial number of an upgraded gift.
    #[serde(default)]
    pub upgrade_tag: Option<u32>,
    /// Animation shown for upgraded gifts.
    #[serde(default)]
    pub animation_url: Option<String>,
}

/// Online state of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Whether the user is currently online.
    pub is_online: bool,
    /// Last heartbeat.
    pub last_seen: i64,
    /// Whether the user hides their status.
    pub status_hidden: bool,
}

/// Who may see a piece of profile information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Anyone.
    #[default]
    Everybody,
    /// Only contacts.
    Contacts,
    /// No one.
    Nobody,
}

/// Privacy preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privacy {
    /// Months of inactivity before the account is handed over.
    pub inactivity_months: u32,
    /// Account that inherits this one after inactivity.
    #[serde(default)]
    pub transfer_to: Option<UserId>,
    /// Who sees the last-seen timestamp.
    pub last_seen: Visibility,
    /// Who may forward this user's messages with attribution.
    pub forwarding: Visibility,
}

impl Default for Privacy {
    fn default() -> Self {
        Self {
            inactivity_months: 12,
            transfer_to: None,
            last_seen: Visibility::Everybody,
            forwarding: Visibility::Everybody,
        }
    }
}

/// Seasonal visual theme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    /// Snowfall.
    Snow,
    /// Falling leaves.
    Autumn,
    /// No seasonal effect.
    #[default]
    None,
}

/// A device signed in to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    /// Session id.
    pub id: String,
    /// Device label.
    pub device_name: String,
    /// Operating system.
    pub os: String,
    /// Last known address.
    #[serde(default)]
    pub ip: Option<String>,
    /// Last activity.
    pub last_active: i64,
    /// Client version.
    pub app_version: String,
}
