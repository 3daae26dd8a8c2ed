//! Core identifier types for courier.
//!
//! Every persisted record is keyed by a string identifier. The newtypes here
//! keep the different key spaces apart and reject empty keys at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between the two participant uids of a private chat id.
pub const PRIVATE_CHAT_SEPARATOR: char = '_';

/// Errors produced when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty or whitespace only.
    #[error("identifier must not be empty")]
    Empty,
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a `", stringify!($name), "` from a non-empty string.")]
            ///
            /// # Errors
            ///
            /// Returns `IdError::Empty` if the value is empty or whitespace only.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(IdError::Empty);
                }
                Ok(Self(value))
            }

            #[doc = concat!("Generate a new random `", stringify!($name), "`.")]
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// A user identifier (`uid`), globally unique.
    UserId
);

string_id!(
    /// A chat identifier.
    ///
    /// Private chats use a composite id built from both participants; group
    /// and channel chats use an opaque id.
    ChatId
);

string_id!(
    /// A message identifier.
    MessageId
);

string_id!(
    /// A story identifier.
    StoryId
);

string_id!(
    /// A call session identifier.
    CallId
);

string_id!(
    /// A moderation report identifier.
    ReportId
);

string_id!(
    /// An advertisement identifier.
    AdId
);

string_id!(
    /// A system alert identifier.
    AlertId
);

string_id!(
    /// A chat snapshot identifier.
    SnapshotId
);

impl ChatId {
    /// Build the id of the private chat between two users.
    ///
    /// The participants are ordered so both sides derive the same id.
    #[must_use]
    pub fn private(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{first}{PRIVATE_CHAT_SEPARATOR}{second}"))
    }

    /// Whether this id has the shape of a private chat id.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.0.contains(PRIVATE_CHAT_SEPARATOR)
    }

    /// Whether the user is one of the two participants encoded in the id.
    #[must_use]
    pub fn involves(&self, uid: &UserId) -> bool {
        let uid = uid.as_str();
        self.0
            .strip_prefix(uid)
            .is_some_and(|rest| rest.starts_with(PRIVATE_CHAT_SEPARATOR))
            || self
                .0
                .strip_suffix(uid)
                .is_some_and(|rest| rest.ends_with(PRIVATE_CHAT_SEPARATOR))
    }
}

/// Derive the short invite code for a user.
///
/// The code is the first six bytes of the blake3 hash of the uid, hex-encoded,
/// so it is stable across restarts and devices.
#[must_use]
pub fn invite_code(uid: &UserId) -> String {
    let hash = blake3::hash(uid.as_str().as_bytes());
    hex::encode(&hash.as_bytes()[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[test]
    fn empty_id_rejected() {
        assert_eq!(UserId::new("").unwrap_err(), IdError::Empty);
        assert_eq!(ChatId::new("   ").unwrap_err(), IdError::Empty);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(MessageId::generate(), MessageId::generate());
    }

    #[test]
    fn private_chat_id_is_order_independent() {
        let a = uid("alice");
        let b = uid("bob");
        assert_eq!(ChatId::private(&a, &b), ChatId::private(&b, &a));
        assert_eq!(ChatId::private(&a, &b).as_str(), "alice_bob");
    }

    #[test]
    fn private_chat_involves_participants_only() {
        let chat = ChatId::private(&uid("alice"), &uid("bob"));
        assert!(chat.involves(&uid("alice")));
        assert!(chat.involves(&uid("bob")));
        assert!(!chat.involves(&uid("ali")));
        assert!(!chat.involves(&uid("carol")));
    }

    #[test]
    fn involves_handles_separator_in_uid() {
        let admin = uid("admin_official");
        let chat = ChatId::private(&admin, &uid("zed"));
        assert!(chat.involves(&admin));
        assert!(chat.involves(&uid("zed")));
    }

    #[test]
    fn group_chat_is_not_private() {
        assert!(!ChatId::new("general").unwrap().is_private());
    }

    #[test]
    fn serde_round_trip_rejects_empty() {
        let id = uid("alice");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alice\"");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }

    #[test]
    fn invite_code_is_stable() {
        let a = invite_code(&uid("alice"));
        assert_eq!(a.len(), 12);
        assert_eq!(a, invite_code(&uid("alice")));
        assert_ne!(a, invite_code(&uid("bob")));
    }
}
