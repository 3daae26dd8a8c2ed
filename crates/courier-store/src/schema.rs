//! Database schema definitions and column families.
//!
//! Every record collection lives in its own column family. The schema is
//! additive: a newer binary creates the column families it is missing and
//! bumps the recorded version, existing data is never rewritten.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Schema version written to the `meta` column family.
pub const SCHEMA_VERSION: u32 = 1;

/// Key under which the schema version is stored in `meta`.
pub const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

/// Auxiliary column family names.
pub mod cf {
    /// Local preference and flag storage (string keys, string values).
    pub const PREFS: &str = "prefs";

    /// Store metadata such as the schema version.
    pub const META: &str = "meta";
}

/// A named record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// User records, keyed by `uid`.
    Users,
    /// Chat records, keyed by chat id.
    Chats,
    /// Message records, keyed by message id.
    Messages,
    /// Story records, keyed by story id.
    Stories,
    /// Advertisement configurations.
    Ads,
    /// Call signaling sessions.
    Calls,
    /// The live stream singleton.
    Stream,
    /// Moderation reports.
    Reports,
    /// System-wide alerts.
    Alerts,
    /// Time-boxed chat exports.
    Snapshots,
    /// Username reservations, keyed by lowercased username.
    Usernames,
}

impl Collection {
    /// Every record collection, in schema order.
    pub const ALL: [Self; 11] = [
        Self::Users,
        Self::Chats,
        Self::Messages,
        Self::Stories,
        Self::Ads,
        Self::Calls,
        Self::Stream,
        Self::Reports,
        Self::Alerts,
        Self::Snapshots,
        Self::Usernames,
    ];

    /// The column family backing this collection.
    #[must_use]
    pub const fn cf_name(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Chats => "chats",
            Self::Messages => "messages",
            Self::Stories => "stories",
            Self::Ads => "ads",
            Self::Calls => "calls",
            Self::Stream => "stream",
            Self::Reports => "reports",
            Self::Alerts => "alerts",
            Self::Snapshots => "snapshots",
            Self::Usernames => "usernames",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cf_name())
    }
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    Collection::ALL
        .iter()
        .map(|c| c.cf_name())
        .chain([cf::PREFS, cf::META])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_family_names_are_unique() {
        let mut names = all_column_families();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, Collection::ALL.len() + 2);
    }

    #[test]
    fn display_matches_cf_name() {
        assert_eq!(Collection::Snapshots.to_string(), "snapshots");
        assert_eq!(Collection::Stream.to_string(), "stream");
    }
}
