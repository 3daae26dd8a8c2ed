use courier_core::{AdId, AlertId, ChatId, ReportId, SnapshotId, UserId};
use serde::{Deserialize, Serialize};

use crate::schema::Collection;
use crate::Record;

/// Review state of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Awaiting review.
    #[default]
    Pending,
    /// Handled by an administrator.
    Resolved,
}

/// A user report sent to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Unique identifier for the report.
    pub id: ReportId,
    /// Reporting user.
    pub reporter_id: UserId,
    /// What was reported.
    pub description: String,
    /// Submission time.
    pub timestamp: i64,
    /// Review state.
    #[serde(default)]
    pub status: ReportStatus,
}

impl Record for Report {
    const COLLECTION: Collection = Collection::Reports;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// An advertisement configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdConfig {
    /// Unique identifier for the ad.
    pub id: AdId,
    /// Headline.
    pub title: String,
    /// Body text.
    pub text: String,
    /// Image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Target URL.
    #[serde(default)]
    pub link: Option<String>,
    /// Call-to-action label.
    #[serde(default)]
    pub button_text: Option<String>,
    /// Switched on by an administrator.
    pub is_active: bool,
    /// Impressions so far.
    #[serde(default)]
    pub views: u64,
    /// Window start, when scheduled.
    #[serde(default)]
    pub start_time: Option<i64>,
    /// Window end, when scheduled.
    #[serde(default)]
    pub end_time: Option<i64>,
    /// Whether the window applies.
    #[serde(default)]
    pub is_scheduled: bool,
}

impl AdConfig {
    /// Whether the ad should be shown at `now`.
    ///
    /// Unscheduled ads follow `is_active` alone; scheduled ads must also be
    /// inside their window (open ends are unbounded).
    #[must_use]
    pub fn is_live(&self, now: i64) -> bool {
        if !self.is_active {
            return false;
        }
        if !self.is_scheduled {
            return true;
        }
        self.start_time.map_or(true, |start| start <= now)
            && self.end_time.map_or(true, |end| now < end)
    }
}

impl Record for AdConfig {
    const COLLECTION: Collection = Collection::Ads;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// Severity of a system alert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Informational.
    #[default]
    Info,
    /// Needs attention.
    Warning,
    /// Service disruption.
    Danger,
}

/// A banner broadcast to every user until it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAlert {
    /// Unique identifier for the alert.
    pub id: AlertId,
    /// Banner text.
    pub message: String,
    /// Severity.
    #[serde(default)]
    pub level: AlertLevel,
    /// Requested lifetime.
    pub duration_seconds: u64,
    /// Creation time.
    pub created_at: i64,
    /// The alert is active strictly before this instant.
    pub expires_at: i64,
    /// Whether the client locks its UI while the alert is active.
    #[serde(default)]
    pub global_lock: bool,
}

impl SystemAlert {
    /// Whether the alert is active at `now`.
    #[must_use]
    pub const fn is_active(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

impl Record for SystemAlert {
    const COLLECTION: Collection = Collection::Alerts;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

/// One exported message line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLine {
    /// Author name.
    pub sender: String,
    /// Message text or preview.
    pub text: String,
    /// Clock label of the message.
    pub time: String,
}

/// A time-boxed export of a chat's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    /// Unique identifier for the snapshot.
    pub id: SnapshotId,
    /// Exported chat.
    pub chat_id: ChatId,
    /// Chat name at export time.
    pub chat_name: String,
    /// Export time.
    pub timestamp: i64,
    /// Exported lines, oldest first.
    pub messages: Vec<SnapshotLine>,
    /// The snapshot is gone from this instant on.
    pub expires_at: i64,
}

impl ChatSnapshot {
    /// Whether the snapshot has expired at `now`.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

impl Record for ChatSnapshot {
    const COLLECTION: Collection = Collection::Snapshots;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad(is_active: bool) -> AdConfig {
        AdConfig {
            id: AdId::new("ad1").unwrap(),
            title: "Title".to_string(),
            text: "Text".to_string(),
            image: None,
            link: None,
            button_text: None,
            is_active,
            views: 0,
            start_time: None,
            end_time: None,
            is_scheduled: false,
        }
    }

    #[test]
    fn inactive_ad_is_never_live() {
        assert!(!ad(false).is_live(0));
        assert!(ad(true).is_live(0));
    }

    #[test]
    fn scheduled_ad_respects_window() {
        let mut ad = ad(true);
        ad.is_scheduled = true;
        ad.start_time = Some(100);
        ad.end_time = Some(200);

        assert!(!ad.is_live(99));
        assert!(ad.is_live(100));
        assert!(ad.is_live(199));
        assert!(!ad.is_live(200));

        ad.end_time = None;
        assert!(ad.is_live(10_000));
    }

    #[test]
    fn window_ignored_when_not_scheduled() {
        let mut ad = ad(true);
        ad.start_time = Some(100);
        assert!(ad.is_live(0));
    }

    #[test]
    fn alert_and_snapshot_expiry_boundaries() {
        let alert = SystemAlert {
            id: AlertId::new("a1").unwrap(),
            message: "maintenance".to_string(),
            level: AlertLevel::Warning,
            duration_seconds: 60,
            created_at: 0,
            expires_at: 60_000,
            global_lock: false,
        };
        assert!(alert.is_active(59_999));
        assert!(!alert.is_active(60_000));

        let snapshot = ChatSnapshot {
            id: SnapshotId::new("s1").unwrap(),
            chat_id: ChatId::new("c1").unwrap(),
            chat_name: "Chat".to_string(),
            timestamp: 0,
            messages: Vec::new(),
            expires_at: 10,
        };
        assert!(!snapshot.is_expired(9));
        assert!(snapshot.is_expired(10));
    }
}
