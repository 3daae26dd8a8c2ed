use courier_core::{CallId, StoryId, UserId};
use serde::{Deserialize, Serialize};

use crate::schema::Collection;
use crate::Record;

/// Fixed key of the live stream singleton.
pub const STREAM_KEY: &str = "global_stream";

// ============================================================================
// Stories
// ============================================================================

/// Media shown in a story frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMedia {
    /// Still image.
    Image,
    /// Video clip.
    Video,
}

/// One frame of a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryFrame {
    /// Frame id.
    pub id: String,
    /// Headline.
    pub title: String,
    /// Body text.
    pub description: String,
    /// Image or video URL.
    pub media_url: String,
    /// Kind of media.
    pub media: FrameMedia,
    /// Video length.
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    /// Background color.
    pub color: String,
}

/// A story record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Unique identifier for the story.
    pub id: StoryId,
    /// Owner.
    pub user_id: UserId,
    /// Owner name at publish time.
    pub username: String,
    /// Owner avatar at publish time.
    #[serde(default)]
    pub avatar: String,
    /// Frames, in display order.
    pub frames: Vec<StoryFrame>,
    /// Whether the story has been viewed.
    #[serde(default)]
    pub seen: bool,
    /// Publish time.
    pub created_at: i64,
    /// After this the story is stale.
    pub expires_at: i64,
}

impl Story {
    /// Whether the story is stale at `now`.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

impl Record for Story {
    const COLLECTION: Collection = Collection::Stories;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

// ============================================================================
// Calls
// ============================================================================

/// Media of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Audio only.
    Audio,
    /// Audio and video.
    Video,
}

/// Status of a call session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Waiting for the receiver.
    Ringing,
    /// Both sides joined.
    Connected,
    /// Hung up.
    Ended,
    /// Declined by the receiver.
    Rejected,
}

/// A two-party call signaling exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    /// Unique identifier for the call.
    pub id: CallId,
    /// Initiating user.
    pub caller_id: UserId,
    /// Caller name at dial time.
    pub caller_name: String,
    /// Caller avatar at dial time.
    #[serde(default)]
    pub caller_avatar: String,
    /// Called user.
    pub receiver_id: UserId,
    /// Media of the call.
    pub kind: CallKind,
    /// Current status.
    pub status: CallStatus,
    /// Dial time.
    pub timestamp: i64,
    /// SDP offer from the caller.
    #[serde(default)]
    pub sdp_offer: Option<String>,
    /// SDP answer from the receiver.
    #[serde(default)]
    pub sdp_answer: Option<String>,
    /// ICE candidates gathered by the caller, in arrival order.
    #[serde(default)]
    pub caller_candidates: Vec<String>,
    /// ICE candidates gathered by the receiver, in arrival order.
    #[serde(default)]
    pub receiver_candidates: Vec<String>,
}

impl CallSession {
    /// Create a ringing call.
    #[must_use]
    pub fn ringing(
        caller_id: UserId,
        caller_name: impl Into<String>,
        receiver_id: UserId,
        kind: CallKind,
        timestamp: i64,
    ) -> Self {
        Self {
            id: CallId::generate(),
            caller_id,
            caller_name: caller_name.into(),
            caller_avatar: String::new(),
            receiver_id,
            kind,
            status: CallStatus::Ringing,
            timestamp,
            sdp_offer: None,
            sdp_answer: None,
            caller_candidates: Vec::new(),
            receiver_candidates: Vec::new(),
        }
    }

    /// Whether the user is either side of the call.
    #[must_use]
    pub fn involves(&self, uid: &UserId) -> bool {
        self.caller_id == *uid || self.receiver_id == *uid
    }
}

impl Record for CallSession {
    const COLLECTION: Collection = Collection::Calls;

    fn key(&self) -> &str {
        self.id.as_str()
    }
}

// ============================================================================
// Live stream
// ============================================================================

/// A viewer asking to join the broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Requesting user.
    pub user_id: UserId,
    /// Requester name.
    pub username: String,
    /// Requester avatar.
    #[serde(default)]
    pub avatar: String,
}

/// The viewer currently on stage with the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    /// Guest user.
    pub user_id: UserId,
    /// Guest name.
    pub name: String,
    /// Guest avatar.
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A message in the stream chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Message id.
    pub id: String,
    /// Author.
    pub user_id: UserId,
    /// Author name.
    pub username: String,
    /// Message text.
    pub text: String,
    /// Whether the message carries a donation.
    #[serde(default)]
    pub is_donation: bool,
    /// Donated amount.
    #[serde(default)]
    pub amount: Option<i64>,
    /// Send time.
    pub timestamp: i64,
}

/// The live stream singleton, stored under [`STREAM_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStream {
    /// Whether the broadcast is live.
    pub is_active: bool,
    /// Broadcast title.
    pub title: String,
    /// Current viewers.
    #[serde(default)]
    pub viewers_count: u32,
    /// Start time.
    pub started_at: i64,
    /// Broadcasting user.
    pub host_id: UserId,
    /// Viewer on stage.
    #[serde(default)]
    pub guest: Option<Guest>,
    /// Pending join requests, oldest first.
    #[serde(default)]
    pub requests: Vec<JoinRequest>,
    /// Stream chat log, oldest first.
    #[serde(default)]
    pub messages: Vec<StreamMessage>,
    /// Chat closed by the host.
    #[serde(default)]
    pub chat_disabled: bool,
    /// Audio muted by the host.
    #[serde(default)]
    pub audio_muted: bool,
    /// Video hidden by the host.
    #[serde(default)]
    pub video_hidden: bool,
}

impl LiveStream {
    /// A fresh, live broadcast.
    #[must_use]
    pub fn started(title: impl Into<String>, host_id: UserId, started_at: i64) -> Self {
        Self {
            is_active: true,
            title: title.into(),
            viewers_count: 0,
            started_at,
            host_id,
            guest: None,
            requests: Vec::new(),
            messages: Vec::new(),
            chat_disabled: false,
            audio_muted: false,
            video_hidden: false,
        }
    }
}

impl Record for LiveStream {
    const COLLECTION: Collection = Collection::Stream;

    fn key(&self) -> &str {
        STREAM_KEY
    }
}
