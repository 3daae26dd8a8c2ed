//! Domain records stored in the database.
//!
//! Timestamps are epoch milliseconds. Optional and collection-valued fields
//! default when absent so records written before a field existed still decode.

mod admin;
mod chat;
mod media;
mod user;

pub use admin::{AdConfig, AlertLevel, ChatSnapshot, Report, ReportStatus, SnapshotLine, SystemAlert};
pub use chat::{Chat, ChatKind, DeliveryStatus, Edit, MediaKind, Message, MessageKind, Reaction};
pub use media::{
    CallKind, CallSession, CallStatus, FrameMedia, Guest, JoinRequest, LiveStream, Story,
    StoryFrame, StreamMessage, STREAM_KEY,
};
pub use user::{
    DeviceSession, Gift, Presence, Privacy, ThemeMode, User, UsernameClaim, Visibility,
};
