//! Core types and utilities for courier.
//!
//! This crate provides the foundational types shared by the record store and
//! the backend:
//!
//! - **Identifiers**: Strongly-typed string IDs for users, chats, messages and
//!   every other persisted record
//! - **Time**: Epoch-millisecond helpers, the unit of every stored timestamp
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use courier_core::{ChatId, UserId};
//!
//! let alice = UserId::new("alice").unwrap();
//! let bob = UserId::new("bob").unwrap();
//!
//! // Private chats are keyed by both participants.
//! let chat = ChatId::private(&alice, &bob);
//! assert!(chat.is_private());
//! assert!(chat.involves(&alice));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod time;

pub use error::{CoreError, Result};
pub use ids::{
    invite_code, AdId, AlertId, CallId, ChatId, IdError, MessageId, ReportId, SnapshotId, StoryId,
    UserId,
};
