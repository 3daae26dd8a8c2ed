//! Local chat backend for courier.
//!
//! This crate provides the backend of a chat application that keeps all of
//! its data in a local record store: users, chats, messages, stories, call
//! signaling, a live stream, administration records and chat snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Backend                            │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌───────────────┐   │
//! │  │ Accounts │ │  Users   │ │  Chats   │ │   Messages    │   │
//! │  └──────────┘ └──────────┘ └──────────┘ └───────────────┘   │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌───────────────┐   │
//! │  │ Stories  │ │  Calls   │ │  Stream  │ │ Admin / Snaps │   │
//! │  └──────────┘ └──────────┘ └──────────┘ └───────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!          │ writes                              │ Change / AuthEvent
//!          ▼                                     ▼
//!   ┌─────────────┐                      ┌──────────────┐
//!   │ RecordStore │                      │   Notifier   │
//!   │  (RocksDB)  │                      │ (handlers +  │
//!   └─────────────┘                      │  broadcast)  │
//!                                        └──────────────┘
//! ```
//!
//! Every mutation commits to the store first and then emits a
//! [`Change`]. Read-modify-write operations are optimistic: a write only lands
//! if the record is unchanged since it was read, otherwise it is retried.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use courier_backend::Backend;
//! use courier_core::{ChatId, UserId};
//! use courier_store::{Message, RocksStore, User};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/courier")?);
//! let backend = Backend::with_defaults(store);
//!
//! let alice = backend
//!     .users()
//!     .create(User::new(UserId::new("alice")?, "alice", "Alice"))?;
//! backend.accounts().login(&alice)?;
//!
//! let bob = UserId::new("bob")?;
//! let chat = ChatId::private(&alice.uid, &bob);
//! backend
//!     .messages()
//!     .send(&chat, Message::text(chat.clone(), alice.uid.clone(), "Alice", "hi", 0))?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accounts;
pub mod admin;
pub mod calls;
pub mod chats;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod notify;
pub mod seed;
pub mod service;
pub mod snapshots;
pub mod stories;
pub mod stream;
pub mod users;

pub use accounts::{Accounts, ACCOUNTS_LIST_KEY, ACTIVE_ACCOUNT_KEY};
pub use admin::{Ads, Alerts, Reports};
pub use calls::{CallSide, Calls};
pub use chats::Chats;
pub use config::BackendConfig;
pub use error::{BackendError, Result};
pub use messages::{preview_text, Messages};
pub use notify::{AuthEvent, Change, Notifier, Subscription};
pub use seed::SeedReport;
pub use service::Backend;
pub use snapshots::{PruneReport, Snapshots};
pub use stories::Stories;
pub use stream::Stream;
pub use users::Users;
