//! Boot seed.
//!
//! Makes sure a fresh store has a system administrator and the official
//! announcements channel. Running it again is a no-op.

use courier_core::{ChatId, UserId};
use courier_store::{Chat, ChatKind, Store, User};

use crate::error::{BackendError, Result};
use crate::service::Backend;

/// Uid of the seeded administrator.
pub const ADMIN_UID: &str = "admin_official";

/// Username of the seeded administrator.
pub const ADMIN_USERNAME: &str = "admin";

/// Chat id of the official announcements channel.
pub const OFFICIAL_CHANNEL_ID: &str = "official";

/// Balance the administrator starts with.
const ADMIN_BALANCE: i64 = 999_999;

/// What the seed had to create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// The administrator was created.
    pub admin_created: bool,
    /// The official channel was created.
    pub channel_created: bool,
}

/// Create the administrator and the official channel if missing.
///
/// # Errors
///
/// Returns an error if the store operation fails.
pub fn run<S: Store>(backend: &Backend<S>) -> Result<SeedReport> {
    let admin_uid = UserId::new(ADMIN_UID)?;
    let admin_created = ensure_admin(backend, &admin_uid)?;
    let channel_created = ensure_official_channel(backend, &admin_uid)?;

    let report = SeedReport {
        admin_created,
        channel_created,
    };
    tracing::info!(
        admin_created = report.admin_created,
        channel_created = report.channel_created,
        "boot seed complete"
    );
    Ok(report)
}

fn ensure_admin<S: Store>(backend: &Backend<S>, uid: &UserId) -> Result<bool> {
    let users = backend.users();
    if users.find_by_username(ADMIN_USERNAME)?.is_some() {
        return Ok(false);
    }

    let mut admin = User::new(uid.clone(), ADMIN_USERNAME, "System Admin");
    admin.numeric_id = 1;
    admin.balance = ADMIN_BALANCE;
    admin.is_admin = true;

    match users.create(admin) {
        Ok(_) => Ok(true),
        // Lost a race with another seeding process
        Err(BackendError::AlreadyExists { .. } | BackendError::UsernameTaken(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn ensure_official_channel<S: Store>(backend: &Backend<S>, admin: &UserId) -> Result<bool> {
    let chats = backend.chats();
    let id = ChatId::new(OFFICIAL_CHANNEL_ID)?;
    if chats.get(&id)?.is_some() {
        return Ok(false);
    }

    let mut channel = Chat::new(id, "Courier News", ChatKind::Channel);
    channel.status = "Official announcements".to_string();
    channel.group_username = Some("courier".to_string());
    channel.admin_ids.push(admin.clone());
    chats.create(&channel)?;
    Ok(true)
}
