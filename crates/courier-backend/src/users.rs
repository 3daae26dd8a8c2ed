//! User collection.
//!
//! Users are never hard-deleted. Every change after registration is a
//! read-modify-write through [`Users::update`], so concurrent writers retry
//! instead of overwriting each other.

use courier_core::{invite_code, time, UserId};
use courier_store::{
    Collection, Gift, Precondition, RecordStore, Store, StoreError, User, UsernameClaim, Versioned,
    WriteOp,
};

use crate::error::{BackendError, Result};
use crate::notify::Change;
use crate::service::Backend;

/// Prefix of shareable invite links.
pub const INVITE_LINK_BASE: &str = "https://courier.chat/join/";

/// Handle to the user collection.
pub struct Users<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Users<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Register a new user.
    ///
    /// A zero `numeric_id` is replaced by the next free one and an empty
    /// `invite_link` is derived from the uid. The username is claimed in the
    /// same atomic commit as the new record. If `inviter_uid` names an
    /// existing user, both sides are credited the referral bonus and the
    /// inviter's referral count goes up, in that commit too.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::AlreadyExists` if the uid is taken, or
    /// `BackendError::UsernameTaken` if another user has the same username
    /// (compared case-insensitively).
    pub fn create(&self, user: User) -> Result<User> {
        let store = self.backend.store();
        let bonus = self.backend.config().referral_bonus;

        for attempt in 1..=self.backend.attempts().max(1) {
            if store.get_raw(Collection::Users, user.uid.as_str())?.is_some() {
                return Err(BackendError::AlreadyExists {
                    collection: Collection::Users,
                    key: user.uid.to_string(),
                });
            }

            let existing = store.list::<User>()?;
            if existing
                .iter()
                .any(|other| other.username.eq_ignore_ascii_case(&user.username))
            {
                return Err(BackendError::UsernameTaken(user.username));
            }
            let claim = UsernameClaim::new(&user.username, user.uid.clone());
            if store.get_raw(Collection::Usernames, &claim.name)?.is_some() {
                return Err(BackendError::UsernameTaken(user.username));
            }

            let mut candidate = user.clone();
            if candidate.numeric_id == 0 {
                candidate.numeric_id = existing
                    .iter()
                    .map(|u| u.numeric_id)
                    .max()
                    .unwrap_or(0)
                    .checked_add(1)
                    .ok_or(BackendError::NumericIdExhausted)?;
            }
            if candidate.invite_link.is_empty() {
                candidate.invite_link =
                    format!("{INVITE_LINK_BASE}{}", invite_code(&candidate.uid));
            }

            let mut ops = Vec::with_capacity(3);
            ops.push(WriteOp::put(&claim, Precondition::Absent)?);
            let mut inviter_uid = None;
            if let Some(uid) = candidate.inviter_uid.clone().filter(|uid| *uid != candidate.uid) {
                match store.get_versioned::<User>(uid.as_str())? {
                    Some(Versioned {
                        version,
                        value: mut inviter,
                    }) => {
                        inviter.balance += bonus;
                        inviter.referral_count += 1;
                        candidate.balance += bonus;
                        candidate.referred_by = Some(uid.clone());
                        ops.push(WriteOp::put(&inviter, Precondition::Version(version))?);
                        inviter_uid = Some(uid);
                    }
                    None => tracing::warn!(inviter = %uid, "inviter not found, no referral bonus"),
                }
            }
            ops.push(WriteOp::put(&candidate, Precondition::Absent)?);

            match store.commit(ops) {
                Ok(()) => {
                    tracing::info!(
                        uid = %candidate.uid,
                        numeric_id = candidate.numeric_id,
                        referred = inviter_uid.is_some(),
                        "registered user"
                    );
                    if let Some(uid) = inviter_uid {
                        self.backend.emit(Change::new(Collection::Users, uid));
                    }
                    self.backend.emit_record(&candidate);
                    return Ok(candidate);
                }
                Err(StoreError::ConcurrentModification { .. }) => {
                    tracing::debug!(uid = %user.uid, attempt, "registration raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BackendError::ConcurrentModification {
            collection: Collection::Users,
            key: user.uid.to_string(),
        })
    }

    /// Get a user by uid.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get(&self, uid: &UserId) -> Result<Option<User>> {
        Ok(self.backend.store().get(uid.as_str())?)
    }

    /// Get a user that must exist.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such user.
    pub fn require(&self, uid: &UserId) -> Result<User> {
        self.get(uid)?
            .ok_or_else(|| BackendError::not_found(Collection::Users, uid.as_str()))
    }

    /// Every user, in uid order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get_all(&self) -> Result<Vec<User>> {
        Ok(self.backend.store().list()?)
    }

    /// Users whose username, display name or uid contains `query`,
    /// case-insensitively. `@` characters are ignored and an empty query
    /// matches everyone.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn search(&self, query: &str) -> Result<Vec<User>> {
        let query = query.replace('@', "").trim().to_lowercase();
        let users = self.get_all()?;
        if query.is_empty() {
            return Ok(users);
        }
        Ok(users
            .into_iter()
            .filter(|u| {
                u.username.to_lowercase().contains(&query)
                    || u.display_name.to_lowercase().contains(&query)
                    || u.uid.as_str().to_lowercase().contains(&query)
            })
            .collect())
    }

    /// Find a user by exact username, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.trim_start_matches('@');
        Ok(self
            .get_all()?
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username)))
    }

    /// Apply a change to a stored user and notify.
    ///
    /// `mutate` may run more than once if another writer gets in between.
    /// Changing `username` here skips the uniqueness check; use
    /// [`Users::rename`] for that.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such user, or
    /// whatever `mutate` returns.
    pub fn update<F>(&self, uid: &UserId, mutate: F) -> Result<User>
    where
        F: FnMut(&mut User) -> Result<()>,
    {
        let user: User = self
            .backend
            .store()
            .update(uid.as_str(), self.backend.attempts(), mutate)?;
        self.backend.emit_record(&user);
        Ok(user)
    }

    /// Change a user's username.
    ///
    /// The new name is claimed and the old claim released in the same
    /// commit as the user record.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::UsernameTaken` if another user holds it, or
    /// `BackendError::RecordNotFound` if there is no such user.
    pub fn rename(&self, uid: &UserId, username: &str) -> Result<User> {
        let store = self.backend.store();
        let claim = UsernameClaim::new(username, uid.clone());
        let now = time::now_millis();

        for attempt in 1..=self.backend.attempts().max(1) {
            let Versioned {
                version,
                value: mut user,
            } = store
                .get_versioned::<User>(uid.as_str())?
                .ok_or_else(|| BackendError::not_found(Collection::Users, uid.as_str()))?;

            // Names registered without a claim are only found by scanning
            if let Some(holder) = self.find_by_username(username)? {
                if holder.uid != *uid {
                    return Err(BackendError::UsernameTaken(username.to_string()));
                }
            }
            let claim_precondition = match store.get_versioned::<UsernameClaim>(&claim.name)? {
                Some(held) if held.value.uid != *uid => {
                    return Err(BackendError::UsernameTaken(username.to_string()));
                }
                Some(held) => Precondition::Version(held.version),
                None => Precondition::Absent,
            };

            let old_key = UsernameClaim::key_for(&user.username);
            let mut ops = Vec::with_capacity(3);
            if old_key != claim.name {
                if let Some(old) = store.get_versioned::<UsernameClaim>(&old_key)? {
                    if old.value.uid == *uid {
                        ops.push(WriteOp::delete::<UsernameClaim>(
                            &old_key,
                            Precondition::Version(old.version),
                        ));
                    }
                }
            }

            user.username = username.to_string();
            user.username_changed_at = Some(now);
            ops.push(WriteOp::put(&claim, claim_precondition)?);
            ops.push(WriteOp::put(&user, Precondition::Version(version))?);

            match store.commit(ops) {
                Ok(()) => {
                    tracing::info!(%uid, username, "renamed user");
                    self.backend.emit_record(&user);
                    return Ok(user);
                }
                Err(StoreError::ConcurrentModification { .. }) => {
                    tracing::debug!(%uid, attempt, "rename raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BackendError::ConcurrentModification {
            collection: Collection::Users,
            key: uid.to_string(),
        })
    }

    /// Mark a user online and refresh the last-seen time.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such user.
    pub fn heartbeat(&self, uid: &UserId) -> Result<User> {
        let now = time::now_millis();
        self.update(uid, |u| {
            u.presence.is_online = true;
            u.presence.last_seen = now;
            Ok(())
        })
    }

    /// Mark a user offline.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such user.
    pub fn set_offline(&self, uid: &UserId) -> Result<User> {
        let now = time::now_millis();
        self.update(uid, |u| {
            u.presence.is_online = false;
            u.presence.last_seen = now;
            Ok(())
        })
    }

    /// Add `amount` (possibly negative) to a user's balance.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InsufficientBalance` if the balance would go
    /// below zero.
    pub fn add_balance(&self, uid: &UserId, amount: i64) -> Result<User> {
        self.update(uid, |u| {
            let balance = u.balance.saturating_add(amount);
            if balance < 0 {
                return Err(BackendError::InsufficientBalance {
                    uid: u.uid.clone(),
                    balance: u.balance,
                    amount: amount.saturating_neg(),
                });
            }
            u.balance = balance;
            Ok(())
        })
    }

    /// Add a gift to a user's inventory.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such user.
    pub fn add_gift(&self, uid: &UserId, gift: Gift) -> Result<User> {
        self.update(uid, |u| {
            if !u.gifts.iter().any(|g| g.id == gift.id) {
                u.gifts.push(gift.clone());
            }
            Ok(())
        })
    }

    /// Add `other` to a user's block list.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such user.
    pub fn block(&self, uid: &UserId, other: &UserId) -> Result<User> {
        self.update(uid, |u| {
            if !u.has_blocked(other) {
                u.blocked_users.push(other.clone());
            }
            Ok(())
        })
    }

    /// Remove `other` from a user's block list.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such user.
    pub fn unblock(&self, uid: &UserId, other: &UserId) -> Result<User> {
        self.update(uid, |u| {
            u.blocked_users.retain(|blocked| blocked != other);
            Ok(())
        })
    }

    /// Add `other` to a user's contacts.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if either user does not exist.
    pub fn add_contact(&self, uid: &UserId, other: &UserId) -> Result<User> {
        self.require(other)?;
        self.update(uid, |u| {
            if !u.contacts.contains(other) {
                u.contacts.push(other.clone());
            }
            Ok(())
        })
    }
}
