//! Local account directory.
//!
//! A device remembers up to `max_local_accounts` users it has logged in as,
//! and which one is active. Both live in the store's preference area:
//!
//! - `active_account_uid`: uid of the active account, absent when logged out
//! - `accounts_list`: JSON array of registered uids, in login order

use std::sync::Arc;

use courier_core::{time, UserId};
use courier_store::{RecordStore, Store, User};

use crate::error::{BackendError, Result};
use crate::notify::{AuthEvent, Subscription};
use crate::service::Backend;

/// Preference key of the active account.
pub const ACTIVE_ACCOUNT_KEY: &str = "active_account_uid";

/// Preference key of the registered account list.
pub const ACCOUNTS_LIST_KEY: &str = "accounts_list";

/// Handle to the local account directory.
pub struct Accounts<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Accounts<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Log in as `user` and make it the active account.
    ///
    /// The uid is added to the directory if it is not registered yet.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::CapacityExceeded` if the user is new to this
    /// device and the directory is full.
    pub fn login(&self, user: &User) -> Result<()> {
        let limit = self.backend.config().max_local_accounts;
        let (uids, _) = self.edit_registered(|uids| {
            if uids.contains(&user.uid) {
                return Ok(false);
            }
            if uids.len() >= limit {
                return Err(BackendError::CapacityExceeded { limit });
            }
            uids.push(user.uid.clone());
            Ok(true)
        })?;

        self.backend
            .store()
            .set_pref(ACTIVE_ACCOUNT_KEY, user.uid.as_str())?;
        tracing::info!(uid = %user.uid, accounts = uids.len(), "logged in");
        self.backend.emit_auth(AuthEvent::LoggedIn(user.uid.clone()));
        Ok(())
    }

    /// Clear the active account. Registered accounts are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn logout(&self) -> Result<()> {
        self.backend.store().remove_pref(ACTIVE_ACCOUNT_KEY)?;
        tracing::info!("logged out");
        self.backend.emit_auth(AuthEvent::LoggedOut);
        Ok(())
    }

    /// Make another registered account active.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::AccountNotRegistered` if `uid` never logged in
    /// on this device.
    pub fn switch_account(&self, uid: &UserId) -> Result<()> {
        if !self.registered()?.contains(uid) {
            return Err(BackendError::AccountNotRegistered(uid.clone()));
        }
        self.backend
            .store()
            .set_pref(ACTIVE_ACCOUNT_KEY, uid.as_str())?;
        tracing::info!(%uid, "switched account");
        self.backend.emit_auth(AuthEvent::Switched(uid.clone()));
        Ok(())
    }

    /// Forget an account on this device, returning whether it was registered.
    ///
    /// Removing the active account also logs out.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn remove_account(&self, uid: &UserId) -> Result<bool> {
        let (_, removed) = self.edit_registered(|uids| {
            let before = uids.len();
            uids.retain(|registered| registered != uid);
            Ok(uids.len() != before)
        })?;
        if !removed {
            return Ok(false);
        }

        // Only clears the active account if it is still this one
        self.backend
            .store()
            .swap_pref(ACTIVE_ACCOUNT_KEY, Some(uid.as_str()), None)?;
        tracing::info!(%uid, "removed local account");
        self.backend.emit_auth(AuthEvent::Removed(uid.clone()));
        Ok(true)
    }

    /// Uids registered on this device, in login order.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::CorruptPreference` if the stored list is not
    /// valid JSON.
    pub fn registered(&self) -> Result<Vec<UserId>> {
        let raw = self.backend.store().get_pref(ACCOUNTS_LIST_KEY)?;
        parse_registered(raw.as_deref())
    }

    /// Users registered on this device, in login order.
    ///
    /// Uids whose user record is gone are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn list_accounts(&self) -> Result<Vec<User>> {
        let store = self.backend.store();
        let mut users = Vec::new();
        for uid in self.registered()? {
            match store.get::<User>(uid.as_str())? {
                Some(user) => users.push(user),
                None => tracing::warn!(%uid, "registered account has no user record"),
            }
        }
        Ok(users)
    }

    /// Uid of the active account.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::CorruptPreference` if the stored uid is blank.
    pub fn active_uid(&self) -> Result<Option<UserId>> {
        self.backend
            .store()
            .get_pref(ACTIVE_ACCOUNT_KEY)?
            .map(|raw| {
                UserId::new(raw).map_err(|e| BackendError::CorruptPreference {
                    key: ACTIVE_ACCOUNT_KEY,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// The active user.
    ///
    /// A premium flag whose expiry has passed is cleared and written back
    /// before the user is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn current_user(&self) -> Result<Option<User>> {
        let Some(uid) = self.active_uid()? else {
            return Ok(None);
        };
        let Some(user) = self.backend.store().get::<User>(uid.as_str())? else {
            return Ok(None);
        };

        let now = time::now_millis();
        if !user.premium_lapsed(now) {
            return Ok(Some(user));
        }

        tracing::info!(%uid, "premium expired");
        let user = self.backend.users().update(&uid, |u| {
            if u.premium_lapsed(now) {
                u.is_premium = false;
                u.premium_expiry = None;
            }
            Ok(())
        });
        match user {
            Ok(user) => Ok(Some(user)),
            Err(BackendError::RecordNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Observe the active user.
    ///
    /// `handler` is called right away with the current user, then again
    /// after every login, switch, logout and removal.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails; no handler is left
    /// registered in that case. Later load failures are logged.
    pub fn on_auth_state_changed<F>(&self, handler: F) -> Result<Subscription>
    where
        F: Fn(Option<&User>) + Send + Sync + 'static,
        S: 'static,
    {
        let handler = Arc::new(handler);

        let backend = self.backend.clone();
        let on_event = Arc::clone(&handler);
        let subscription = self.backend.auth_events().subscribe(move |event| {
            match backend.accounts().current_user() {
                Ok(user) => on_event(user.as_ref()),
                Err(e) => tracing::error!(error = %e, ?event, "failed to load active account"),
            }
        });

        let current = self.current_user()?;
        handler(current.as_ref());
        Ok(subscription)
    }

    /// Apply `edit` to the registered list and write it back, unless another
    /// writer changed the list since it was read, in which case the edit is
    /// retried on the fresh list. `edit` returns whether it changed anything.
    fn edit_registered<F>(&self, mut edit: F) -> Result<(Vec<UserId>, bool)>
    where
        F: FnMut(&mut Vec<UserId>) -> Result<bool>,
    {
        let store = self.backend.store();
        for attempt in 1..=self.backend.attempts().max(1) {
            let raw = store.get_pref(ACCOUNTS_LIST_KEY)?;
            let mut uids = parse_registered(raw.as_deref())?;
            if !edit(&mut uids)? {
                return Ok((uids, false));
            }

            let encoded =
                serde_json::to_string(&uids).map_err(|e| BackendError::CorruptPreference {
                    key: ACCOUNTS_LIST_KEY,
                    reason: e.to_string(),
                })?;
            if store.swap_pref(ACCOUNTS_LIST_KEY, raw.as_deref(), Some(&encoded))? {
                return Ok((uids, true));
            }
            tracing::debug!(attempt, "account list changed underneath, retrying");
        }

        Err(BackendError::PreferenceConflict {
            key: ACCOUNTS_LIST_KEY,
        })
    }
}

fn parse_registered(raw: Option<&str>) -> Result<Vec<UserId>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    serde_json::from_str(raw).map_err(|e| BackendError::CorruptPreference {
        key: ACCOUNTS_LIST_KEY,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use super::*;
    use courier_store::RocksStore;

    fn setup() -> (Backend<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        (Backend::with_defaults(store), dir)
    }

    fn user(backend: &Backend<RocksStore>, name: &str) -> User {
        backend
            .users()
            .create(User::new(UserId::new(name).unwrap(), name, name))
            .unwrap()
    }

    #[test]
    fn login_registers_and_activates() {
        let (backend, _dir) = setup();
        let alice = user(&backend, "alice");

        backend.accounts().login(&alice).unwrap();

        let accounts = backend.accounts();
        assert_eq!(accounts.active_uid().unwrap(), Some(alice.uid.clone()));
        assert_eq!(accounts.registered().unwrap(), vec![alice.uid]);
    }

    #[test]
    fn fourth_account_is_rejected() {
        let (backend, _dir) = setup();
        let accounts = backend.accounts();
        for name in ["u1", "u2", "u3"] {
            accounts.login(&user(&backend, name)).unwrap();
        }

        let err = accounts.login(&user(&backend, "u4")).unwrap_err();
        assert!(matches!(err, BackendError::CapacityExceeded { limit: 3 }));
        assert_eq!(accounts.registered().unwrap().len(), 3);
        assert_eq!(accounts.active_uid().unwrap().unwrap().as_str(), "u3");

        // Already registered accounts can still log in
        accounts.login(&user_record(&backend, "u1")).unwrap();
        assert_eq!(accounts.active_uid().unwrap().unwrap().as_str(), "u1");
    }

    fn user_record(backend: &Backend<RocksStore>, uid: &str) -> User {
        backend.users().get(&UserId::new(uid).unwrap()).unwrap().unwrap()
    }

    #[test]
    fn switch_requires_registration() {
        let (backend, _dir) = setup();
        let alice = user(&backend, "alice");
        let bob = user(&backend, "bob");
        let accounts = backend.accounts();
        accounts.login(&alice).unwrap();

        let err = accounts.switch_account(&bob.uid).unwrap_err();
        assert!(matches!(err, BackendError::AccountNotRegistered(_)));

        accounts.login(&bob).unwrap();
        accounts.switch_account(&alice.uid).unwrap();
        assert_eq!(accounts.active_uid().unwrap(), Some(alice.uid));
    }

    #[test]
    fn logout_keeps_registry() {
        let (backend, _dir) = setup();
        let alice = user(&backend, "alice");
        let accounts = backend.accounts();
        accounts.login(&alice).unwrap();

        accounts.logout().unwrap();
        assert_eq!(accounts.active_uid().unwrap(), None);
        assert_eq!(accounts.current_user().unwrap(), None);
        assert_eq!(accounts.list_accounts().unwrap().len(), 1);
    }

    #[test]
    fn removing_active_account_logs_out() {
        let (backend, _dir) = setup();
        let alice = user(&backend, "alice");
        let accounts = backend.accounts();
        accounts.login(&alice).unwrap();

        assert!(accounts.remove_account(&alice.uid).unwrap());
        assert!(!accounts.remove_account(&alice.uid).unwrap());
        assert_eq!(accounts.active_uid().unwrap(), None);
        assert!(accounts.registered().unwrap().is_empty());
    }

    #[test]
    fn corrupt_account_list_is_reported() {
        let (backend, _dir) = setup();
        backend.store().set_pref(ACCOUNTS_LIST_KEY, "not json").unwrap();

        let err = backend.accounts().registered().unwrap_err();
        assert!(matches!(err, BackendError::CorruptPreference { .. }));
    }

    #[test]
    fn lapsed_premium_is_cleared_on_load() {
        let (backend, _dir) = setup();
        let mut alice = User::new(UserId::new("alice").unwrap(), "alice", "Alice");
        alice.is_premium = true;
        alice.premium_expiry = Some(1);
        let alice = backend.users().create(alice).unwrap();
        backend.accounts().login(&alice).unwrap();

        let current = backend.accounts().current_user().unwrap().unwrap();
        assert!(!current.is_premium);
        assert_eq!(current.premium_expiry, None);

        let stored = user_record(&backend, "alice");
        assert!(!stored.is_premium);
    }

    #[test]
    fn auth_handler_sees_initial_and_later_states() {
        let (backend, _dir) = setup();
        let alice = user(&backend, "alice");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        let sub = backend
            .accounts()
            .on_auth_state_changed(move |user| {
                log.lock().push(user.map(|u| u.uid.as_str().to_string()));
            })
            .unwrap();

        backend.accounts().login(&alice).unwrap();
        backend.accounts().logout().unwrap();
        sub.unsubscribe();
        backend.accounts().login(&alice).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![None, Some("alice".to_string()), None]
        );
    }
}
