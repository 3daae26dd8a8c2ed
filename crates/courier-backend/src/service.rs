//! The backend service.
//!
//! [`Backend`] owns the store, the configuration and both notifiers. Domain
//! operations are grouped into short-lived handles borrowed from it
//! ([`Backend::users`], [`Backend::messages`], ...), each a thin view that
//! writes through the store and then emits the matching [`Change`].

use std::sync::Arc;

use courier_store::{Record, Store};

use crate::accounts::Accounts;
use crate::admin::{Ads, Alerts, Reports};
use crate::calls::Calls;
use crate::chats::Chats;
use crate::config::BackendConfig;
use crate::messages::Messages;
use crate::notify::{AuthEvent, Change, Notifier};
use crate::snapshots::Snapshots;
use crate::stories::Stories;
use crate::stream::Stream;
use crate::users::Users;

/// The local chat backend.
///
/// Cloning is cheap; clones share the store and the notifiers.
pub struct Backend<S: Store> {
    store: Arc<S>,
    config: Arc<BackendConfig>,
    changes: Notifier<Change>,
    auth: Notifier<AuthEvent>,
}

impl<S: Store> Clone for Backend<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            changes: self.changes.clone(),
            auth: self.auth.clone(),
        }
    }
}

impl<S: Store> Backend<S> {
    /// Create a new backend.
    #[must_use]
    pub fn new(store: Arc<S>, config: BackendConfig) -> Self {
        let changes = Notifier::new(config.notify_buffer);
        let auth = Notifier::new(config.notify_buffer);
        Self {
            store,
            config: Arc::new(config),
            changes,
            auth,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, BackendConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Notifier for committed record changes.
    #[must_use]
    pub const fn changes(&self) -> &Notifier<Change> {
        &self.changes
    }

    /// Notifier for active-account changes.
    #[must_use]
    pub const fn auth_events(&self) -> &Notifier<AuthEvent> {
        &self.auth
    }

    /// Local account directory.
    #[must_use]
    pub const fn accounts(&self) -> Accounts<'_, S> {
        Accounts::new(self)
    }

    /// User collection.
    #[must_use]
    pub const fn users(&self) -> Users<'_, S> {
        Users::new(self)
    }

    /// Chat collection.
    #[must_use]
    pub const fn chats(&self) -> Chats<'_, S> {
        Chats::new(self)
    }

    /// Message collection.
    #[must_use]
    pub const fn messages(&self) -> Messages<'_, S> {
        Messages::new(self)
    }

    /// Story collection.
    #[must_use]
    pub const fn stories(&self) -> Stories<'_, S> {
        Stories::new(self)
    }

    /// Call signaling.
    #[must_use]
    pub const fn calls(&self) -> Calls<'_, S> {
        Calls::new(self)
    }

    /// The live stream singleton.
    #[must_use]
    pub const fn stream(&self) -> Stream<'_, S> {
        Stream::new(self)
    }

    /// User reports.
    #[must_use]
    pub const fn reports(&self) -> Reports<'_, S> {
        Reports::new(self)
    }

    /// Advertisement configurations.
    #[must_use]
    pub const fn ads(&self) -> Ads<'_, S> {
        Ads::new(self)
    }

    /// System alerts.
    #[must_use]
    pub const fn alerts(&self) -> Alerts<'_, S> {
        Alerts::new(self)
    }

    /// Chat snapshots.
    #[must_use]
    pub const fn snapshots(&self) -> Snapshots<'_, S> {
        Snapshots::new(self)
    }

    pub(crate) fn emit(&self, change: Change) {
        tracing::trace!(
            collection = %change.collection,
            key = %change.key,
            "record changed"
        );
        self.changes.notify(change);
    }

    pub(crate) fn emit_record<R: Record>(&self, record: &R) {
        self.emit(Change::new(R::COLLECTION, record.key()));
    }

    pub(crate) fn emit_auth(&self, event: AuthEvent) {
        self.auth.notify(event);
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.config.cas_attempts
    }
}

impl<S: Store> std::fmt::Debug for Backend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("config", &self.config)
            .field("changes", &self.changes)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}
