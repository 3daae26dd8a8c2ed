//! The live stream singleton.
//!
//! There is at most one broadcast at a time, stored under
//! [`STREAM_KEY`]. Every operation except [`Stream::start`] requires it to
//! exist.

use courier_core::{time, UserId};
use courier_store::{
    Collection, Guest, JoinRequest, LiveStream, RecordStore, Store, StreamMessage, STREAM_KEY,
};

use crate::error::{BackendError, Result};
use crate::notify::Change;
use crate::service::Backend;

/// Handle to the live stream.
pub struct Stream<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Stream<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// The current broadcast, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get(&self) -> Result<Option<LiveStream>> {
        Ok(self.backend.store().get(STREAM_KEY)?)
    }

    /// Start a fresh broadcast, replacing whatever was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn start(&self, title: &str, host_id: &UserId) -> Result<LiveStream> {
        let stream = LiveStream::started(title, host_id.clone(), time::now_millis());
        self.backend.store().put(&stream)?;
        tracing::info!(host = %host_id, title, "stream started");
        self.backend.emit_record(&stream);
        Ok(stream)
    }

    /// End the broadcast, returning whether one was running.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn stop(&self) -> Result<bool> {
        let existed = self.backend.store().delete::<LiveStream>(STREAM_KEY)?;
        if existed {
            tracing::info!("stream stopped");
            self.backend.emit(Change::new(Collection::Stream, STREAM_KEY));
        }
        Ok(existed)
    }

    /// Apply a change to the broadcast and notify.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if no broadcast is running, or
    /// whatever `mutate` returns.
    pub fn update<F>(&self, mutate: F) -> Result<LiveStream>
    where
        F: FnMut(&mut LiveStream) -> Result<()>,
    {
        let stream: LiveStream = self
            .backend
            .store()
            .update(STREAM_KEY, self.backend.attempts(), mutate)?;
        self.backend.emit_record(&stream);
        Ok(stream)
    }

    /// Queue a join request. A user has at most one pending request.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if no broadcast is running.
    pub fn add_request(&self, request: JoinRequest) -> Result<LiveStream> {
        self.update(|stream| {
            if !stream.requests.iter().any(|r| r.user_id == request.user_id) {
                stream.requests.push(request.clone());
            }
            Ok(())
        })
    }

    /// Drop `uid`'s pending join request.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if no broadcast is running.
    pub fn remove_request(&self, uid: &UserId) -> Result<LiveStream> {
        self.update(|stream| {
            stream.requests.retain(|r| r.user_id != *uid);
            Ok(())
        })
    }

    /// Post to the stream chat.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::StreamChatDisabled` if the host closed the
    /// chat, or `BackendError::RecordNotFound` if no broadcast is running.
    pub fn add_message(&self, message: StreamMessage) -> Result<LiveStream> {
        self.update(|stream| {
            if stream.chat_disabled {
                return Err(BackendError::StreamChatDisabled);
            }
            stream.messages.push(message.clone());
            Ok(())
        })
    }

    /// Put a viewer on stage, or clear the stage with `None`.
    ///
    /// An accepted guest's join request is removed.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if no broadcast is running.
    pub fn set_guest(&self, guest: Option<Guest>) -> Result<LiveStream> {
        self.update(|stream| {
            if let Some(guest) = &guest {
                stream.requests.retain(|r| r.user_id != guest.user_id);
            }
            stream.guest.clone_from(&guest);
            Ok(())
        })
    }

    /// Open or close the stream chat.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if no broadcast is running.
    pub fn set_chat_disabled(&self, disabled: bool) -> Result<LiveStream> {
        self.update(|stream| {
            stream.chat_disabled = disabled;
            Ok(())
        })
    }

    /// Count a viewer in.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if no broadcast is running.
    pub fn join(&self) -> Result<LiveStream> {
        self.update(|stream| {
            stream.viewers_count = stream.viewers_count.saturating_add(1);
            Ok(())
        })
    }

    /// Count a viewer out.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if no broadcast is running.
    pub fn leave(&self) -> Result<LiveStream> {
        self.update(|stream| {
            stream.viewers_count = stream.viewers_count.saturating_sub(1);
            Ok(())
        })
    }
}
