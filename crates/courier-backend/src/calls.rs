//! Call signaling.
//!
//! A call record is the rendezvous for two peers: the caller writes the SDP
//! offer and its ICE candidates, the receiver the answer and its own
//! candidates. Status changes follow [`crate::lifecycle`].

use courier_core::{CallId, UserId};
use courier_store::{CallSession, CallStatus, Collection, RecordStore, Store, StoreError};

use crate::error::{BackendError, Result};
use crate::lifecycle;
use crate::service::Backend;

/// Which side of a call a signaling payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSide {
    /// The initiating user.
    Caller,
    /// The called user.
    Receiver,
}

/// Handle to call signaling.
pub struct Calls<'a, S: Store> {
    backend: &'a Backend<S>,
}

impl<'a, S: Store> Calls<'a, S> {
    pub(crate) const fn new(backend: &'a Backend<S>) -> Self {
        Self { backend }
    }

    /// Store a new call. Its status is forced to ringing.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::AlreadyExists` if the call id is taken.
    pub fn initiate(&self, mut call: CallSession) -> Result<CallSession> {
        call.status = CallStatus::Ringing;
        match self.backend.store().insert(&call) {
            Ok(_) => {}
            Err(StoreError::ConcurrentModification { collection, key }) => {
                return Err(BackendError::AlreadyExists { collection, key });
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            call_id = %call.id,
            caller = %call.caller_id,
            receiver = %call.receiver_id,
            kind = ?call.kind,
            "call initiated"
        );
        self.backend.emit_record(&call);
        Ok(call)
    }

    /// Get a call by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn get(&self, id: &CallId) -> Result<Option<CallSession>> {
        Ok(self.backend.store().get(id.as_str())?)
    }

    /// Move a call to another status.
    ///
    /// Setting the current status again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such call, or
    /// `BackendError::InvalidTransition` if the state machine forbids it.
    pub fn update_status(&self, id: &CallId, status: CallStatus) -> Result<CallSession> {
        let current = self
            .get(id)?
            .ok_or_else(|| BackendError::not_found(Collection::Calls, id.as_str()))?;
        if current.status == status {
            return Ok(current);
        }

        let call = self.update(id, |call| {
            call.status = lifecycle::validate_transition(id, call.status, status)?;
            Ok(())
        })?;
        tracing::info!(call_id = %id, status = ?status, "call status changed");
        Ok(call)
    }

    /// Record one side's session description.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such call.
    pub fn set_sdp(&self, id: &CallId, side: CallSide, sdp: &str) -> Result<CallSession> {
        self.update(id, |call| {
            let slot = match side {
                CallSide::Caller => &mut call.sdp_offer,
                CallSide::Receiver => &mut call.sdp_answer,
            };
            *slot = Some(sdp.to_string());
            Ok(())
        })
    }

    /// Append one side's ICE candidate. Candidates keep arrival order.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::RecordNotFound` if there is no such call.
    pub fn add_candidate(&self, id: &CallId, side: CallSide, candidate: &str) -> Result<CallSession> {
        self.update(id, |call| {
            match side {
                CallSide::Caller => call.caller_candidates.push(candidate.to_string()),
                CallSide::Receiver => call.receiver_candidates.push(candidate.to_string()),
            }
            Ok(())
        })
    }

    /// Calls involving `uid` that are not over yet, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn active_calls(&self, uid: &UserId) -> Result<Vec<CallSession>> {
        let mut calls: Vec<CallSession> = self
            .backend
            .store()
            .list::<CallSession>()?
            .into_iter()
            .filter(|call| call.involves(uid) && !lifecycle::is_terminal(call.status))
            .collect();
        calls.sort_by_key(|call| call.timestamp);
        Ok(calls)
    }

    /// Ringing calls addressed to `uid`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn incoming(&self, uid: &UserId) -> Result<Vec<CallSession>> {
        Ok(self
            .active_calls(uid)?
            .into_iter()
            .filter(|call| call.receiver_id == *uid && call.status == CallStatus::Ringing)
            .collect())
    }

    fn update<F>(&self, id: &CallId, mutate: F) -> Result<CallSession>
    where
        F: FnMut(&mut CallSession) -> Result<()>,
    {
        let call: CallSession = self
            .backend
            .store()
            .update(id.as_str(), self.backend.attempts(), mutate)?;
        self.backend.emit_record(&call);
        Ok(call)
    }
}
