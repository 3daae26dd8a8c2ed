//! Call status state machine.
//!
//! # State Machine
//!
//! ```text
//!     ┌──────────┐  (answer)   ┌───────────┐
//!     │ Ringing  │────────────▶│ Connected │
//!     └────┬─────┘             └─────┬─────┘
//!          │                         │
//!          │ (decline)     (hang up) │
//!          ▼                         ▼
//!     ┌──────────┐             ┌───────────┐
//!     │ Rejected │             │   Ended   │◀── (cancel, from Ringing)
//!     └──────────┘             └───────────┘
//! ```
//!
//! `Ended` and `Rejected` are absorbing.

use courier_core::CallId;
use courier_store::CallStatus;

use crate::error::{BackendError, Result};

/// Validates a status change and returns the target status if valid.
///
/// # Errors
///
/// Returns `BackendError::InvalidTransition` if the change is not allowed.
pub fn validate_transition(call_id: &CallId, from: CallStatus, to: CallStatus) -> Result<CallStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(BackendError::InvalidTransition {
            call_id: call_id.clone(),
            from,
            to,
        })
    }
}

/// Check if a status change is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: CallStatus, to: CallStatus) -> bool {
    use CallStatus::{Connected, Ended, Rejected, Ringing};

    matches!(
        (from, to),
        (Ringing, Connected | Rejected | Ended) | (Connected, Ended)
    )
}

/// Returns the list of valid target statuses from the given status.
#[must_use]
pub fn valid_transitions_from(status: CallStatus) -> Vec<CallStatus> {
    use CallStatus::{Connected, Ended, Rejected, Ringing};

    match status {
        Ringing => vec![Connected, Rejected, Ended],
        Connected => vec![Ended],
        Ended | Rejected => Vec::new(),
    }
}

/// Returns true if the call is over.
#[must_use]
pub const fn is_terminal(status: CallStatus) -> bool {
    matches!(status, CallStatus::Ended | CallStatus::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CallStatus; 4] = [
        CallStatus::Ringing,
        CallStatus::Connected,
        CallStatus::Ended,
        CallStatus::Rejected,
    ];

    #[test]
    fn valid_transitions() {
        use CallStatus::*;

        assert!(is_valid_transition(Ringing, Connected));
        assert!(is_valid_transition(Ringing, Rejected));
        assert!(is_valid_transition(Ringing, Ended));
        assert!(is_valid_transition(Connected, Ended));
    }

    #[test]
    fn invalid_transitions() {
        use CallStatus::*;

        // No going back to ringing
        assert!(!is_valid_transition(Connected, Ringing));
        // Only a ringing call can be declined
        assert!(!is_valid_transition(Connected, Rejected));
        assert!(!is_valid_transition(Ended, Connected));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for from in ALL.into_iter().filter(|s| is_terminal(*s)) {
            for to in ALL {
                assert!(!is_valid_transition(from, to), "{from:?} -> {to:?}");
            }
            assert!(valid_transitions_from(from).is_empty());
        }
    }

    #[test]
    fn transition_list_matches_predicate() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    valid_transitions_from(from).contains(&to),
                    is_valid_transition(from, to)
                );
            }
        }
    }

    #[test]
    fn validate_transition_err() {
        let call_id = CallId::new("call1").unwrap();
        let result = validate_transition(&call_id, CallStatus::Ended, CallStatus::Connected);

        match result {
            Err(BackendError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, CallStatus::Ended);
                assert_eq!(to, CallStatus::Connected);
            }
            _ => panic!("expected InvalidTransition error"),
        }
    }
}
