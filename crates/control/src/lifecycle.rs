//! # Presale Lifecycle Model
//!
//! Local mirror of the contract's two lifecycle flags plus the
//! transition vocabulary the controller accepts.
//!
//! ```text
//!            SetLive(true)
//!   paused ───────────────▶ live
//!     ▲  │◀─────────────── │  │
//!     │  │  SetLive(false)    │
//!     │  └───────┐   ┌────────┘
//!     │          ▼   ▼
//!     │        finalized (terminal)
//! ```
//!
//! `finalized` is terminal: no transition is offered or accepted once
//! it is set, whatever `live` says.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

// ════════════════════════════════════════════════════════════════════════════════
// LIFECYCLE STATE
// ════════════════════════════════════════════════════════════════════════════════

/// The contract's lifecycle flags as last observed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresaleLifecycleState {
    /// Accepting contributions.
    pub live: bool,
    /// Permanently closed.
    pub finalized: bool,
}

impl PresaleLifecycleState {
    pub fn new(live: bool, finalized: bool) -> Self {
        Self { live, finalized }
    }

    /// Transitions an operator may pick from this state.
    ///
    /// The live toggle is always the complement of `live`. Empty once
    /// finalized.
    pub fn offered_transitions(&self) -> Vec<TransitionRequest> {
        if self.finalized {
            return Vec::new();
        }
        vec![TransitionRequest::SetLive(!self.live), TransitionRequest::Finalize]
    }

    /// Checks the request's precondition against this state.
    pub fn check(&self, request: TransitionRequest) -> Result<(), ControlError> {
        if self.finalized {
            return Err(ControlError::AlreadyFinalized);
        }
        match request {
            TransitionRequest::SetLive(true) if self.live => Err(
                ControlError::PreconditionFailed("Presale is already live".to_string()),
            ),
            TransitionRequest::SetLive(false) if !self.live => Err(
                ControlError::PreconditionFailed("Presale is already paused".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// State after `request` confirms.
    pub fn apply(&self, request: TransitionRequest) -> Self {
        match request {
            TransitionRequest::SetLive(live) => Self { live, ..*self },
            TransitionRequest::Finalize => Self {
                finalized: true,
                ..*self
            },
        }
    }
}

impl fmt::Display for PresaleLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.finalized, self.live) {
            (true, _) => write!(f, "finalized"),
            (false, true) => write!(f, "live"),
            (false, false) => write!(f, "paused"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TRANSITION REQUEST
// ════════════════════════════════════════════════════════════════════════════════

/// A lifecycle change the operator asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionRequest {
    /// `setLive(bool)` on the contract.
    SetLive(bool),
    /// `finalize()` on the contract. Irreversible.
    Finalize,
}

impl TransitionRequest {
    /// Operator-facing control label.
    pub fn label(&self) -> &'static str {
        match self {
            TransitionRequest::SetLive(true) => "Start Presale",
            TransitionRequest::SetLive(false) => "Pause Presale",
            TransitionRequest::Finalize => "Finalize Presale",
        }
    }

    /// Irreversible requests need a separate confirmation.
    pub fn is_destructive(&self) -> bool {
        matches!(self, TransitionRequest::Finalize)
    }

    pub(crate) fn starting_message(&self) -> &'static str {
        match self {
            TransitionRequest::SetLive(true) => "Starting presale...",
            TransitionRequest::SetLive(false) => "Pausing presale...",
            TransitionRequest::Finalize => "Finalizing presale...",
        }
    }

    pub(crate) fn success_message(&self) -> &'static str {
        match self {
            TransitionRequest::SetLive(true) => "Presale is now live",
            TransitionRequest::SetLive(false) => "Presale paused",
            TransitionRequest::Finalize => "Presale finalized",
        }
    }
}

impl fmt::Display for TransitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionRequest::SetLive(live) => write!(f, "setLive({})", live),
            TransitionRequest::Finalize => write!(f, "finalize()"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TRANSITION PHASE
// ════════════════════════════════════════════════════════════════════════════════

/// Where the in-flight request (if any) currently is.
///
/// `Confirmed` and `Rejected` are transient; the controller always
/// returns to `Idle` when the request finishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionPhase {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offered_toggle_is_complement_of_live() {
        for live in [false, true] {
            let state = PresaleLifecycleState::new(live, false);
            let offered = state.offered_transitions();
            assert_eq!(offered, vec![TransitionRequest::SetLive(!live), TransitionRequest::Finalize]);
            assert!(!offered.contains(&TransitionRequest::SetLive(live)));
        }
    }

    #[test]
    fn nothing_offered_once_finalized() {
        for live in [false, true] {
            let state = PresaleLifecycleState::new(live, true);
            assert!(state.offered_transitions().is_empty());
            for req in [
                TransitionRequest::SetLive(true),
                TransitionRequest::SetLive(false),
                TransitionRequest::Finalize,
            ] {
                assert_eq!(state.check(req), Err(ControlError::AlreadyFinalized));
            }
        }
    }

    #[test]
    fn redundant_toggle_fails_precondition() {
        let live = PresaleLifecycleState::new(true, false);
        assert!(matches!(
            live.check(TransitionRequest::SetLive(true)),
            Err(ControlError::PreconditionFailed(_))
        ));
        assert!(live.check(TransitionRequest::SetLive(false)).is_ok());

        let paused = PresaleLifecycleState::default();
        assert!(matches!(
            paused.check(TransitionRequest::SetLive(false)),
            Err(ControlError::PreconditionFailed(_))
        ));
        assert!(paused.check(TransitionRequest::Finalize).is_ok());
    }

    #[test]
    fn apply_sets_only_the_requested_flag() {
        let paused = PresaleLifecycleState::default();
        assert_eq!(
            paused.apply(TransitionRequest::SetLive(true)),
            PresaleLifecycleState::new(true, false)
        );
        let live = PresaleLifecycleState::new(true, false);
        assert_eq!(
            live.apply(TransitionRequest::Finalize),
            PresaleLifecycleState::new(true, true)
        );
    }

    #[test]
    fn labels_and_display() {
        assert_eq!(TransitionRequest::SetLive(true).label(), "Start Presale");
        assert_eq!(TransitionRequest::SetLive(false).label(), "Pause Presale");
        assert!(TransitionRequest::Finalize.is_destructive());
        assert!(!TransitionRequest::SetLive(true).is_destructive());
        assert_eq!(PresaleLifecycleState::new(true, true).to_string(), "finalized");
        assert_eq!(TransitionRequest::SetLive(false).to_string(), "setLive(false)");
    }
}
