//! `PlanFSM` (C2): stateless validator for plan status transitions.
//!
//! The FSM itself never persists anything; callers apply the returned new
//! status through `PlanStore`. Grounded in a closed, table-driven status
//! model (`domain::models::task::TaskStatus` transitions), generalized to
//! plans.

use crate::domain::errors::{KasmosError, KasmosResult};
use crate::domain::models::PlanStatus;

/// Events the `PlanFSM` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEvent {
    /// `ready -> planning`.
    Start,
    /// `ready|planning -> implementing`.
    ImplementStart,
    /// `implementing -> reviewing`.
    ImplementDone,
    /// `reviewing -> done`.
    ReviewApproved,
    /// Any non-terminal status -> `cancelled`.
    Cancel,
    /// Not in the accepted-transition table for any status; reserved for
    /// future reopening semantics, always rejected today.
    Reopen,
}

impl PlanEvent {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::ImplementStart => "ImplementStart",
            Self::ImplementDone => "ImplementDone",
            Self::ReviewApproved => "ReviewApproved",
            Self::Cancel => "Cancel",
            Self::Reopen => "Reopen",
        }
    }
}

/// Stateless plan status transition validator.
///
/// The historical bug this guards against: treating `done` as non-terminal
/// let `ReviewApproved` on an already-done plan re-spawn a reviewer in a
/// loop. `done` is strictly terminal here: every event against it, including
/// `ReviewApproved`, returns `IllegalTransition`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanFsm;

impl PlanFsm {
    /// Construct the (stateless, zero-sized) FSM.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Apply `event` to `current`, returning the new status or
    /// `IllegalTransition`. Total over every `(PlanStatus, PlanEvent)` pair.
    pub fn apply(self, current: PlanStatus, event: PlanEvent) -> KasmosResult<PlanStatus> {
        use PlanEvent::{Cancel, ImplementDone, ImplementStart, Reopen, ReviewApproved, Start};
        use PlanStatus::{Cancelled, Done, Implementing, Planning, Ready, Reviewing};

        let next = match (current, event) {
            (Ready, Start) => Some(Planning),
            (Ready, ImplementStart) | (Planning, ImplementStart) => Some(Implementing),
            (Implementing, ImplementDone) => Some(Reviewing),
            (Reviewing, ReviewApproved) => Some(Done),
            (Ready | Planning | Implementing | Reviewing, Cancel) => Some(Cancelled),
            (Done | Cancelled, Reopen) => None,
            _ => None,
        };

        next.ok_or(KasmosError::IllegalTransition {
            from: current.to_string(),
            event: event.as_str().to_string(),
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = PlanStatus> {
        prop_oneof![
            Just(PlanStatus::Ready),
            Just(PlanStatus::Planning),
            Just(PlanStatus::Implementing),
            Just(PlanStatus::Reviewing),
            Just(PlanStatus::Done),
            Just(PlanStatus::Cancelled),
        ]
    }

    fn any_event() -> impl Strategy<Value = PlanEvent> {
        prop_oneof![
            Just(PlanEvent::Start),
            Just(PlanEvent::ImplementStart),
            Just(PlanEvent::ImplementDone),
            Just(PlanEvent::ReviewApproved),
            Just(PlanEvent::Cancel),
            Just(PlanEvent::Reopen),
        ]
    }

    proptest! {
        /// Terminal statuses reject every event, and `apply` never panics
        /// for any (status, event) pair proptest generates.
        #[test]
        fn terminal_statuses_reject_every_event(status in any_status(), event in any_event()) {
            let fsm = PlanFsm::new();
            let result = fsm.apply(status, event);
            if status.is_terminal() {
                prop_assert!(result.is_err());
            }
        }

        /// Every successful transition lands on a non-terminal status unless
        /// it was `ReviewApproved` (-> `Done`) or `Cancel` (-> `Cancelled`).
        #[test]
        fn successful_transitions_match_the_event(status in any_status(), event in any_event()) {
            let fsm = PlanFsm::new();
            if let Ok(next) = fsm.apply(status, event) {
                match event {
                    PlanEvent::Cancel => prop_assert_eq!(next, PlanStatus::Cancelled),
                    PlanEvent::ReviewApproved => prop_assert_eq!(next, PlanStatus::Done),
                    PlanEvent::ImplementDone => prop_assert_eq!(next, PlanStatus::Reviewing),
                    PlanEvent::ImplementStart => prop_assert_eq!(next, PlanStatus::Implementing),
                    PlanEvent::Start => prop_assert_eq!(next, PlanStatus::Planning),
                    PlanEvent::Reopen => prop_assert!(false, "Reopen never succeeds today"),
                }
            }
        }
    }
}
