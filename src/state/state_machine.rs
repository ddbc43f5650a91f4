use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Phases a session moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Teams are joining; no round exists yet.
    Lobby,
    /// Teams write answers to their group's prompt.
    Answer,
    /// Teams vote on the answers of each group.
    Vote,
    /// Round results are displayed.
    Results,
    /// The session is over.
    Ended,
}

impl SessionPhase {
    /// Whether a game is in progress.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            SessionPhase::Answer | SessionPhase::Vote | SessionPhase::Results
        )
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts the game from the lobby.
    StartGame,
    /// Answer window closes; voting opens.
    CloseAnswers,
    /// Voting closes; results are computed.
    CloseVoting,
    /// Results were shown and another round remains.
    NextRound,
    /// Results were shown for the last round.
    Finish,
    /// Host ends the session from any phase.
    EndSession,
}

impl SessionEvent {
    /// Event that moves a running session forward from `phase`.
    pub fn advance_from(phase: SessionPhase, has_next_round: bool) -> Option<Self> {
        match phase {
            SessionPhase::Answer => Some(SessionEvent::CloseAnswers),
            SessionPhase::Vote => Some(SessionEvent::CloseVoting),
            SessionPhase::Results if has_next_round => Some(SessionEvent::NextRound),
            SessionPhase::Results => Some(SessionEvent::Finish),
            SessionPhase::Lobby | SessionPhase::Ended => None,
        }
    }
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The caller's expected phase is not the current one.
    Stale {
        /// Phase the caller observed.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a plan to a newer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// Phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when the plan was created.
        expected: SessionPhase,
        /// Current phase.
        actual: SessionPhase,
    },
    /// Same phase, but other transitions were committed in between.
    VersionMismatch {
        /// Phase shared by the plan and the current state.
        phase: SessionPhase,
        /// Version the plan was computed against.
        expected: u64,
        /// Current version.
        actual: u64,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A validated transition that has not been applied yet.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan, used in logs.
    pub id: PlanId,
    /// Phase the plan was computed from.
    pub from: SessionPhase,
    /// Phase after applying the plan.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
    /// Version number after applying this transition.
    pub version_next: u64,
    /// Timestamp when this plan was created.
    pub planned_at: SystemTime,
}

/// Phase controller for one session.
///
/// Plans are computed against the committed state without holding the session gate, then applied
/// to the draft under the gate. A plan whose phase or version no longer matches is rejected, so two
/// callers racing from the same observed phase produce exactly one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: u64,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Lobby,
            version: 0,
        }
    }
}

impl SessionStateMachine {
    /// Create a state machine for a fresh session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the machine from a committed phase and version.
    pub fn at(phase: SessionPhase, version: u64) -> Self {
        Self { phase, version }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Inspect the current version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Validate `event` against the current phase, optionally guarded by the phase the caller
    /// believes is current.
    pub fn plan(&self, event: SessionEvent, guard: Option<SessionPhase>) -> Result<Plan, PlanError> {
        if let Some(expected) = guard
            && expected != self.phase
        {
            return Err(PlanError::Stale {
                expected,
                actual: self.phase,
            });
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        Ok(Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            planned_at: SystemTime::now(),
        })
    }

    /// Apply a plan, returning the new phase.
    pub fn apply(&mut self, plan: &Plan) -> Result<SessionPhase, ApplyError> {
        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                phase: self.phase,
                expected: plan.version_next - 1,
                actual: self.version,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;
        Ok(self.phase)
    }

    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Lobby, SessionEvent::StartGame) => SessionPhase::Answer,
            (SessionPhase::Answer, SessionEvent::CloseAnswers) => SessionPhase::Vote,
            (SessionPhase::Vote, SessionEvent::CloseVoting) => SessionPhase::Results,
            (SessionPhase::Results, SessionEvent::NextRound) => SessionPhase::Answer,
            (SessionPhase::Results, SessionEvent::Finish) => SessionPhase::Ended,
            (from, SessionEvent::EndSession) if from != SessionPhase::Ended => SessionPhase::Ended,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionStateMachine, event: SessionEvent) -> SessionPhase {
        let plan = sm.plan(event, None).unwrap();
        sm.apply(&plan).unwrap()
    }

    #[test]
    fn initial_state_is_lobby() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Lobby);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn two_rounds_then_finish() {
        let mut sm = SessionStateMachine::new();

        assert_eq!(apply(&mut sm, SessionEvent::StartGame), SessionPhase::Answer);
        assert_eq!(apply(&mut sm, SessionEvent::CloseAnswers), SessionPhase::Vote);
        assert_eq!(apply(&mut sm, SessionEvent::CloseVoting), SessionPhase::Results);
        assert_eq!(apply(&mut sm, SessionEvent::NextRound), SessionPhase::Answer);
        assert_eq!(apply(&mut sm, SessionEvent::CloseAnswers), SessionPhase::Vote);
        assert_eq!(apply(&mut sm, SessionEvent::CloseVoting), SessionPhase::Results);
        assert_eq!(apply(&mut sm, SessionEvent::Finish), SessionPhase::Ended);
        assert_eq!(sm.version(), 7);
    }

    #[test]
    fn end_is_allowed_from_every_live_phase() {
        for phase in [
            SessionPhase::Lobby,
            SessionPhase::Answer,
            SessionPhase::Vote,
            SessionPhase::Results,
        ] {
            let mut sm = SessionStateMachine::at(phase, 3);
            assert_eq!(apply(&mut sm, SessionEvent::EndSession), SessionPhase::Ended);
        }

        let sm = SessionStateMachine::at(SessionPhase::Ended, 3);
        assert!(sm.plan(SessionEvent::EndSession, None).is_err());
    }

    #[test]
    fn advance_event_depends_on_remaining_rounds() {
        assert_eq!(
            SessionEvent::advance_from(SessionPhase::Results, true),
            Some(SessionEvent::NextRound)
        );
        assert_eq!(
            SessionEvent::advance_from(SessionPhase::Results, false),
            Some(SessionEvent::Finish)
        );
        assert_eq!(SessionEvent::advance_from(SessionPhase::Lobby, true), None);
    }

    #[test]
    fn invalid_transition_returns_error() {
        let sm = SessionStateMachine::new();
        let err = sm.plan(SessionEvent::CloseVoting, None).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, SessionPhase::Lobby);
                assert_eq!(invalid.event, SessionEvent::CloseVoting);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn guard_rejects_stale_callers() {
        let sm = SessionStateMachine::at(SessionPhase::Vote, 2);
        let err = sm
            .plan(SessionEvent::CloseAnswers, Some(SessionPhase::Answer))
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::Stale {
                expected: SessionPhase::Answer,
                actual: SessionPhase::Vote,
            }
        );
    }

    #[test]
    fn second_plan_from_same_phase_fails_to_apply() {
        let committed = SessionStateMachine::at(SessionPhase::Answer, 1);
        let first = committed.plan(SessionEvent::CloseAnswers, None).unwrap();
        let second = committed.plan(SessionEvent::CloseAnswers, None).unwrap();

        let mut draft = committed.clone();
        draft.apply(&first).unwrap();

        let err = draft.apply(&second).unwrap_err();
        assert_eq!(
            err,
            ApplyError::PhaseMismatch {
                expected: SessionPhase::Answer,
                actual: SessionPhase::Vote,
            }
        );
    }

    #[test]
    fn version_catches_a_full_lap_back_to_the_same_phase() {
        let committed = SessionStateMachine::at(SessionPhase::Results, 3);
        let stale = committed.plan(SessionEvent::NextRound, None).unwrap();

        let mut draft = committed.clone();
        apply(&mut draft, SessionEvent::NextRound);
        apply(&mut draft, SessionEvent::CloseAnswers);
        apply(&mut draft, SessionEvent::CloseVoting);

        match draft.apply(&stale).unwrap_err() {
            ApplyError::VersionMismatch {
                phase,
                expected,
                actual,
            } => {
                assert_eq!(phase, SessionPhase::Results);
                assert_eq!(expected, 3);
                assert_eq!(actual, 6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
