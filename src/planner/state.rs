//! Per-query state machine
//!
//! Valid transitions:
//! 1. Received          → FilterConstructed (on: FilterReady)
//! 2. FilterConstructed → Retrieved         (on: ResultsReturned)
//! 3. Retrieved         → Synthesized       (on: AnswerGenerated)
//! 4. Retrieved         → Done              (on: Finish, retrieval-only queries)
//! 5. Synthesized       → Done              (on: Finish)
//! 6. any non-terminal  → Failed            (on: StepFailed)
//! 7. Done and Failed absorb every event

use serde::{Deserialize, Serialize};

use crate::errors::{RagError, Result};
use crate::types::PipelineStep;

/// Query lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Query accepted, nothing done yet
    Received,
    /// Filter decided (possibly none)
    FilterConstructed,
    /// Store returned results
    Retrieved,
    /// Answer generated from context
    Synthesized,
    /// Completed successfully (terminal)
    Done,
    /// A step failed (terminal)
    Failed,
}

/// Events that drive [`QueryState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
    FilterReady,
    ResultsReturned,
    AnswerGenerated,
    Finish,
    StepFailed,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Done | QueryState::Failed)
    }

    /// Attempt a transition
    pub fn transition(&self, event: QueryEvent) -> Result<QueryState> {
        use QueryEvent::*;
        use QueryState::*;

        let next = match (self, event) {
            (Done, _) => Done,
            (Failed, _) => Failed,
            (_, StepFailed) => Failed,

            (Received, FilterReady) => FilterConstructed,
            (FilterConstructed, ResultsReturned) => Retrieved,
            (Retrieved, AnswerGenerated) => Synthesized,
            (Retrieved, Finish) => Done,
            (Synthesized, Finish) => Done,

            (from, event) => {
                return Err(RagError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    /// Events accepted in this state
    pub fn valid_events(&self) -> Vec<QueryEvent> {
        use QueryEvent::*;
        use QueryState::*;

        match self {
            Received => vec![FilterReady, StepFailed],
            FilterConstructed => vec![ResultsReturned, StepFailed],
            Retrieved => vec![AnswerGenerated, Finish, StepFailed],
            Synthesized => vec![Finish, StepFailed],
            Done | Failed => Vec::new(),
        }
    }

    /// Step that runs next from this state; `None` once terminal
    pub fn pending_step(&self) -> Option<PipelineStep> {
        match self {
            QueryState::Received => Some(PipelineStep::FilterConstruction),
            QueryState::FilterConstructed => Some(PipelineStep::Retrieve),
            QueryState::Retrieved | QueryState::Synthesized => Some(PipelineStep::Synthesize),
            QueryState::Done | QueryState::Failed => None,
        }
    }

    /// Human-readable state name
    pub fn display_name(&self) -> &'static str {
        match self {
            QueryState::Received => "Received",
            QueryState::FilterConstructed => "Filter Constructed",
            QueryState::Retrieved => "Retrieved",
            QueryState::Synthesized => "Synthesized",
            QueryState::Done => "Done",
            QueryState::Failed => "Failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [QueryState; 6] = [
        QueryState::Received,
        QueryState::FilterConstructed,
        QueryState::Retrieved,
        QueryState::Synthesized,
        QueryState::Done,
        QueryState::Failed,
    ];

    const ALL_EVENTS: [QueryEvent; 5] = [
        QueryEvent::FilterReady,
        QueryEvent::ResultsReturned,
        QueryEvent::AnswerGenerated,
        QueryEvent::Finish,
        QueryEvent::StepFailed,
    ];

    #[test]
    fn test_happy_path() {
        let mut state = QueryState::Received;
        for event in [
            QueryEvent::FilterReady,
            QueryEvent::ResultsReturned,
            QueryEvent::AnswerGenerated,
            QueryEvent::Finish,
        ] {
            state = state.transition(event).unwrap();
        }
        assert_eq!(state, QueryState::Done);
    }

    #[test]
    fn test_retrieval_only_path() {
        let state = QueryState::Retrieved.transition(QueryEvent::Finish).unwrap();
        assert_eq!(state, QueryState::Done);
    }

    #[test]
    fn test_failure_from_any_live_state() {
        for state in ALL_STATES.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(state.transition(QueryEvent::StepFailed).unwrap(), QueryState::Failed);
        }
    }

    #[test]
    fn test_terminal_states_absorb() {
        for event in ALL_EVENTS {
            assert_eq!(QueryState::Done.transition(event).unwrap(), QueryState::Done);
            assert_eq!(QueryState::Failed.transition(event).unwrap(), QueryState::Failed);
        }
    }

    #[test]
    fn test_skipping_steps_rejected() {
        assert!(QueryState::Received.transition(QueryEvent::ResultsReturned).is_err());
        assert!(QueryState::FilterConstructed.transition(QueryEvent::AnswerGenerated).is_err());
        assert!(QueryState::Received.transition(QueryEvent::Finish).is_err());
    }

    #[test]
    fn test_pending_step() {
        assert_eq!(QueryState::Received.pending_step(), Some(PipelineStep::FilterConstruction));
        assert_eq!(QueryState::FilterConstructed.pending_step(), Some(PipelineStep::Retrieve));
        assert_eq!(QueryState::Retrieved.pending_step(), Some(PipelineStep::Synthesize));
        assert_eq!(QueryState::Done.pending_step(), None);
        assert_eq!(QueryState::Failed.pending_step(), None);
    }

    #[test]
    fn test_valid_events_agree_with_transition() {
        for state in ALL_STATES {
            for event in ALL_EVENTS {
                let listed = state.valid_events().contains(&event);
                if !state.is_terminal() {
                    assert_eq!(listed, state.transition(event).is_ok(), "{:?} on {:?}", state, event);
                }
            }
        }
    }
}
