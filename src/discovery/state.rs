use crate::core::error::DiscoveryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Querying,
    Enriching,
    Filtering,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Querying may jump straight to Done when the search finds nothing.
    /// Failed is reachable from every non-terminal state.
    pub fn advance(self, next: RunState) -> Result<RunState, DiscoveryError> {
        use RunState::*;
        let legal = match (self, next) {
            (Querying, Enriching) | (Querying, Done) => true,
            (Enriching, Filtering) => true,
            (Filtering, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        };
        if legal {
            Ok(next)
        } else {
            Err(DiscoveryError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

#[derive(Debug)]
pub struct RunTracker {
    state: RunState,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl RunTracker {
    pub fn start() -> Self {
        Self {
            state: RunState::Querying,
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    pub fn advance(&mut self, next: RunState) -> Result<(), DiscoveryError> {
        let from = self.state;
        self.state = from.advance(next)?;
        debug!(?from, to = ?next, "discovery run transition");
        Ok(())
    }

    pub fn fail(&mut self, cause: &DiscoveryError) {
        let from = self.state;
        match from.advance(RunState::Failed) {
            Ok(state) => self.state = state,
            Err(e) => error!(?e, "failing an already finished run"),
        }
        error!(?from, error = %cause, "discovery run failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let s = RunState::Querying;
        let s = s.advance(RunState::Enriching).unwrap();
        let s = s.advance(RunState::Filtering).unwrap();
        let s = s.advance(RunState::Done).unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn test_empty_query_short_circuits_to_done() {
        assert_eq!(
            RunState::Querying.advance(RunState::Done).unwrap(),
            RunState::Done
        );
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        for s in [RunState::Querying, RunState::Enriching, RunState::Filtering] {
            assert_eq!(s.advance(RunState::Failed).unwrap(), RunState::Failed);
        }
        assert!(RunState::Done.advance(RunState::Failed).is_err());
        assert!(RunState::Failed.advance(RunState::Failed).is_err());
    }

    #[test]
    fn test_skipping_stages_is_illegal() {
        assert!(RunState::Querying.advance(RunState::Filtering).is_err());
        assert!(RunState::Enriching.advance(RunState::Done).is_err());
        assert!(RunState::Done.advance(RunState::Querying).is_err());
    }

    #[test]
    fn test_tracker_records_failure() {
        let mut run = RunTracker::start();
        run.advance(RunState::Enriching).unwrap();
        run.fail(&DiscoveryError::Cancelled);
        assert_eq!(run.state(), RunState::Failed);
    }
}
