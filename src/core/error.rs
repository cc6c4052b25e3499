use crate::core::types::{BatchFailure, CategoryId, EnrichedItem};
use crate::catalog::request::ConstraintKind;
use crate::discovery::state::RunState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("category {category_id} is not a root category")]
    InvalidCategory { category_id: CategoryId },

    #[error("malformed {field} range: min {min} > max {max}")]
    InvalidRange {
        field: &'static str,
        min: String,
        max: String,
    },

    #[error("enrichment batch size must be > 0")]
    InvalidBatchSize,

    #[error("pre-filters {first:?} and {second:?} cannot be combined in one query")]
    UnsupportedPreFilters {
        first: ConstraintKind,
        second: ConstraintKind,
    },

    #[error("catalog search failed: {0}")]
    UpstreamQuery(String),

    #[error("discovery run cancelled before any work was done")]
    Cancelled,

    #[error("illegal run state transition: {from:?} -> {to:?}")]
    IllegalTransition { from: RunState, to: RunState },
}

impl DiscoveryError {
    /// Stage a run was in when it moved to [`RunState::Failed`].
    pub fn failed_in(&self) -> RunState {
        match self {
            Self::IllegalTransition { from, .. } => *from,
            // validation, cancellation and search all happen before enrichment starts
            _ => RunState::Querying,
        }
    }
}

#[derive(Error, Debug)]
#[error(
    "{} enrichment batch(es) failed, {} item(s) recovered",
    .failed_batches.len(),
    .recovered.len()
)]
pub struct EnrichmentError {
    pub recovered: Vec<EnrichedItem>,
    pub succeeded_batches: Vec<usize>,
    pub failed_batches: Vec<BatchFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_in_reports_stage() {
        assert_eq!(
            DiscoveryError::UpstreamQuery("timeout".into()).failed_in(),
            RunState::Querying
        );
        assert_eq!(DiscoveryError::Cancelled.failed_in(), RunState::Querying);
        let err = DiscoveryError::IllegalTransition {
            from: RunState::Filtering,
            to: RunState::Enriching,
        };
        assert_eq!(err.failed_in(), RunState::Filtering);
    }
}
