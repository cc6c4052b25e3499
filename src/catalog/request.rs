use crate::core::error::DiscoveryError;
use crate::core::types::{Bounds, CategoryId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    SalesRank,
    Price,
    DominantSellerExcluded,
    CompetingSellerCount,
}

/// Constraint combinations the search endpoint accepts individually but
/// answers with zero results when sent together.
pub const UNSUPPORTED_COMBINATIONS: &[(ConstraintKind, ConstraintKind)] = &[(
    ConstraintKind::DominantSellerExcluded,
    ConstraintKind::CompetingSellerCount,
)];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    SalesRank(Bounds<u64>),
    Price(Bounds<Decimal>),
    DominantSellerExcluded,
    CompetingSellerCount { max: u32 },
}

impl Constraint {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::SalesRank(_) => ConstraintKind::SalesRank,
            Self::Price(_) => ConstraintKind::Price,
            Self::DominantSellerExcluded => ConstraintKind::DominantSellerExcluded,
            Self::CompetingSellerCount { .. } => ConstraintKind::CompetingSellerCount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub root_category_id: CategoryId,
    pub constraints: Vec<Constraint>,
    pub page_size: u32,
}

impl QueryRequest {
    pub fn new(root_category_id: CategoryId, page_size: u32) -> Self {
        Self {
            root_category_id,
            constraints: Vec::new(),
            page_size,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn has(&self, kind: ConstraintKind) -> bool {
        self.constraints.iter().any(|c| c.kind() == kind)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn check_supported(&self) -> Result<(), DiscoveryError> {
        for &(first, second) in UNSUPPORTED_COMBINATIONS {
            if self.has(first) && self.has(second) {
                return Err(DiscoveryError::UnsupportedPreFilters { first, second });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denylisted_pair_rejected() {
        let req = QueryRequest::new(283155, DEFAULT_PAGE_SIZE)
            .with_constraint(Constraint::DominantSellerExcluded)
            .with_constraint(Constraint::CompetingSellerCount { max: 3 });

        let err = req.check_supported().unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::UnsupportedPreFilters {
                first: ConstraintKind::DominantSellerExcluded,
                second: ConstraintKind::CompetingSellerCount,
            }
        ));
    }

    #[test]
    fn test_single_seller_constraint_allowed() {
        let req = QueryRequest::new(283155, DEFAULT_PAGE_SIZE)
            .with_constraint(Constraint::SalesRank(Bounds::new(1, 10)))
            .with_constraint(Constraint::CompetingSellerCount { max: 3 });
        assert!(req.check_supported().is_ok());
        assert_eq!(req.constraint_count(), 2);
    }
}
