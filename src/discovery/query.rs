use crate::catalog::categories::CategoryIndex;
use crate::catalog::request::{Constraint, QueryRequest};
use crate::core::error::DiscoveryError;
use crate::core::types::{Bounds, CriteriaSpec};
use std::fmt::Display;
use std::sync::Arc;

pub struct CatalogQueryBuilder {
    categories: Arc<dyn CategoryIndex>,
    page_size: u32,
}

impl CatalogQueryBuilder {
    pub fn new(categories: Arc<dyn CategoryIndex>, page_size: u32) -> Self {
        Self {
            categories,
            page_size,
        }
    }

    pub fn build(&self, spec: &CriteriaSpec) -> Result<QueryRequest, DiscoveryError> {
        let pre = &spec.pre;
        let root = spec.root_category_id();
        if !self.categories.is_root(root) {
            return Err(DiscoveryError::InvalidCategory { category_id: root });
        }
        check_range("rank", &pre.rank_range)?;
        check_range("price", &pre.price_range)?;

        let mut request = QueryRequest::new(root, self.page_size);
        if !pre.rank_range.is_unset() {
            request = request.with_constraint(Constraint::SalesRank(pre.rank_range));
        }
        if !pre.price_range.is_unset() {
            request = request.with_constraint(Constraint::Price(pre.price_range));
        }
        request.check_supported()?;
        Ok(request)
    }
}

fn check_range<T: PartialOrd + Copy + Display>(
    field: &'static str,
    range: &Bounds<T>,
) -> Result<(), DiscoveryError> {
    match (range.min, range.max) {
        (Some(min), Some(max)) if !range.is_well_formed() => Err(DiscoveryError::InvalidRange {
            field,
            min: min.to_string(),
            max: max.to_string(),
        }),
        _ => Ok(()),
    }
}
