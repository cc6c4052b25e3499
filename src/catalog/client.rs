use crate::catalog::request::QueryRequest;
use crate::core::types::{CandidateId, EnrichedItem};
use anyhow::Result;
use async_trait::async_trait;

#[derive(Clone, Debug, Default)]
pub struct SearchPage {
    pub candidates: Vec<CandidateId>,
    pub total_matches: u64,
    pub cost: u64,
}

#[derive(Clone, Debug, Default)]
pub struct DetailPage {
    pub items: Vec<EnrichedItem>,
    pub cost: u64,
}

#[async_trait]
pub trait CatalogClient: Send + Sync + 'static {
    async fn search(&self, request: &QueryRequest) -> Result<SearchPage>;

    /// `offer_depth` is the number of offer records to request per item;
    /// too few undercounts sellers.
    async fn product_details(&self, ids: &[CandidateId], offer_depth: u32) -> Result<DetailPage>;
}
