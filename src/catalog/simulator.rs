use crate::catalog::client::{CatalogClient, DetailPage, SearchPage};
use crate::catalog::request::{Constraint, QueryRequest};
use crate::core::types::{CandidateId, CategoryId, Channel, EnrichedItem, Fulfillment};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimProduct {
    pub root_category_id: CategoryId,
    pub item: EnrichedItem,
}

#[derive(Default)]
pub struct SimCatalogClient {
    products: Vec<SimProduct>,
    delisted: HashSet<CandidateId>,
    poisoned: HashSet<CandidateId>,
    fail_search: bool,
    cancel_on_search: Option<CancellationToken>,
    cancel_on_details: Option<CancellationToken>,
    search_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    requested_depths: Mutex<Vec<u32>>,
}

impl SimCatalogClient {
    pub fn new(products: Vec<SimProduct>) -> Self {
        Self {
            products,
            ..Default::default()
        }
    }

    pub fn from_fixture(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog fixture {}", path))?;
        let products: Vec<SimProduct> =
            serde_json::from_str(&raw).context("parsing catalog fixture")?;
        Ok(Self::new(products))
    }

    #[cfg(test)]
    pub fn with_delisted(mut self, id: CandidateId) -> Self {
        self.delisted.insert(id);
        self
    }

    #[cfg(test)]
    pub fn failing_batches_with(mut self, id: CandidateId) -> Self {
        self.poisoned.insert(id);
        self
    }

    #[cfg(test)]
    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    #[cfg(test)]
    pub fn cancel_on_search(mut self, token: CancellationToken) -> Self {
        self.cancel_on_search = Some(token);
        self
    }

    #[cfg(test)]
    pub fn cancel_on_details(mut self, token: CancellationToken) -> Self {
        self.cancel_on_details = Some(token);
        self
    }

    #[cfg(test)]
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub async fn requested_depths(&self) -> Vec<u32> {
        self.requested_depths.lock().await.clone()
    }

    fn matches(product: &SimProduct, request: &QueryRequest) -> bool {
        let snap = product.item.snapshot();
        product.root_category_id == request.root_category_id
            && request.constraints.iter().all(|c| match c {
                Constraint::SalesRank(b) => snap.sales_rank().is_some_and(|r| b.contains(r)),
                Constraint::Price(b) => snap.reference_price().is_some_and(|p| b.contains(p)),
                Constraint::DominantSellerExcluded => {
                    snap.price(Channel::Marketplace).listed().is_none()
                }
                Constraint::CompetingSellerCount { max } => {
                    snap.offer_count(Fulfillment::Platform).unwrap_or(0) <= *max
                }
            })
    }
}

#[async_trait]
impl CatalogClient for SimCatalogClient {
    async fn search(&self, request: &QueryRequest) -> Result<SearchPage> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_search {
            token.cancel();
        }
        if self.fail_search {
            anyhow::bail!("simulated search failure");
        }
        let cost = 1 + request.constraint_count() as u64;

        // mirrors the upstream: unsupported combinations match nothing
        if request.check_supported().is_err() {
            return Ok(SearchPage {
                cost,
                ..Default::default()
            });
        }

        let matched: Vec<CandidateId> = self
            .products
            .iter()
            .filter(|p| Self::matches(p, request))
            .map(|p| p.item.id().clone())
            .collect();

        Ok(SearchPage {
            total_matches: matched.len() as u64,
            candidates: matched
                .into_iter()
                .take(request.page_size as usize)
                .collect(),
            cost,
        })
    }

    async fn product_details(&self, ids: &[CandidateId], offer_depth: u32) -> Result<DetailPage> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_depths.lock().await.push(offer_depth);
        if let Some(token) = &self.cancel_on_details {
            token.cancel();
        }
        if let Some(bad) = ids.iter().find(|id| self.poisoned.contains(*id)) {
            anyhow::bail!("simulated detail failure for batch containing {}", bad);
        }

        let items = ids
            .iter()
            .filter(|id| !self.delisted.contains(*id))
            .filter_map(|id| self.products.iter().find(|p| p.item.id() == id))
            .map(|p| p.item.clone())
            .collect();

        Ok(DetailPage {
            items,
            cost: ids.len() as u64,
        })
    }
}
