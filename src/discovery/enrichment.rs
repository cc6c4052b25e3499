use crate::catalog::client::CatalogClient;
use crate::core::error::{DiscoveryError, EnrichmentError};
use crate::core::types::{BatchFailure, BatchUsage, CandidateId, EnrichedItem, PostFilters};
use futures::{StreamExt, future, stream};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_OFFER_DEPTH: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub candidates: Vec<CandidateId>,
}

pub fn partition(
    candidates: &[CandidateId],
    batch_size: usize,
) -> Result<Vec<Batch>, DiscoveryError> {
    if batch_size == 0 {
        return Err(DiscoveryError::InvalidBatchSize);
    }
    Ok(candidates
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            candidates: chunk.to_vec(),
        })
        .collect())
}

pub fn offer_depth_for(configured: u32, post: &PostFilters) -> u32 {
    let needed = post
        .max_competing_sellers
        .map_or(0, |max| max.saturating_add(1));
    configured.max(needed)
}

#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub items: Vec<EnrichedItem>,
    pub succeeded_batches: Vec<usize>,
    pub failed_batches: Vec<BatchFailure>,
    pub skipped_batches: Vec<usize>,
    pub usage: Vec<BatchUsage>,
}

impl EnrichmentReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_batches.is_empty() || !self.skipped_batches.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<EnrichedItem>, EnrichmentError> {
        if self.failed_batches.is_empty() {
            Ok(self.items)
        } else {
            Err(EnrichmentError {
                recovered: self.items,
                succeeded_batches: self.succeeded_batches,
                failed_batches: self.failed_batches,
            })
        }
    }
}

pub struct EnrichmentBatcher {
    client: Arc<dyn CatalogClient>,
    concurrency: usize,
}

impl EnrichmentBatcher {
    pub fn new(client: Arc<dyn CatalogClient>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// A failing batch is recorded and its siblings still run. Once `cancel`
    /// fires no further batch is dispatched; in-flight ones finish.
    pub async fn enrich(
        &self,
        candidates: &[CandidateId],
        batch_size: usize,
        offer_depth: u32,
        cancel: &CancellationToken,
    ) -> Result<EnrichmentReport, DiscoveryError> {
        let batches = partition(candidates, batch_size)?;
        let total = batches.len();
        let client = &self.client;

        let outcomes: Vec<_> = stream::iter(batches)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|batch| async move {
                let res = client.product_details(&batch.candidates, offer_depth).await;
                (batch, res)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let dispatched = outcomes.len();
        let mut report = EnrichmentReport::default();
        for (batch, res) in outcomes {
            match res {
                Ok(page) => {
                    debug!(
                        batch = batch.index,
                        requested = batch.candidates.len(),
                        returned = page.items.len(),
                        cost = page.cost,
                        "enrichment batch complete"
                    );
                    report.usage.push(BatchUsage {
                        index: batch.index,
                        cost: page.cost,
                    });
                    report
                        .items
                        .extend(in_request_order(&batch.candidates, page.items));
                    report.succeeded_batches.push(batch.index);
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(batch = batch.index, %reason, "enrichment batch failed");
                    report.failed_batches.push(BatchFailure {
                        index: batch.index,
                        candidates: batch.candidates,
                        reason,
                    });
                }
            }
        }
        report.skipped_batches = (dispatched..total).collect();
        if !report.skipped_batches.is_empty() {
            info!(
                dispatched,
                skipped = report.skipped_batches.len(),
                "enrichment stopped early on cancellation"
            );
        }
        Ok(report)
    }
}

fn in_request_order(requested: &[CandidateId], items: Vec<EnrichedItem>) -> Vec<EnrichedItem> {
    let mut by_id: HashMap<CandidateId, EnrichedItem> = HashMap::with_capacity(items.len());
    for item in items {
        by_id.entry(item.id().clone()).or_insert(item);
    }
    requested.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::simulator::{SimCatalogClient, SimProduct};
    use crate::core::types::MarketSnapshot;

    fn ids(n: usize) -> Vec<CandidateId> {
        (0..n).map(|i| CandidateId::new(format!("id{i:03}"))).collect()
    }

    fn sim(n: usize) -> SimCatalogClient {
        let products = ids(n)
            .into_iter()
            .enumerate()
            .map(|(i, id)| SimProduct {
                root_category_id: 283155,
                item: EnrichedItem::new(id, MarketSnapshot::default().with_sales_rank(i as u64)),
            })
            .collect();
        SimCatalogClient::new(products)
    }

    fn item_ids(items: &[EnrichedItem]) -> Vec<CandidateId> {
        items.iter().map(|i| i.id().clone()).collect()
    }

    #[test]
    fn test_partition_counts_and_concatenation() {
        for (n, size) in [(0, 50), (1, 50), (50, 50), (51, 50), (120, 50), (7, 3), (9, 1)] {
            let input = ids(n);
            let batches = partition(&input, size).unwrap();
            assert_eq!(batches.len(), n.div_ceil(size), "n={n} size={size}");
            assert!(batches.iter().all(|b| b.candidates.len() <= size));
            assert!(batches.iter().enumerate().all(|(i, b)| b.index == i));
            let rejoined: Vec<CandidateId> =
                batches.into_iter().flat_map(|b| b.candidates).collect();
            assert_eq!(rejoined, input);
        }
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            partition(&ids(3), 0),
            Err(DiscoveryError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_offer_depth_covers_seller_limit() {
        let mut post = PostFilters::default();
        assert_eq!(offer_depth_for(20, &post), 20);
        post.max_competing_sellers = Some(3);
        assert_eq!(offer_depth_for(20, &post), 20);
        post.max_competing_sellers = Some(40);
        assert_eq!(offer_depth_for(20, &post), 41);
    }

    #[test]
    fn test_in_request_order_drops_unrequested_and_duplicates() {
        let requested = ids(3);
        let returned = vec![
            EnrichedItem::new(requested[2].clone(), MarketSnapshot::default()),
            EnrichedItem::new(CandidateId::new("stray"), MarketSnapshot::default()),
            EnrichedItem::new(requested[0].clone(), MarketSnapshot::default()),
            EnrichedItem::new(requested[0].clone(), MarketSnapshot::default().with_sales_rank(9)),
        ];
        let ordered = in_request_order(&requested, returned);
        assert_eq!(item_ids(&ordered), vec![requested[0].clone(), requested[2].clone()]);
        assert_eq!(ordered[0].snapshot().sales_rank(), None);
    }

    #[tokio::test]
    async fn test_concurrent_batches_reassembled_in_order() {
        let client = Arc::new(sim(23));
        let batcher = EnrichmentBatcher::new(client.clone(), 4);

        let report = batcher
            .enrich(&ids(23), 5, 20, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_partial());
        assert_eq!(client.detail_calls(), 5);
        assert_eq!(report.succeeded_batches, vec![0, 1, 2, 3, 4]);
        assert_eq!(item_ids(&report.items), ids(23));
        assert_eq!(report.usage.iter().map(|u| u.cost).sum::<u64>(), 23);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_siblings() {
        let all = ids(9);
        let client = Arc::new(sim(9).failing_batches_with(all[4].clone()));
        let batcher = EnrichmentBatcher::new(client.clone(), 1);

        let report = batcher
            .enrich(&all, 3, 20, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_partial());
        assert_eq!(client.detail_calls(), 3);
        assert_eq!(report.succeeded_batches, vec![0, 2]);
        assert_eq!(report.failed_batches.len(), 1);
        assert_eq!(report.failed_batches[0].index, 1);
        assert_eq!(report.failed_batches[0].candidates, all[3..6].to_vec());

        let err = report.into_result().unwrap_err();
        let expected: Vec<CandidateId> = all[..3].iter().chain(&all[6..]).cloned().collect();
        assert_eq!(item_ids(&err.recovered), expected);
        assert_eq!(err.succeeded_batches, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_batch_finish() {
        let cancel = CancellationToken::new();
        let client = Arc::new(sim(9).cancel_on_details(cancel.clone()));
        let batcher = EnrichmentBatcher::new(client.clone(), 1);

        let report = batcher.enrich(&ids(9), 3, 20, &cancel).await.unwrap();

        assert_eq!(client.detail_calls(), 1);
        assert_eq!(report.succeeded_batches, vec![0]);
        assert_eq!(report.skipped_batches, vec![1, 2]);
        assert_eq!(item_ids(&report.items), ids(3));
        assert!(report.is_partial());
    }
}
