use crate::catalog::categories::CategoryIndex;
use crate::catalog::client::CatalogClient;
use crate::config::config::CatalogCfg;
use crate::core::error::DiscoveryError;
use crate::core::types::{CriteriaSpec, DiscoveryResult, EnrichedItem, UsageLedger};
use crate::discovery::enrichment::{EnrichmentBatcher, offer_depth_for, partition};
use crate::discovery::filters::PostFilterEngine;
use crate::discovery::query::CatalogQueryBuilder;
use crate::discovery::state::{RunState, RunTracker};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs query -> enrich -> filter for one [`CriteriaSpec`] at a time.
pub struct DiscoveryOrchestrator {
    client: Arc<dyn CatalogClient>,
    query_builder: CatalogQueryBuilder,
    batcher: EnrichmentBatcher,
    filters: PostFilterEngine,
    batch_size: usize,
    offer_depth: u32,
}

impl DiscoveryOrchestrator {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        categories: Arc<dyn CategoryIndex>,
        cfg: &CatalogCfg,
    ) -> Self {
        Self {
            query_builder: CatalogQueryBuilder::new(categories, cfg.page_size),
            batcher: EnrichmentBatcher::new(client.clone(), cfg.batch_concurrency),
            filters: PostFilterEngine::new(),
            batch_size: cfg.batch_size,
            offer_depth: cfg.offer_depth,
            client,
        }
    }

    pub async fn discover(
        &self,
        spec: &CriteriaSpec,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        let mut run = RunTracker::start();
        match self.run_stages(spec, cancel, &mut run).await {
            Ok(result) => Ok(result),
            Err(e) => {
                run.fail(&e);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        spec: &CriteriaSpec,
        cancel: &CancellationToken,
        run: &mut RunTracker,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        // Validation happens before anything is sent upstream.
        let request = self.query_builder.build(spec)?;
        if self.batch_size == 0 {
            return Err(DiscoveryError::InvalidBatchSize);
        }
        if cancel.is_cancelled() {
            return Err(DiscoveryError::Cancelled);
        }

        // ==========================================
        // Querying
        // ==========================================
        info!(
            category = request.root_category_id,
            constraints = request.constraint_count(),
            page_size = request.page_size,
            "querying catalog"
        );
        let page = self
            .client
            .search(&request)
            .await
            .map_err(|e| DiscoveryError::UpstreamQuery(format!("{:#}", e)))?;

        let mut result = Self::empty_result(run);
        result.usage.query = page.cost;
        result.total_matches = page.total_matches;
        result.candidate_count = page.candidates.len();

        if page.candidates.is_empty() {
            info!(category = request.root_category_id, "no candidates, no niches found");
            return Self::finish(run, RunState::Done, result);
        }

        // ==========================================
        // Enriching
        // ==========================================
        run.advance(RunState::Enriching)?;
        let recovered: Vec<EnrichedItem> = if cancel.is_cancelled() {
            // nothing dispatched yet, every batch is skipped
            result.skipped_batches = partition(&page.candidates, self.batch_size)?
                .into_iter()
                .map(|b| b.index)
                .collect();
            result.partial = true;
            Vec::new()
        } else {
            let offer_depth = offer_depth_for(self.offer_depth, &spec.post);
            debug!(
                candidates = page.candidates.len(),
                batch_size = self.batch_size,
                offer_depth,
                "enriching candidates"
            );
            let report = self
                .batcher
                .enrich(&page.candidates, self.batch_size, offer_depth, cancel)
                .await?;
            for usage in &report.usage {
                result.usage.record_batch(usage.index, usage.cost);
            }
            result.skipped_batches = report.skipped_batches.clone();
            result.partial = report.is_partial();
            match report.into_result() {
                Ok(items) => items,
                Err(partial) => {
                    warn!(
                        succeeded = ?partial.succeeded_batches,
                        error = %partial,
                        "continuing with partial enrichment"
                    );
                    result.failed_batches = partial.failed_batches;
                    partial.recovered
                }
            }
        };
        result.cancelled = cancel.is_cancelled() && !result.skipped_batches.is_empty();

        // ==========================================
        // Filtering
        // ==========================================
        run.advance(RunState::Filtering)?;
        let enriched = recovered.len();
        let report = self.filters.filter_with_report(recovered, spec);
        result.items = report.accepted;
        result.rejections = report.rejections;
        result.skipped_checks = report.skipped;

        if result.items.is_empty() {
            info!(enriched, "no niches found");
        } else {
            info!(
                enriched,
                accepted = result.items.len(),
                rejected = ?result.rejections,
                "post-filtering complete"
            );
        }
        Self::finish(run, RunState::Done, result)
    }

    fn empty_result(run: &RunTracker) -> DiscoveryResult {
        DiscoveryResult {
            items: Vec::new(),
            usage: UsageLedger::default(),
            total_matches: 0,
            candidate_count: 0,
            partial: false,
            cancelled: false,
            failed_batches: Vec::new(),
            skipped_batches: Vec::new(),
            rejections: BTreeMap::new(),
            skipped_checks: BTreeMap::new(),
            state: run.state(),
            started_at: run.started_at(),
            elapsed: run.elapsed(),
        }
    }

    fn finish(
        run: &mut RunTracker,
        next: RunState,
        mut result: DiscoveryResult,
    ) -> Result<DiscoveryResult, DiscoveryError> {
        run.advance(next)?;
        result.state = run.state();
        result.elapsed = run.elapsed();
        info!(
            accepted = result.items.len(),
            partial = result.partial,
            cost = result.usage.total(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "discovery run done"
        );
        Ok(result)
    }
}
