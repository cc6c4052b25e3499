use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::discovery::state::RunState;

#[async_trait::async_trait]
pub trait Actor: Send + Sync + 'static {
    async fn run(self) -> Result<()>;
}

pub type CategoryId = u64;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------- Criteria -----------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    #[serde(default)]
    pub min: Option<T>,
    #[serde(default)]
    pub max: Option<T>,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    #[cfg(test)]
    pub fn new(min: T, max: T) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn is_well_formed(&self) -> bool {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => lo <= hi,
            _ => true,
        }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min.is_none_or(|lo| value >= lo) && self.max.is_none_or(|hi| value <= hi)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreFilters {
    pub root_category_id: CategoryId,
    #[serde(default)]
    pub rank_range: Bounds<u64>,
    #[serde(default)]
    pub price_range: Bounds<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PostFilters {
    #[serde(default)]
    pub exclude_dominant_seller: bool,
    #[serde(default)]
    pub max_competing_sellers: Option<u32>,
    #[serde(default)]
    pub min_margin: Option<Decimal>,
}

impl PostFilters {
    pub fn is_empty(&self) -> bool {
        !self.exclude_dominant_seller
            && self.max_competing_sellers.is_none()
            && self.min_margin.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriteriaSpec {
    pub pre: PreFilters,
    #[serde(default)]
    pub post: PostFilters,
}

impl CriteriaSpec {
    pub fn new(root_category_id: CategoryId) -> Self {
        Self {
            pre: PreFilters {
                root_category_id,
                rank_range: Bounds::unbounded(),
                price_range: Bounds::unbounded(),
            },
            post: PostFilters::default(),
        }
    }

    pub fn with_rank_range(mut self, rank_range: Bounds<u64>) -> Self {
        self.pre.rank_range = rank_range;
        self
    }

    pub fn with_price_range(mut self, price_range: Bounds<Decimal>) -> Self {
        self.pre.price_range = price_range;
        self
    }

    pub fn excluding_dominant_seller(mut self) -> Self {
        self.post.exclude_dominant_seller = true;
        self
    }

    pub fn with_max_competing_sellers(mut self, max: u32) -> Self {
        self.post.max_competing_sellers = Some(max);
        self
    }

    pub fn with_min_margin(mut self, floor: Decimal) -> Self {
        self.post.min_margin = Some(floor);
        self
    }

    pub fn root_category_id(&self) -> CategoryId {
        self.pre.root_category_id
    }
}

// ----------- Marketplace snapshot -----------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Marketplace,
    ThirdPartyNew,
    Used,
    PlatformFulfilled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Fulfillment {
    Platform,
    Merchant,
}

/// Current price on one channel. `Absent` means no offer on that channel,
/// which is not the same thing as a listed price of zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelPrice {
    #[default]
    Absent,
    Listed(Decimal),
}

impl ChannelPrice {
    pub fn from_wire(raw: i64) -> Self {
        if raw < 0 {
            Self::Absent
        } else {
            Self::Listed(Decimal::from(raw))
        }
    }

    pub fn listed(&self) -> Option<Decimal> {
        match self {
            Self::Absent => None,
            Self::Listed(p) => Some(*p),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketSnapshot {
    prices: BTreeMap<Channel, ChannelPrice>,
    offer_counts: BTreeMap<Fulfillment, u32>,
    sales_rank: Option<u64>,
    acquisition_cost: Option<Decimal>,
}

impl MarketSnapshot {
    pub fn with_price(mut self, channel: Channel, price: ChannelPrice) -> Self {
        self.prices.insert(channel, price);
        self
    }

    pub fn with_offer_count(mut self, fulfillment: Fulfillment, count: u32) -> Self {
        self.offer_counts.insert(fulfillment, count);
        self
    }

    pub fn with_sales_rank(mut self, rank: u64) -> Self {
        self.sales_rank = Some(rank);
        self
    }

    pub fn with_acquisition_cost(mut self, cost: Decimal) -> Self {
        self.acquisition_cost = Some(cost);
        self
    }

    pub fn price(&self, channel: Channel) -> ChannelPrice {
        self.prices.get(&channel).copied().unwrap_or_default()
    }

    pub fn offer_count(&self, fulfillment: Fulfillment) -> Option<u32> {
        self.offer_counts.get(&fulfillment).copied()
    }

    pub fn sales_rank(&self) -> Option<u64> {
        self.sales_rank
    }

    pub fn acquisition_cost(&self) -> Option<Decimal> {
        self.acquisition_cost
    }

    /// Price a new unit currently sells for: platform-fulfilled first,
    /// then third-party new, then the marketplace's own offer.
    pub fn reference_price(&self) -> Option<Decimal> {
        [
            Channel::PlatformFulfilled,
            Channel::ThirdPartyNew,
            Channel::Marketplace,
        ]
        .into_iter()
        .find_map(|c| self.price(c).listed())
    }

    pub fn margin(&self) -> Option<Decimal> {
        Some(self.reference_price()? - self.acquisition_cost()?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    id: CandidateId,
    snapshot: MarketSnapshot,
}

impl EnrichedItem {
    pub fn new(id: CandidateId, snapshot: MarketSnapshot) -> Self {
        Self { id, snapshot }
    }

    pub fn id(&self) -> &CandidateId {
        &self.id
    }

    pub fn snapshot(&self) -> &MarketSnapshot {
        &self.snapshot
    }
}

// ----------- Results -----------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUsage {
    pub index: usize,
    pub cost: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    pub query: u64,
    pub batches: Vec<BatchUsage>,
}

impl UsageLedger {
    pub fn record_batch(&mut self, index: usize, cost: u64) {
        self.batches.push(BatchUsage { index, cost });
    }

    pub fn total(&self) -> u64 {
        self.query + self.batches.iter().map(|b| b.cost).sum::<u64>()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub index: usize,
    pub candidates: Vec<CandidateId>,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DiscoveryResult {
    pub items: Vec<EnrichedItem>,
    pub usage: UsageLedger,
    pub total_matches: u64,
    pub candidate_count: usize,
    pub partial: bool,
    pub cancelled: bool,
    pub failed_batches: Vec<BatchFailure>,
    pub skipped_batches: Vec<usize>,
    pub rejections: BTreeMap<String, usize>,
    pub skipped_checks: BTreeMap<String, usize>,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl DiscoveryResult {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn missing_batches(&self) -> Vec<usize> {
        let mut missing: Vec<usize> = self
            .failed_batches
            .iter()
            .map(|f| f.index)
            .chain(self.skipped_batches.iter().copied())
            .collect();
        missing.sort_unstable();
        missing
    }

    pub fn retryable_candidates(&self) -> Vec<CandidateId> {
        self.failed_batches
            .iter()
            .flat_map(|f| f.candidates.iter().cloned())
            .collect()
    }

    pub fn exceeds(&self, budget: Duration) -> bool {
        self.elapsed > budget
    }
}
