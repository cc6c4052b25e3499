use crate::core::types::{Channel, CriteriaSpec, EnrichedItem, Fulfillment, PostFilters};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

pub const DOMINANT_CHANNEL: Channel = Channel::Marketplace;
pub const COMPETING_FULFILLMENT: Fulfillment = Fulfillment::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Reject,
    Skip,
}

pub trait PostFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, item: &EnrichedItem) -> Verdict;
}

struct DominantSellerExclusion;

impl PostFilter for DominantSellerExclusion {
    fn name(&self) -> &'static str {
        "dominant_seller"
    }

    fn evaluate(&self, item: &EnrichedItem) -> Verdict {
        match item.snapshot().price(DOMINANT_CHANNEL).listed() {
            Some(price) if price > Decimal::ZERO => Verdict::Reject,
            _ => Verdict::Pass,
        }
    }
}

struct CompetingSellerLimit {
    max: u32,
}

impl PostFilter for CompetingSellerLimit {
    fn name(&self) -> &'static str {
        "competing_sellers"
    }

    fn evaluate(&self, item: &EnrichedItem) -> Verdict {
        let count = item
            .snapshot()
            .offer_count(COMPETING_FULFILLMENT)
            .unwrap_or(0);
        if count > self.max {
            Verdict::Reject
        } else {
            Verdict::Pass
        }
    }
}

struct MinimumMargin {
    floor: Decimal,
}

impl PostFilter for MinimumMargin {
    fn name(&self) -> &'static str {
        "min_margin"
    }

    fn evaluate(&self, item: &EnrichedItem) -> Verdict {
        match item.snapshot().margin() {
            Some(margin) if margin < self.floor => Verdict::Reject,
            Some(_) => Verdict::Pass,
            None => Verdict::Skip,
        }
    }
}

#[derive(Debug, Default)]
pub struct FilterReport {
    pub accepted: Vec<EnrichedItem>,
    pub rejections: BTreeMap<String, usize>,
    pub skipped: BTreeMap<String, usize>,
}

/// Applies the post-filters of a [`CriteriaSpec`] to enriched items.
///
/// Predicates run in a fixed order (dominant seller, competing sellers,
/// minimum margin) and the first rejection ends evaluation for that item.
/// The output keeps input order.
#[derive(Default)]
pub struct PostFilterEngine;

impl PostFilterEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn predicates(post: &PostFilters) -> Vec<Box<dyn PostFilter>> {
        let mut predicates: Vec<Box<dyn PostFilter>> = Vec::new();
        if post.exclude_dominant_seller {
            predicates.push(Box::new(DominantSellerExclusion));
        }
        if let Some(max) = post.max_competing_sellers {
            predicates.push(Box::new(CompetingSellerLimit { max }));
        }
        if let Some(floor) = post.min_margin {
            predicates.push(Box::new(MinimumMargin { floor }));
        }
        predicates
    }

    #[cfg(test)]
    pub fn filter(&self, items: Vec<EnrichedItem>, spec: &CriteriaSpec) -> Vec<EnrichedItem> {
        self.filter_with_report(items, spec).accepted
    }

    pub fn filter_with_report(&self, items: Vec<EnrichedItem>, spec: &CriteriaSpec) -> FilterReport {
        let mut report = FilterReport::default();
        if spec.post.is_empty() {
            report.accepted = items;
            return report;
        }
        let predicates = Self::predicates(&spec.post);

        for item in items {
            let mut rejected_by = None;
            for p in &predicates {
                match p.evaluate(&item) {
                    Verdict::Pass => {}
                    Verdict::Skip => *report.skipped.entry(p.name().to_string()).or_default() += 1,
                    Verdict::Reject => {
                        rejected_by = Some(p.name());
                        break;
                    }
                }
            }
            match rejected_by {
                Some(name) => {
                    debug!(id = %item.id(), predicate = name, "item rejected");
                    *report.rejections.entry(name.to_string()).or_default() += 1;
                }
                None => report.accepted.push(item),
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CandidateId, ChannelPrice, MarketSnapshot};

    fn item(id: &str, snap: MarketSnapshot) -> EnrichedItem {
        EnrichedItem::new(CandidateId::new(id), snap)
    }

    fn listed(v: i64) -> ChannelPrice {
        ChannelPrice::Listed(Decimal::from(v))
    }

    fn ids(items: &[EnrichedItem]) -> Vec<&str> {
        items.iter().map(|i| i.id().as_str()).collect()
    }

    #[test]
    fn test_no_post_filters_passes_everything() {
        let items = vec![
            item("a", MarketSnapshot::default().with_price(Channel::Marketplace, listed(100))),
            item("b", MarketSnapshot::default()),
        ];
        let out = PostFilterEngine::new().filter(items.clone(), &CriteriaSpec::new(283155));
        assert_eq!(out, items);
    }

    #[test]
    fn test_dominant_seller_exclusion() {
        let spec = CriteriaSpec::new(283155).excluding_dominant_seller();
        let items = vec![
            item("amazon", MarketSnapshot::default().with_price(Channel::Marketplace, listed(1999))),
            item("absent", MarketSnapshot::default().with_price(Channel::Marketplace, ChannelPrice::Absent)),
            item("zero", MarketSnapshot::default().with_price(Channel::Marketplace, listed(0))),
            item("unreported", MarketSnapshot::default()),
        ];
        let out = PostFilterEngine::new().filter(items, &spec);
        assert_eq!(ids(&out), vec!["absent", "zero", "unreported"]);
    }

    #[test]
    fn test_competing_seller_limit() {
        let spec = CriteriaSpec::new(283155).with_max_competing_sellers(3);
        let items = vec![
            item("five", MarketSnapshot::default().with_offer_count(Fulfillment::Platform, 5)),
            item("two", MarketSnapshot::default().with_offer_count(Fulfillment::Platform, 2)),
            item("three", MarketSnapshot::default().with_offer_count(Fulfillment::Platform, 3)),
            item("missing", MarketSnapshot::default().with_offer_count(Fulfillment::Merchant, 9)),
        ];
        let out = PostFilterEngine::new().filter(items, &spec);
        assert_eq!(ids(&out), vec!["two", "three", "missing"]);
    }

    #[test]
    fn test_min_margin_skips_unknown_cost() {
        let spec = CriteriaSpec::new(283155).with_min_margin(Decimal::from(500));
        let priced = |cost: i64| {
            MarketSnapshot::default()
                .with_price(Channel::ThirdPartyNew, listed(2000))
                .with_acquisition_cost(Decimal::from(cost))
        };
        let items = vec![
            item("thin", priced(1800)),
            item("fat", priced(1000)),
            item("exact", priced(1500)),
            item("unknown", MarketSnapshot::default().with_price(Channel::ThirdPartyNew, listed(2000))),
        ];

        let report = PostFilterEngine::new().filter_with_report(items, &spec);
        assert_eq!(ids(&report.accepted), vec!["fat", "exact", "unknown"]);
        assert_eq!(report.rejections.get("min_margin"), Some(&1));
        assert_eq!(report.skipped.get("min_margin"), Some(&1));
    }

    #[test]
    fn test_order_stable_when_middle_item_fails() {
        let spec = CriteriaSpec::new(283155).excluding_dominant_seller();
        let items = vec![
            item("A", MarketSnapshot::default()),
            item("B", MarketSnapshot::default().with_price(Channel::Marketplace, listed(10))),
            item("C", MarketSnapshot::default()),
        ];
        let out = PostFilterEngine::new().filter(items, &spec);
        assert_eq!(ids(&out), vec!["A", "C"]);
    }

    #[test]
    fn test_idempotent() {
        let spec = CriteriaSpec::new(283155)
            .excluding_dominant_seller()
            .with_max_competing_sellers(2)
            .with_min_margin(Decimal::from(100));
        let items: Vec<EnrichedItem> = (0..12)
            .map(|i| {
                let mut snap = MarketSnapshot::default()
                    .with_offer_count(Fulfillment::Platform, i % 4)
                    .with_price(Channel::PlatformFulfilled, listed(1000 + i as i64 * 10));
                if i % 3 == 0 {
                    snap = snap.with_price(Channel::Marketplace, listed(999));
                }
                if i % 5 == 0 {
                    snap = snap.with_acquisition_cost(Decimal::from(950));
                }
                item(&format!("i{i}"), snap)
            })
            .collect();

        let engine = PostFilterEngine::new();
        let once = engine.filter(items, &spec);
        let twice = engine.filter(once.clone(), &spec);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_predicate_order_is_fixed() {
        let spec = CriteriaSpec::new(283155)
            .with_min_margin(Decimal::ONE)
            .with_max_competing_sellers(1)
            .excluding_dominant_seller();
        let names: Vec<&str> = PostFilterEngine::predicates(&spec.post)
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec!["dominant_seller", "competing_sellers", "min_margin"]);
    }

    #[test]
    fn test_first_rejection_short_circuits() {
        // fails both seller rules; only the first one is charged
        let spec = CriteriaSpec::new(283155)
            .excluding_dominant_seller()
            .with_max_competing_sellers(0)
            .with_min_margin(Decimal::from(10_000));
        let snap = MarketSnapshot::default()
            .with_price(Channel::Marketplace, listed(10))
            .with_offer_count(Fulfillment::Platform, 4);

        let report = PostFilterEngine::new().filter_with_report(vec![item("x", snap)], &spec);
        assert!(report.accepted.is_empty());
        assert_eq!(report.rejections.len(), 1);
        assert_eq!(report.rejections.get("dominant_seller"), Some(&1));
        // margin never evaluated, so no skip was recorded either
        assert!(report.skipped.is_empty());
    }
}
