use crate::catalog::client::{CatalogClient, DetailPage, SearchPage};
use crate::catalog::request::{Constraint, QueryRequest};
use crate::config::config::CatalogCfg;
use crate::core::types::{
    CandidateId, Channel, ChannelPrice, EnrichedItem, Fulfillment, MarketSnapshot,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Map, Value, json};

// Positions in the `stats.current` array.
const CURRENT_MARKETPLACE: usize = 0;
const CURRENT_NEW: usize = 1;
const CURRENT_USED: usize = 2;
const CURRENT_SALES_RANK: usize = 3;
const CURRENT_NEW_FBA: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    asin_list: Vec<String>,
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    tokens_consumed: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductResponse {
    #[serde(default)]
    products: Vec<WireProduct>,
    #[serde(default)]
    tokens_consumed: u64,
}

#[derive(Debug, Deserialize)]
struct WireProduct {
    asin: String,
    stats: Option<WireStats>,
}

#[derive(Debug, Default, Deserialize)]
struct WireStats {
    #[serde(default)]
    current: Vec<i64>,
    #[serde(rename = "offerCountFBA")]
    offer_count_fba: Option<i64>,
    #[serde(rename = "offerCountFBM")]
    offer_count_fbm: Option<i64>,
}

pub struct HttpCatalogClient {
    client: Client,
    cfg: CatalogCfg,
}

impl HttpCatalogClient {
    pub fn new(cfg: CatalogCfg, client: Client) -> Self {
        Self { client, cfg }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Catalog API error: {} status={}, body={}", what, status, body);
        }
        Ok(resp)
    }
}

fn selection(request: &QueryRequest) -> Result<Value> {
    let mut sel = Map::new();
    sel.insert("rootCategory".into(), json!([request.root_category_id]));
    for constraint in &request.constraints {
        match constraint {
            Constraint::SalesRank(b) => insert_range(&mut sel, "current_SALES", b.min, b.max),
            Constraint::Price(b) => insert_range(&mut sel, "current_NEW", wire(b.min)?, wire(b.max)?),
            other => anyhow::bail!("{:?} cannot be sent as a query selection", other.kind()),
        }
    }
    sel.insert("perPage".into(), json!(request.page_size));
    sel.insert("page".into(), json!(0));
    Ok(Value::Object(sel))
}

fn insert_range<T: serde::Serialize>(
    sel: &mut Map<String, Value>,
    field: &str,
    min: Option<T>,
    max: Option<T>,
) {
    if let Some(min) = min {
        sel.insert(format!("{field}_gte"), json!(min));
    }
    if let Some(max) = max {
        sel.insert(format!("{field}_lte"), json!(max));
    }
}

fn wire(price: Option<Decimal>) -> Result<Option<i64>> {
    price
        .map(|p| {
            p.round()
                .to_i64()
                .with_context(|| format!("price {} out of range", p))
        })
        .transpose()
}

fn count(raw: Option<i64>) -> Option<u32> {
    raw.and_then(|c| u32::try_from(c).ok())
}

/// Maps the `stats` block of one product onto a snapshot. Missing slots and
/// negative sentinels both read as absent.
fn snapshot_from_stats(stats: &WireStats, acquisition: Option<Channel>) -> MarketSnapshot {
    let at = |i: usize| stats.current.get(i).copied().unwrap_or(-1);
    let mut snap = MarketSnapshot::default()
        .with_price(Channel::Marketplace, ChannelPrice::from_wire(at(CURRENT_MARKETPLACE)))
        .with_price(Channel::ThirdPartyNew, ChannelPrice::from_wire(at(CURRENT_NEW)))
        .with_price(Channel::Used, ChannelPrice::from_wire(at(CURRENT_USED)))
        .with_price(Channel::PlatformFulfilled, ChannelPrice::from_wire(at(CURRENT_NEW_FBA)));
    if let Ok(rank) = u64::try_from(at(CURRENT_SALES_RANK)) {
        snap = snap.with_sales_rank(rank);
    }
    if let Some(c) = count(stats.offer_count_fba) {
        snap = snap.with_offer_count(Fulfillment::Platform, c);
    }
    if let Some(c) = count(stats.offer_count_fbm) {
        snap = snap.with_offer_count(Fulfillment::Merchant, c);
    }
    if let Some(cost) = acquisition.and_then(|ch| snap.price(ch).listed()) {
        snap = snap.with_acquisition_cost(cost);
    }
    snap
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn search(&self, request: &QueryRequest) -> Result<SearchPage> {
        request.check_supported()?;
        let body = selection(request)?;
        let domain = self.cfg.domain.to_string();
        let resp = self
            .client
            .post(self.url("query"))
            .query(&[
                ("key", self.cfg.api_key.as_str()),
                ("domain", domain.as_str()),
            ])
            .json(&body)
            .send()
            .await
            .context("requesting catalog query")?;
        let parsed: QueryResponse = Self::check(resp, "query")
            .await?
            .json()
            .await
            .context("parsing catalog query response")?;

        Ok(SearchPage {
            candidates: parsed.asin_list.into_iter().map(CandidateId::new).collect(),
            total_matches: parsed.total_results,
            cost: parsed.tokens_consumed,
        })
    }

    async fn product_details(&self, ids: &[CandidateId], offer_depth: u32) -> Result<DetailPage> {
        let asins = ids
            .iter()
            .map(CandidateId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let domain = self.cfg.domain.to_string();
        let depth = offer_depth.to_string();
        let resp = self
            .client
            .get(self.url("product"))
            .query(&[
                ("key", self.cfg.api_key.as_str()),
                ("domain", domain.as_str()),
                ("asin", asins.as_str()),
                ("stats", "1"),
                ("offers", depth.as_str()),
            ])
            .send()
            .await
            .context("requesting product details")?;
        let parsed: ProductResponse = Self::check(resp, "product")
            .await?
            .json()
            .await
            .context("parsing product details response")?;

        let acquisition = self.cfg.acquisition_channel;
        let items = parsed
            .products
            .into_iter()
            .map(|p| {
                let stats = p.stats.unwrap_or_default();
                EnrichedItem::new(
                    CandidateId::new(p.asin),
                    snapshot_from_stats(&stats, acquisition),
                )
            })
            .collect();

        Ok(DetailPage {
            items,
            cost: parsed.tokens_consumed,
        })
    }
}
