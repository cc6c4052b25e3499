use crate::catalog::request::DEFAULT_PAGE_SIZE;
use crate::core::types::{Bounds, CategoryId, Channel};
use crate::discovery::enrichment::{DEFAULT_BATCH_SIZE, DEFAULT_OFFER_DEPTH};
use anyhow::{Context, Result};
use config::{Config, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppCfg {
    #[serde(default)]
    pub http: HttpCfg,
    pub catalog: CatalogCfg,
    #[serde(default)]
    pub discovery: DiscoveryCfg,
    #[serde(default)]
    pub categories: CategoriesCfg,
    #[serde(default)]
    pub presets: Vec<PresetCfg>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpCfg {
    #[serde(rename = "userAgent", default = "default_ua")]
    pub user_agent: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    #[serde(
        rename = "poolIdleTimeout",
        with = "humantime_serde",
        default = "default_pool_idle"
    )]
    pub pool_idle_timeout: Duration,
    #[serde(rename = "poolMaxIdlePerHost", default = "default_pool")]
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            user_agent: default_ua(),
            timeout: default_timeout(),
            pool_idle_timeout: default_pool_idle(),
            pool_max_idle_per_host: default_pool(),
        }
    }
}
fn default_ua() -> String {
    "nichescout/0.1".into()
}
fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_pool_idle() -> Duration {
    Duration::from_secs(90)
}
fn default_pool() -> usize {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogCfg {
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_domain")]
    pub domain: u8,
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: u32,
    #[serde(rename = "batchSize", default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(rename = "offerDepth", default = "default_offer_depth")]
    pub offer_depth: u32,
    #[serde(rename = "batchConcurrency", default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Channel whose current price stands in for the cost of sourcing a unit.
    #[serde(rename = "acquisitionChannel", default)]
    pub acquisition_channel: Option<Channel>,
    #[serde(default)]
    pub fixture: Option<String>,
}

impl Default for CatalogCfg {
    fn default() -> Self {
        Self {
            base_url: "https://api.keepa.com".to_string(),
            api_key: "".to_string(),
            domain: default_domain(),
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            offer_depth: default_offer_depth(),
            batch_concurrency: default_batch_concurrency(),
            acquisition_channel: None,
            fixture: None,
        }
    }
}
fn default_domain() -> u8 {
    1
}
fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_offer_depth() -> u32 {
    DEFAULT_OFFER_DEPTH
}
fn default_batch_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryCfg {
    #[serde(default)]
    pub presets: Vec<String>,
    #[serde(with = "humantime_serde", default = "default_refresh")]
    pub refresh: Duration,
    #[serde(rename = "runBudget", with = "humantime_serde", default = "default_budget")]
    pub run_budget: Duration,
    #[serde(default)]
    pub once: bool,
}

impl Default for DiscoveryCfg {
    fn default() -> Self {
        Self {
            presets: Vec::new(),
            refresh: default_refresh(),
            run_budget: default_budget(),
            once: false,
        }
    }
}
fn default_refresh() -> Duration {
    Duration::from_secs(3600)
}
fn default_budget() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SubcategoryCfg {
    pub id: CategoryId,
    pub parent: CategoryId,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoriesCfg {
    #[serde(default = "default_roots")]
    pub roots: Vec<CategoryId>,
    #[serde(default)]
    pub subcategories: Vec<SubcategoryCfg>,
}

impl Default for CategoriesCfg {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            subcategories: Vec::new(),
        }
    }
}
fn default_roots() -> Vec<CategoryId> {
    // Books, Electronics, Home & Kitchen, Toys & Games, Beauty
    vec![283155, 172282, 1055398, 165793011, 3760911]
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PresetCfg {
    pub name: String,
    pub category: CategoryId,
    #[serde(default)]
    pub rank: Bounds<u64>,
    #[serde(default)]
    pub price: Bounds<Decimal>,
    #[serde(rename = "excludeDominantSeller", default)]
    pub exclude_dominant_seller: bool,
    #[serde(rename = "maxCompetingSellers", default)]
    pub max_competing_sellers: Option<u32>,
    #[serde(rename = "minMargin", default)]
    pub min_margin: Option<Decimal>,
}

impl AppCfg {
    pub fn load(path: &str) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name(path))
            .add_source(config::Environment::default().separator("__"))
            .build()
            .context("building config")?;

        let app: AppCfg = cfg.try_deserialize().context("deserializing config")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.catalog.base_url.is_empty(),
            "catalog.baseUrl missing"
        );
        anyhow::ensure!(self.catalog.page_size > 0, "catalog.pageSize must be > 0");
        anyhow::ensure!(self.catalog.batch_size > 0, "catalog.batchSize must be > 0");
        anyhow::ensure!(
            self.catalog.batch_concurrency > 0,
            "catalog.batchConcurrency must be > 0"
        );
        anyhow::ensure!(
            self.discovery.refresh > Duration::ZERO,
            "discovery.refresh must be > 0"
        );
        anyhow::ensure!(
            !self.categories.roots.is_empty(),
            "categories.roots must not be empty"
        );

        let mut names = HashSet::new();
        for preset in &self.presets {
            anyhow::ensure!(
                names.insert(preset.name.as_str()),
                "duplicate preset name: {}",
                preset.name
            );
        }
        for name in &self.discovery.presets {
            anyhow::ensure!(
                names.contains(name.as_str()),
                "discovery.presets references unknown preset: {}",
                name
            );
        }
        Ok(())
    }
}
