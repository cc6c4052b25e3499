mod catalog;
mod config;
mod core;
mod discovery;

use anyhow::{Context, Result};
use crate::catalog::categories::{CategoryIndex, StaticCategoryIndex};
use crate::catalog::client::CatalogClient;
use crate::catalog::http::HttpCatalogClient;
use crate::catalog::simulator::SimCatalogClient;
use crate::config::config::AppCfg;
use crate::core::types::Actor;
use crate::discovery::actor::{NicheDiscoveryActor, NicheReport};
use crate::discovery::orchestrator::DiscoveryOrchestrator;
use crate::discovery::presets::ConfigPresets;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

async fn log_results(mut rx: mpsc::Receiver<NicheReport>) -> Result<()> {
    while let Some((preset, result)) = rx.recv().await {
        if result.is_empty() {
            info!(%preset, candidates = result.candidate_count, "no niches found");
        } else {
            info!(
                %preset,
                niches = result.items.len(),
                candidates = result.candidate_count,
                total_matches = result.total_matches,
                cost = result.usage.total(),
                "niches found"
            );
        }
        if result.partial {
            warn!(
                %preset,
                missing_batches = ?result.missing_batches(),
                retryable = result.retryable_candidates().len(),
                cancelled = result.cancelled,
                "partial result"
            );
        }
        match serde_json::to_string(&result) {
            Ok(json) => debug!(%preset, %json, "discovery result"),
            Err(e) => error!(?e, "serializing discovery result failed"),
        }
    }
    info!("Result channel closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    dotenv::dotenv().ok();

    let cfg = AppCfg::load("config.yml")?;

    // Root span for the supervisor/main thread
    let span = info_span!(
        "Supervisor",
        pid = %std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
    );
    let _enter = span.enter();

    info!("Starting up");
    let shutdown = CancellationToken::new();

    info!("Initializing catalog client");
    let client: Arc<dyn CatalogClient> = match &cfg.catalog.fixture {
        Some(path) => {
            info!(%path, "using in-memory catalog fixture");
            Arc::new(SimCatalogClient::from_fixture(path)?)
        }
        None => {
            let http = Client::builder()
                .user_agent(cfg.http.user_agent.clone())
                .pool_idle_timeout(cfg.http.pool_idle_timeout)
                .pool_max_idle_per_host(cfg.http.pool_max_idle_per_host)
                .timeout(cfg.http.timeout)
                .build()
                .context("building http client")?;
            Arc::new(HttpCatalogClient::new(cfg.catalog.clone(), http))
        }
    };

    let categories: Arc<dyn CategoryIndex> =
        Arc::new(StaticCategoryIndex::from_cfg(&cfg.categories));
    let presets = ConfigPresets::from_cfg(&cfg.presets, categories.as_ref())
        .context("resolving presets")?;
    let orchestrator = Arc::new(DiscoveryOrchestrator::new(
        client,
        categories,
        &cfg.catalog,
    ));

    info!("Building actors");
    let (tx, rx) = mpsc::channel::<NicheReport>(64);
    let discovery = NicheDiscoveryActor::new(
        orchestrator,
        Arc::new(presets),
        cfg.discovery.clone(),
        tx,
        shutdown.clone(),
    );

    info!("Spawning actors");
    let mut actors = tokio::task::JoinSet::new();
    actors.spawn(discovery.run().instrument(info_span!("Discovery")));
    actors.spawn(log_results(rx).instrument(info_span!("Results")));

    info!("Waiting for actors");

    tokio::select! {
        _ = async {
             while let Some(res) = actors.join_next().await {
                 match res {
                    Ok(Ok(()))  => info!("Actor exited cleanly"),
                    Ok(Err(e))  => error!(?e, "Actor returned error"),
                    Err(panic)  => error!(?panic, "Actor panicked/cancelled"),
                }
            }
        } => {  }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down supervisor loop");
            shutdown.cancel();
        }
    }

    info!("Waiting for graceful shutdown of actors");
    while let Some(res) = actors.join_next().await {
        match res {
            Ok(Ok(())) => info!("Actor exited cleanly"),
            Ok(Err(e)) => error!(?e, "Actor returned error"),
            Err(panic) => error!(?panic, "Actor panicked/cancelled"),
        }
    }

    info!("Supervisor exit");
    Ok(())
}
