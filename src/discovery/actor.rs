use crate::config::config::DiscoveryCfg;
use crate::core::error::DiscoveryError;
use crate::core::types::{Actor, DiscoveryResult};
use crate::discovery::orchestrator::DiscoveryOrchestrator;
use crate::discovery::presets::PresetCatalog;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub type NicheReport = (String, DiscoveryResult);

pub struct NicheDiscoveryActor {
    pub orchestrator: Arc<DiscoveryOrchestrator>,
    pub presets: Arc<dyn PresetCatalog>,
    pub cfg: DiscoveryCfg,
    pub results: mpsc::Sender<NicheReport>,
    pub shutdown: CancellationToken,
}

impl NicheDiscoveryActor {
    pub fn new(
        orchestrator: Arc<DiscoveryOrchestrator>,
        presets: Arc<dyn PresetCatalog>,
        cfg: DiscoveryCfg,
        results: mpsc::Sender<NicheReport>,
        shutdown: CancellationToken,
    ) -> NicheDiscoveryActor {
        Self {
            orchestrator,
            presets,
            cfg,
            results,
            shutdown,
        }
    }

    fn selected(&self) -> Vec<String> {
        if self.cfg.presets.is_empty() {
            self.presets.names()
        } else {
            self.cfg.presets.clone()
        }
    }

    async fn run_pass(&self) -> Result<()> {
        for name in self.selected() {
            if self.shutdown.is_cancelled() {
                break;
            }
            let Some(spec) = self.presets.get(&name) else {
                warn!(preset = %name, "NicheDiscoveryActor: unknown preset, skipping");
                continue;
            };

            // a child token so a shutdown mid-run still yields partial results
            let cancel = self.shutdown.child_token();
            match self.orchestrator.discover(&spec, &cancel).await {
                Ok(result) => {
                    if result.exceeds(self.cfg.run_budget) {
                        warn!(
                            preset = %name,
                            elapsed_ms = result.elapsed.as_millis() as u64,
                            budget_ms = self.cfg.run_budget.as_millis() as u64,
                            "NicheDiscoveryActor: run over budget"
                        );
                    }
                    if self.results.send((name, result)).await.is_err() {
                        anyhow::bail!("result channel closed");
                    }
                }
                Err(DiscoveryError::Cancelled) => {
                    info!(preset = %name, "NicheDiscoveryActor: run cancelled before start");
                    break;
                }
                Err(e) => {
                    error!(
                        preset = %name,
                        failed_in = ?e.failed_in(),
                        error = %e,
                        "NicheDiscoveryActor: discovery failed"
                    );
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Actor for NicheDiscoveryActor {
    async fn run(self) -> Result<()> {
        info!(presets = ?self.selected(), "NicheDiscoveryActor started");

        let mut tick = tokio::time::interval(self.cfg.refresh);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("NicheDiscoveryActor: shutdown requested");
                    break;
                }

                _ = tick.tick() => {
                    if let Err(e) = self.run_pass().await {
                        error!("NicheDiscoveryActor: pass aborted: {:#}", e);
                        return Err(e);
                    }
                    if self.cfg.once {
                        info!("NicheDiscoveryActor: single pass complete");
                        break;
                    }
                }
            }
        }
        info!("NicheDiscoveryActor stopped cleanly");
        Ok(())
    }
}
