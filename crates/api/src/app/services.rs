use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use opspilot_agents::{NarrativeService, Orchestrator, OrchestratorConfig, Registry};
use opspilot_core::{DataStore, InMemoryDataStore};
use opspilot_infra::{HttpNarrativeClient, NarrativeClientConfig, PostgresDataStore, SchedulerTrigger, seed_demo_data};

use crate::config::AppConfig;

/// Shared services handed to every handler.
pub struct AppServices {
    orchestrator: Arc<Orchestrator>,
    scheduler: Option<SchedulerTrigger>,
}

impl AppServices {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            scheduler: None,
        }
    }

    /// Expose the running scheduler's manual trigger over HTTP.
    pub fn with_scheduler_trigger(mut self, trigger: SchedulerTrigger) -> Self {
        self.scheduler = Some(trigger);
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// `None` when the recurring scheduler is disabled.
    pub fn scheduler_trigger(&self) -> Option<&SchedulerTrigger> {
        self.scheduler.as_ref()
    }

    /// Wire the Data Store, the six built-in units and the optional narrator.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store = build_store(config).await?;

        let registry = Registry::with_default_units().context("failed to register analysis units")?;
        info!(units = registry.len(), "registry populated");

        let mut orchestrator = Orchestrator::new(Arc::new(registry), store).with_config(OrchestratorConfig {
            unit_timeout: config.unit_timeout,
        });
        if let Some(narrator) = build_narrator(config) {
            orchestrator = orchestrator.with_narrator(narrator);
        }

        Ok(Self::new(Arc::new(orchestrator)))
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DataStore>> {
    if config.use_persistent_stores {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
        let store = PostgresDataStore::connect(url)
            .await
            .context("failed to connect to Postgres")?;
        info!("using postgres data store");
        return Ok(Arc::new(store));
    }

    let store: Arc<dyn DataStore> = Arc::new(InMemoryDataStore::new());
    if config.seed_demo_data {
        seed_demo_data(store.as_ref()).await.context("failed to seed demo data")?;
    }
    info!("using in-memory data store");
    Ok(store)
}

fn build_narrator(config: &AppConfig) -> Option<Arc<dyn NarrativeService>> {
    let settings = config.narrative.as_ref()?;
    let client_config = NarrativeClientConfig::new(settings.url.clone())
        .with_api_key(Some(settings.api_key.clone()))
        .with_timeout(settings.timeout);

    match HttpNarrativeClient::new(client_config) {
        Ok(client) => {
            info!(url = %settings.url, "narrative service enabled");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "narrative client unavailable; continuing without summaries");
            None
        }
    }
}
