use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{error, info, warn};

use opspilot_core::{AuditRecord, DataStore, Outcome};

use crate::audit::AuditLogWriter;
use crate::narrative::NarrativeService;
use crate::registry::{Registry, RegistryError};
use crate::result::{AgentError, AnalysisResult};
use crate::unit::{AgentContext, AnalysisUnit, Trigger};

#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("agent '{agent}' failed: {source}")]
    UnitExecution {
        agent: String,
        #[source]
        source: AgentError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Upper bound on a single unit execution. `None` waits indefinitely.
    pub unit_timeout: Option<Duration>,
}

/// Per-unit outcome inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchStatus {
    Success { result: AnalysisResult },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub name: String,
    #[serde(flatten)]
    pub status: BatchStatus,
}

impl BatchEntry {
    pub fn is_success(&self) -> bool {
        matches!(self.status, BatchStatus::Success { .. })
    }
}

/// Ordered outcome of one `run_all` pass (registry order).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchRunResult {
    pub entries: Vec<BatchEntry>,
}

impl BatchRunResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BatchEntry> {
        self.entries.iter()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

/// Runs registered units with failure isolation and one audit record per attempt.
pub struct Orchestrator {
    registry: Arc<Registry>,
    store: Arc<dyn DataStore>,
    audit: AuditLogWriter,
    narrator: Option<Arc<dyn NarrativeService>>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn DataStore>) -> Self {
        Self {
            registry,
            audit: AuditLogWriter::new(Arc::clone(&store)),
            store,
            narrator: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Route audit records to a different store than the one units read.
    pub fn with_audit(mut self, audit: AuditLogWriter) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrativeService>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn audit(&self) -> &AuditLogWriter {
        &self.audit
    }

    /// Run a single unit. Unit failures are audited, then returned to the caller.
    pub async fn run_one(&self, name: &str, input: Option<JsonValue>) -> Result<AnalysisResult, OrchestratorError> {
        let unit = self.registry.lookup(name).map_err(|e| match e {
            RegistryError::NotFound(name) => OrchestratorError::NotFound(name),
            other => OrchestratorError::Registry(other),
        })?;

        self.execute(name, unit, input, Trigger::Manual)
            .await
            .map_err(|source| OrchestratorError::UnitExecution {
                agent: name.to_string(),
                source,
            })
    }

    /// Run every registered unit once, sequentially, in registry order.
    ///
    /// Only a registry failure aborts the pass; unit failures land in their entry.
    pub async fn run_all(&self) -> Result<BatchRunResult, OrchestratorError> {
        let entries = self.registry.entries()?;
        info!(units = entries.len(), "batch run started");

        let mut batch = BatchRunResult::default();
        for (name, unit) in entries {
            let status = match self.execute(&name, unit, None, Trigger::Batch).await {
                Ok(result) => BatchStatus::Success { result },
                Err(e) => BatchStatus::Failed { error: e.to_string() },
            };
            batch.entries.push(BatchEntry { name, status });
        }

        info!(
            units = batch.len(),
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            "batch run finished"
        );
        Ok(batch)
    }

    /// Run one unit and record the attempt.
    ///
    /// The run, its audit record and its registry update all happen on a
    /// detached task, so dropping the caller's future never leaves an
    /// execution unaudited.
    async fn execute(
        &self,
        name: &str,
        unit: Arc<dyn AnalysisUnit>,
        input: Option<JsonValue>,
        trigger: Trigger,
    ) -> Result<AnalysisResult, AgentError> {
        let ctx = AgentContext::new(name, Arc::clone(&self.store))
            .with_narrator(self.narrator.clone())
            .with_input(input)
            .with_trigger(trigger);

        let attempt = Attempt {
            name: name.to_string(),
            unit,
            trigger,
            audit: self.audit.clone(),
            registry: Arc::clone(&self.registry),
            unit_timeout: self.config.unit_timeout,
        };

        match tokio::spawn(attempt.run(ctx)).await {
            Ok(outcome) => outcome,
            Err(e) => Err(AgentError::analysis(format!("audited run aborted: {e}"))),
        }
    }
}

/// Everything one execution needs once it is detached from the caller.
struct Attempt {
    name: String,
    unit: Arc<dyn AnalysisUnit>,
    trigger: Trigger,
    audit: AuditLogWriter,
    registry: Arc<Registry>,
    unit_timeout: Option<Duration>,
}

impl Attempt {
    async fn run(self, ctx: AgentContext) -> Result<AnalysisResult, AgentError> {
        let name = self.name.as_str();
        let trigger = self.trigger;

        info!(agent = name, trigger = ?trigger, "unit running");
        let started = Instant::now();
        let outcome = spawn_unit(Arc::clone(&self.unit), ctx, self.unit_timeout)
            .await
            .map(|result| result.with_completed_at(Utc::now()));
        let duration_ms = started.elapsed().as_millis() as u64;

        let record = match &outcome {
            Ok(result) => {
                info!(agent = name, outcome = %result.outcome, duration_ms, "unit succeeded");
                AuditRecord::new(name, result.summary.clone(), result.outcome, self.unit.entity_type()).with_metadata(
                    json!({
                        "trigger": trigger,
                        "duration_ms": duration_ms,
                        "recommendations": result.recommendations,
                    }),
                )
            }
            Err(e) => {
                error!(agent = name, error = %e, duration_ms, "unit failed");
                AuditRecord::new(
                    name,
                    format!("{} failed: {e}", self.unit.description()),
                    Outcome::Failed,
                    self.unit.entity_type(),
                )
                .with_metadata(json!({
                    "trigger": trigger,
                    "duration_ms": duration_ms,
                    "error": e.to_string(),
                }))
            }
        };
        self.audit.append(&record).await;

        if let Err(e) = self.registry.record_run(name, Utc::now(), record.outcome) {
            warn!(agent = name, error = %e, "failed to record run in registry");
        }

        outcome
    }
}

/// Execute on its own task so a panic becomes an error instead of unwinding the attempt.
async fn spawn_unit(
    unit: Arc<dyn AnalysisUnit>,
    ctx: AgentContext,
    unit_timeout: Option<Duration>,
) -> Result<AnalysisResult, AgentError> {
    let mut handle = tokio::spawn(async move { unit.execute(&ctx).await });

    let joined = match unit_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(AgentError::TimedOut(limit));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(AgentError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(AgentError::analysis(format!("unit task cancelled: {e}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
