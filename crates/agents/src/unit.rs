use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use opspilot_core::DataStore;

use crate::narrative::NarrativeService;
use crate::result::{AgentError, AnalysisResult};

/// What started an execution. Recorded in audit metadata.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Single on-demand run (`run_one`).
    Manual,
    /// Part of a `run_all` pass (scheduled or on demand).
    Batch,
}

/// Everything a unit needs to fetch its own snapshot.
///
/// The orchestrator does not pre-load data: each unit reads what it needs
/// through `store()`.
#[derive(Clone)]
pub struct AgentContext {
    agent: String,
    store: Arc<dyn DataStore>,
    narrator: Option<Arc<dyn NarrativeService>>,
    input: Option<JsonValue>,
    trigger: Trigger,
    now: DateTime<Utc>,
}

impl AgentContext {
    pub fn new(agent: impl Into<String>, store: Arc<dyn DataStore>) -> Self {
        Self {
            agent: agent.into(),
            store,
            narrator: None,
            input: None,
            trigger: Trigger::Manual,
            now: Utc::now(),
        }
    }

    pub fn with_narrator(mut self, narrator: Option<Arc<dyn NarrativeService>>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn with_input(mut self, input: Option<JsonValue>) -> Self {
        self.input = input;
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Pin the evaluation clock (deterministic delay checks in tests).
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Registry name of the running unit.
    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn store(&self) -> &dyn DataStore {
        self.store.as_ref()
    }

    pub fn input(&self) -> Option<&JsonValue> {
        self.input.as_ref()
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Ask the narrative service for prose; any failure is logged and yields `None`.
    pub async fn narrate<C: Serialize + Sync>(&self, prompt: &str, context: &C) -> Option<String> {
        let narrator = self.narrator.as_ref()?;

        let context = match serde_json::to_value(context) {
            Ok(v) => v,
            Err(e) => {
                warn!(agent = %self.agent, error = %e, "failed to serialize narrative context");
                return None;
            }
        };

        match narrator.generate(prompt, &context).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(agent = %self.agent, error = %e, "narrative generation failed; continuing without it");
                None
            }
        }
    }
}

/// A named, stateless analysis routine.
///
/// Units read a snapshot through the context's Data Store and return a result.
/// They must not touch global state; all persistence goes through the store.
/// Units are free to fail; isolation is the orchestrator's job.
#[async_trait]
pub trait AnalysisUnit: Send + Sync + 'static {
    /// Domain object the unit's runs concern (audit `entity_type` tag).
    fn entity_type(&self) -> &'static str;

    /// Short description used in audit actions (e.g. "vendor performance analysis").
    fn description(&self) -> &'static str;

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError>;
}
