use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use opspilot_core::{AuditRecord, DataStore, DataStoreExt, Filter, StoreError, Table};

#[derive(Debug, Clone, Error)]
#[error("failed to write audit record for agent '{agent}': {source}")]
pub struct AuditWriteError {
    pub agent: String,
    #[source]
    pub source: StoreError,
}

/// Appends one `agent_actions` row per execution attempt.
#[derive(Clone)]
pub struct AuditLogWriter {
    store: Arc<dyn DataStore>,
}

impl AuditLogWriter {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn try_append(&self, record: &AuditRecord) -> Result<(), AuditWriteError> {
        self.store
            .insert_one(Table::AgentActions, record)
            .await
            .map(|_| ())
            .map_err(|source| AuditWriteError {
                agent: record.agent.clone(),
                source,
            })
    }

    /// Best-effort append. Failures are logged and swallowed.
    pub async fn append(&self, record: &AuditRecord) {
        if let Err(e) = self.try_append(record).await {
            warn!(
                agent = %record.agent,
                outcome = %record.outcome,
                error = %e,
                "audit write failed"
            );
        }
    }

    /// Newest audit records first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        self.store
            .select_as(Table::AgentActions, &Filter::all().newest_first().limit(limit))
            .await
    }
}
