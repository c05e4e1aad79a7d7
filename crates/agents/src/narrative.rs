//! Narrative Service boundary (optional, best-effort prose summaries).

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NarrativeError {
    #[error("narrative service unavailable: {0}")]
    Unavailable(String),

    #[error("narrative service timed out")]
    Timeout,

    #[error("invalid narrative response: {0}")]
    InvalidResponse(String),
}

/// External prose generator (an LLM endpoint in production).
///
/// Callers treat every error as non-fatal.
#[async_trait]
pub trait NarrativeService: Send + Sync + 'static {
    async fn generate(&self, prompt: &str, context: &JsonValue) -> Result<String, NarrativeError>;
}
