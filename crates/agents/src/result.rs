use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use opspilot_core::{Outcome, StoreError};

use crate::units::customs_compliance::ComplianceReport;
use crate::units::esg_risk::EsgAssessment;
use crate::units::invoice_validator::InvoiceValidation;
use crate::units::procurement::ProcurementAnalysis;
use crate::units::shipment_tracker::ShipmentTracking;
use crate::units::vendor_monitor::VendorPerformance;

/// Structured findings, one variant per unit category.
///
/// `Custom` carries schema-less payloads for units registered outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Findings {
    VendorPerformance(VendorPerformance),
    InvoiceValidation(InvoiceValidation),
    ShipmentTracking(ShipmentTracking),
    CustomsCompliance(ComplianceReport),
    EsgRisk(EsgAssessment),
    Procurement(ProcurementAnalysis),
    Custom(JsonValue),
}

/// Result of one analysis unit execution.
///
/// Immutable once built; the orchestrator hands one copy to the audit log and
/// returns the original to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Registry name of the unit that produced this result.
    pub agent: String,
    pub outcome: Outcome,
    /// Human-readable one-line summary.
    pub summary: String,
    pub findings: Findings,
    pub recommendations: Vec<String>,
    /// Optional prose from the narrative service (best-effort).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(agent: impl Into<String>, outcome: Outcome, summary: impl Into<String>, findings: Findings) -> Self {
        Self {
            agent: agent.into(),
            outcome,
            summary: summary.into(),
            findings,
            recommendations: Vec::new(),
            narrative: None,
            completed_at: Utc::now(),
        }
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }

    /// Attach a narrative summary; `None` leaves the result untouched.
    pub fn with_narrative(mut self, narrative: Option<String>) -> Self {
        if narrative.is_some() {
            self.narrative = narrative;
        }
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = at;
        self
    }
}

/// Error raised by an analysis unit.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("data store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Analysis(String),

    #[error("unit panicked: {0}")]
    Panicked(String),

    #[error("unit timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

impl AgentError {
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
