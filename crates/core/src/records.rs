//! Domain records read and written by the analysis units.
//!
//! Records travel through the [`DataStore`](crate::store::DataStore) as JSON
//! objects; these types are the typed view units deserialize into. Optional
//! columns default so that partially populated rows still load.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::id::RecordId;

/// Outcome category of one unit execution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    /// Ran to completion but found something that needs attention.
    Degraded,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Degraded => "degraded",
            Outcome::Failed => "failed",
        }
    }

    /// `Degraded` when `flagged`, otherwise `Success`.
    pub fn flagged_if(flagged: bool) -> Self {
        if flagged { Outcome::Degraded } else { Outcome::Success }
    }
}

impl core::fmt::Display for Outcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub on_time_delivery_rate: f64,
    #[serde(default)]
    pub quality_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsgScore {
    pub vendor_id: String,
    pub overall_score: f64,
    #[serde(default)]
    pub environmental_score: f64,
    #[serde(default)]
    pub social_score: f64,
    #[serde(default)]
    pub governance_score: f64,
    /// Reported footprint in tonnes CO2e, when the vendor discloses one.
    #[serde(default)]
    pub carbon_footprint: Option<f64>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    Customs,
    Delayed,
    Delivered,
}

impl ShipmentStatus {
    /// Statuses the tracking and customs units consider "active".
    pub const ACTIVE: [ShipmentStatus; 4] = [
        ShipmentStatus::Pending,
        ShipmentStatus::InTransit,
        ShipmentStatus::Customs,
        ShipmentStatus::Delayed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "pending",
            ShipmentStatus::InTransit => "in-transit",
            ShipmentStatus::Customs => "customs",
            ShipmentStatus::Delayed => "delayed",
            ShipmentStatus::Delivered => "delivered",
        }
    }
}

impl core::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: String,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub carrier: Option<String>,
    pub status: ShipmentStatus,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Names of the customs documents on file.
    #[serde(default)]
    pub documents: Vec<String>,
    /// Harmonized System classification code.
    #[serde(default)]
    pub hs_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub po_number: Option<String>,
    /// Goods-received note reference.
    #[serde(default)]
    pub grn_number: Option<String>,
    pub amount: f64,
    /// Amount on the matching purchase order, when known.
    #[serde(default)]
    pub po_amount: Option<f64>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub received_quantity: Option<u32>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl Invoice {
    pub fn has_po_reference(&self) -> bool {
        has_text(&self.po_number)
    }

    pub fn has_grn_reference(&self) -> bool {
        has_text(&self.grn_number)
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDiscrepancy {
    pub invoice_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub item: String,
    pub po_value: String,
    pub invoice_value: String,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Performance,
    Delivery,
    Environmental,
    Social,
    Governance,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Risk annotation written by the vendor and ESG units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub vendor_id: String,
    /// Registry name of the unit that raised the finding.
    pub source: String,
    pub category: RiskCategory,
    pub severity: RiskSeverity,
    pub description: String,
}

/// One append-only audit row per execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: RecordId,
    pub agent: String,
    pub action: String,
    pub outcome: Outcome,
    /// Domain object the run concerned (`vendor`, `invoice`, `shipment`, ...).
    pub entity_type: String,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        agent: impl Into<String>,
        action: impl Into<String>,
        outcome: Outcome,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            agent: agent.into(),
            action: action.into(),
            outcome,
            entity_type: entity_type.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shipment_status_uses_kebab_case() {
        let s: ShipmentStatus = serde_json::from_value(json!("in-transit")).unwrap();
        assert_eq!(s, ShipmentStatus::InTransit);
        assert_eq!(serde_json::to_value(ShipmentStatus::Delivered).unwrap(), json!("delivered"));
    }

    #[test]
    fn invoice_loads_with_sparse_columns() {
        let inv: Invoice = serde_json::from_value(json!({
            "id": "inv-1",
            "invoice_number": "INV-001",
            "amount": 1200.0,
            "po_number": "  ",
            "issue_date": "2024-03-01"
        }))
        .unwrap();

        assert_eq!(inv.currency, "USD");
        assert!(!inv.has_po_reference());
        assert!(!inv.has_grn_reference());
        assert_eq!(inv.issue_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn outcome_flagging() {
        assert_eq!(Outcome::flagged_if(true), Outcome::Degraded);
        assert_eq!(Outcome::flagged_if(false), Outcome::Success);
        assert_eq!(Outcome::Failed.to_string(), "failed");
    }
}
