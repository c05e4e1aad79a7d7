use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use opspilot_core::{Outcome, Shipment};

use crate::result::{AgentError, AnalysisResult, Findings};
use crate::unit::{AgentContext, AnalysisUnit};
use crate::units::shipment_tracker::active_shipments;

pub const REQUIRED_DOCUMENTS: [&str; 4] = [
    "Commercial Invoice",
    "Packing List",
    "Bill of Lading",
    "Certificate of Origin",
];

const DEFAULT_DUTY_RATE: f64 = 0.10;

const DUTY_RATES: [(&str, &str, f64); 4] = [
    ("CN", "US", 0.15),
    ("DE", "US", 0.05),
    ("JP", "US", 0.08),
    ("IN", "US", 0.12),
];

const HS_DESCRIPTIONS: [(&str, &str); 5] = [
    ("8471300000", "Portable automatic data processing machines"),
    ("8517120000", "Telephones for cellular networks"),
    ("6203420000", "Men's or boys' trousers of cotton"),
    ("9401800000", "Other seats"),
    ("8708100000", "Bumpers and parts thereof"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub shipment_id: String,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationGap {
    pub shipment_id: String,
    pub missing_documents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutyEstimate {
    pub shipment_id: String,
    /// Percentage, e.g. `15.0`.
    pub duty_rate: f64,
    pub duty_amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HsCodeCheck {
    pub shipment_id: String,
    pub hs_code: Option<String>,
    pub is_valid: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub total_shipments: usize,
    pub compliant_shipments: usize,
    pub non_compliant: Vec<ComplianceIssue>,
    pub documentation_issues: Vec<DocumentationGap>,
    pub duty_estimates: Vec<DutyEstimate>,
    pub hs_code_checks: Vec<HsCodeCheck>,
}

impl ComplianceReport {
    fn has_issues(&self) -> bool {
        !self.non_compliant.is_empty() || !self.documentation_issues.is_empty()
    }
}

/// Country code for a free-text location, `"Unknown"` when unrecognized.
pub fn extract_country(location: &str) -> &'static str {
    if location.contains("USA") || location.contains("United States") {
        "US"
    } else if location.contains("China") {
        "CN"
    } else if location.contains("Germany") {
        "DE"
    } else if location.contains("Japan") {
        "JP"
    } else if location.contains("India") {
        "IN"
    } else {
        "Unknown"
    }
}

/// Fractional duty rate for an origin/destination pair.
pub fn duty_rate(origin: &str, destination: &str) -> f64 {
    let (from, to) = (extract_country(origin), extract_country(destination));
    DUTY_RATES
        .iter()
        .find(|(o, d, _)| *o == from && *d == to)
        .map_or(DEFAULT_DUTY_RATE, |(_, _, rate)| *rate)
}

/// HS classification codes are exactly ten ASCII digits.
pub fn is_valid_hs_code(code: &str) -> bool {
    code.len() == 10 && code.bytes().all(|b| b.is_ascii_digit())
}

pub fn hs_description(code: &str) -> &'static str {
    HS_DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map_or("General merchandise", |(_, d)| d)
}

/// Checks active shipments for clearance readiness. Read-only.
#[derive(Debug, Clone, Default)]
pub struct CustomsCompliance;

impl CustomsCompliance {
    pub fn new() -> Self {
        Self
    }

    pub fn is_international(shipment: &Shipment) -> bool {
        extract_country(&shipment.origin) != extract_country(&shipment.destination)
    }

    pub fn compliance_issues(&self, shipment: &Shipment) -> Vec<String> {
        let mut issues = Vec::new();
        if shipment.origin.trim().is_empty() || shipment.destination.trim().is_empty() {
            issues.push("Missing origin or destination information".to_string());
        }
        if !shipment.value.is_some_and(|v| v > 0.0) {
            issues.push("Invalid or missing shipment value".to_string());
        }
        let has_carrier = shipment.carrier.as_deref().is_some_and(|c| !c.trim().is_empty());
        if Self::is_international(shipment) && !has_carrier {
            issues.push("Missing carrier information for international shipment".to_string());
        }
        issues
    }

    pub fn missing_documents(&self, shipment: &Shipment) -> Vec<String> {
        REQUIRED_DOCUMENTS
            .iter()
            .filter(|doc| !shipment.documents.iter().any(|d| d.eq_ignore_ascii_case(doc)))
            .map(|doc| doc.to_string())
            .collect()
    }

    pub fn duty_estimate(&self, shipment: &Shipment) -> DutyEstimate {
        let rate = duty_rate(&shipment.origin, &shipment.destination);
        let amount = shipment.value.unwrap_or(0.0) * rate;
        DutyEstimate {
            shipment_id: shipment.id.clone(),
            duty_rate: (rate * 100.0 * 100.0).round() / 100.0,
            duty_amount: (amount * 100.0).round() / 100.0,
            currency: shipment.currency.clone(),
        }
    }

    pub fn hs_code_check(&self, shipment: &Shipment) -> HsCodeCheck {
        let code = shipment.hs_code.as_deref().map(str::trim);
        HsCodeCheck {
            shipment_id: shipment.id.clone(),
            hs_code: code.map(str::to_string),
            is_valid: code.is_some_and(is_valid_hs_code),
            description: hs_description(code.unwrap_or_default()).to_string(),
        }
    }

    pub fn check(&self, shipments: &[Shipment]) -> ComplianceReport {
        let mut report = ComplianceReport {
            total_shipments: shipments.len(),
            compliant_shipments: 0,
            non_compliant: Vec::new(),
            documentation_issues: Vec::new(),
            duty_estimates: Vec::with_capacity(shipments.len()),
            hs_code_checks: Vec::with_capacity(shipments.len()),
        };

        for shipment in shipments {
            let issues = self.compliance_issues(shipment);
            if issues.is_empty() {
                report.compliant_shipments += 1;
            } else {
                report.non_compliant.push(ComplianceIssue {
                    shipment_id: shipment.id.clone(),
                    issues,
                });
            }

            let missing_documents = self.missing_documents(shipment);
            if !missing_documents.is_empty() {
                report.documentation_issues.push(DocumentationGap {
                    shipment_id: shipment.id.clone(),
                    missing_documents,
                });
            }

            report.duty_estimates.push(self.duty_estimate(shipment));
            report.hs_code_checks.push(self.hs_code_check(shipment));
        }

        report
    }

    fn recommendations(report: &ComplianceReport) -> Vec<String> {
        let mut out = Vec::new();
        if !report.non_compliant.is_empty() {
            out.push(format!("Address compliance issues for {} shipments", report.non_compliant.len()));
        }
        if !report.documentation_issues.is_empty() {
            out.push(format!(
                "Complete missing documentation for {} shipments",
                report.documentation_issues.len()
            ));
        }
        out.push("Implement automated HS code validation system".to_string());
        out.push("Set up pre-clearance documentation workflows".to_string());
        out.push("Establish relationships with customs brokers in key markets".to_string());
        out
    }
}

#[async_trait]
impl AnalysisUnit for CustomsCompliance {
    fn entity_type(&self) -> &'static str {
        "shipment"
    }

    fn description(&self) -> &'static str {
        "customs compliance check"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        let shipments = active_shipments(ctx.store()).await?;
        let report = self.check(&shipments);

        info!(
            agent = %ctx.agent(),
            shipments = report.total_shipments,
            non_compliant = report.non_compliant.len(),
            documentation_issues = report.documentation_issues.len(),
            "customs compliance checked"
        );

        let prompt = format!(
            "Analyze customs compliance data: {} shipments, {} compliant, {} non-compliant, {} with documentation issues. \
             Provide insights for customs compliance optimization and risk reduction.",
            report.total_shipments,
            report.compliant_shipments,
            report.non_compliant.len(),
            report.documentation_issues.len()
        );
        let narrative = ctx.narrate(&prompt, &report).await;

        let outcome = Outcome::flagged_if(report.has_issues());
        let summary = format!(
            "Compliance check completed, {} issues found",
            report.non_compliant.len() + report.documentation_issues.len()
        );
        let recommendations = Self::recommendations(&report);
        Ok(AnalysisResult::new(ctx.agent(), outcome, summary, Findings::CustomsCompliance(report))
            .with_recommendations(recommendations)
            .with_narrative(narrative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use opspilot_core::{DataStoreExt, InMemoryDataStore, ShipmentStatus, Table};

    fn shipment(origin: &str, destination: &str) -> Shipment {
        Shipment {
            id: "s-1".to_string(),
            vendor_id: None,
            origin: origin.to_string(),
            destination: destination.to_string(),
            carrier: Some("DHL".to_string()),
            status: ShipmentStatus::Customs,
            eta: None,
            actual_delivery: None,
            value: Some(10_000.0),
            currency: "USD".to_string(),
            documents: REQUIRED_DOCUMENTS.iter().map(|d| d.to_string()).collect(),
            hs_code: Some("8471300000".to_string()),
        }
    }

    #[test]
    fn duty_uses_rate_table_and_rounds_to_cents() {
        let unit = CustomsCompliance::new();
        let mut s = shipment("Shenzhen, China", "Los Angeles, USA");
        s.value = Some(1234.567);
        let duty = unit.duty_estimate(&s);
        assert_eq!(duty.duty_rate, 15.0);
        assert_eq!(duty.duty_amount, 185.19);

        assert_eq!(duty_rate("Berlin, Germany", "New York, United States"), 0.05);
        assert_eq!(duty_rate("Paris, France", "Tokyo, Japan"), DEFAULT_DUTY_RATE);
    }

    #[test]
    fn hs_codes_need_exactly_ten_digits() {
        assert!(is_valid_hs_code("8517120000"));
        assert!(!is_valid_hs_code("851712000"));
        assert!(!is_valid_hs_code("85171200AB"));
        assert_eq!(hs_description("9401800000"), "Other seats");
        assert_eq!(hs_description("1234567890"), "General merchandise");

        let mut s = shipment("Mumbai, India", "Houston, USA");
        s.hs_code = None;
        assert!(!CustomsCompliance::new().hs_code_check(&s).is_valid);
    }

    #[test]
    fn international_shipment_without_carrier_is_non_compliant() {
        let mut s = shipment("Tokyo, Japan", "Seattle, USA");
        s.carrier = None;
        s.value = Some(0.0);
        s.documents.retain(|d| d != "Bill of Lading");

        let report = CustomsCompliance::new().check(&[s]);
        assert_eq!(report.compliant_shipments, 0);
        assert_eq!(report.non_compliant[0].issues.len(), 2);
        assert_eq!(report.documentation_issues[0].missing_documents, vec!["Bill of Lading".to_string()]);
        assert!(report.has_issues());
    }

    #[test]
    fn complete_shipment_is_compliant() {
        let report = CustomsCompliance::new().check(&[shipment("Hamburg, Germany", "Newark, USA")]);
        assert_eq!(report.compliant_shipments, 1);
        assert!(!report.has_issues());
    }

    #[tokio::test]
    async fn execute_reports_gaps_without_writing() {
        let ready = shipment("Shenzhen, China", "Los Angeles, USA");
        let mut undocumented = shipment("Mumbai, India", "Houston, USA");
        undocumented.id = "s-2".to_string();
        undocumented.documents = vec!["Commercial Invoice".to_string()];

        let store = Arc::new(InMemoryDataStore::new());
        store.insert_all(Table::Shipments, &[ready, undocumented]).await.unwrap();
        let before = store.rows(Table::Shipments);
        let ctx = AgentContext::new("customs-compliance", store.clone());

        let result = CustomsCompliance::new().execute(&ctx).await.unwrap();
        assert_eq!(result.outcome, Outcome::Degraded);
        let Findings::CustomsCompliance(report) = &result.findings else {
            panic!("unexpected findings: {:?}", result.findings);
        };
        assert_eq!(report.documentation_issues.len(), 1);
        assert_eq!(report.documentation_issues[0].shipment_id, "s-2");

        assert_eq!(store.rows(Table::Shipments), before);
        for table in Table::ALL.into_iter().filter(|t| *t != Table::Shipments) {
            assert_eq!(store.count(table), 0, "unexpected rows in {table}");
        }
    }
}
