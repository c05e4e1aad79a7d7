use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use opspilot_core::{
    DataStoreExt, EsgScore, Filter, Outcome, RiskCategory, RiskFinding, RiskSeverity, Table, Vendor,
};

use crate::result::{AgentError, AnalysisResult, Findings};
use crate::unit::{AgentContext, AnalysisUnit};

pub const ELEVATED_RISK_REGIONS: [&str; 3] = ["Southeast Asia", "South America", "Eastern Europe"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsgRisk {
    pub category: RiskCategory,
    pub severity: RiskSeverity,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighRiskVendor {
    pub vendor_id: String,
    pub name: String,
    /// Overall ESG score, 0 when the vendor has none on file.
    pub esg_score: f64,
    pub risks: Vec<EsgRisk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsgAssessment {
    pub total_vendors: usize,
    pub average_esg_score: f64,
    pub high_risk_vendors: Vec<HighRiskVendor>,
    pub environmental_risks: Vec<String>,
    pub social_risks: Vec<String>,
    pub governance_risks: Vec<String>,
    pub compliance_rate: f64,
    pub carbon_footprint: f64,
    pub risk_findings_written: usize,
}

/// ESG screening of the vendor base.
#[derive(Debug, Clone)]
pub struct EsgRiskMonitor {
    overall_floor: f64,
    category_floor: f64,
    governance_floor: f64,
}

impl Default for EsgRiskMonitor {
    fn default() -> Self {
        Self {
            overall_floor: 60.0,
            category_floor: 60.0,
            governance_floor: 50.0,
        }
    }
}

fn in_elevated_region(vendor: &Vendor) -> bool {
    vendor
        .country
        .as_deref()
        .is_some_and(|country| ELEVATED_RISK_REGIONS.iter().any(|r| country.contains(r)))
}

impl EsgRiskMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overall_floor(mut self, floor: f64) -> Self {
        self.overall_floor = floor;
        self
    }

    pub fn specific_risks(&self, vendor: &Vendor, score: Option<&EsgScore>) -> Vec<EsgRisk> {
        let mut risks = Vec::new();
        if score.is_none_or(|s| s.environmental_score < self.category_floor) {
            risks.push(EsgRisk {
                category: RiskCategory::Environmental,
                severity: RiskSeverity::High,
                description: "High carbon emissions or poor environmental practices".to_string(),
            });
        }
        if in_elevated_region(vendor) {
            risks.push(EsgRisk {
                category: RiskCategory::Social,
                severity: RiskSeverity::Medium,
                description: "Potential labor compliance issues in high-risk region".to_string(),
            });
        }
        if score.is_none_or(|s| s.governance_score < self.governance_floor) {
            risks.push(EsgRisk {
                category: RiskCategory::Governance,
                severity: RiskSeverity::High,
                description: "Poor governance practices or transparency issues".to_string(),
            });
        }
        risks
    }

    pub fn is_high_risk(&self, vendor: &Vendor, score: Option<&EsgScore>) -> bool {
        score.is_none_or(|s| s.overall_score < self.overall_floor) || in_elevated_region(vendor)
    }

    pub fn assess(&self, vendors: &[Vendor], scores: &[EsgScore]) -> EsgAssessment {
        let by_vendor: HashMap<&str, &EsgScore> = scores.iter().map(|s| (s.vendor_id.as_str(), s)).collect();

        let average_esg_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().map(|s| s.overall_score).sum::<f64>() / scores.len() as f64
        };

        let mut assessment = EsgAssessment {
            total_vendors: vendors.len(),
            average_esg_score,
            high_risk_vendors: Vec::new(),
            environmental_risks: Vec::new(),
            social_risks: Vec::new(),
            governance_risks: Vec::new(),
            compliance_rate: 100.0,
            carbon_footprint: 0.0,
            risk_findings_written: 0,
        };

        for vendor in vendors {
            let score = by_vendor.get(vendor.id.as_str()).copied();

            if self.is_high_risk(vendor, score) {
                assessment.high_risk_vendors.push(HighRiskVendor {
                    vendor_id: vendor.id.clone(),
                    name: vendor.name.clone(),
                    esg_score: score.map_or(0.0, |s| s.overall_score),
                    risks: self.specific_risks(vendor, score),
                });
            }

            if let Some(s) = score {
                if s.environmental_score < self.category_floor {
                    assessment.environmental_risks.push(vendor.id.clone());
                }
                if s.social_score < self.category_floor {
                    assessment.social_risks.push(vendor.id.clone());
                }
                if s.governance_score < self.category_floor {
                    assessment.governance_risks.push(vendor.id.clone());
                }
            }

            assessment.carbon_footprint += score
                .and_then(|s| s.carbon_footprint)
                .unwrap_or((100.0 - vendor.score) * 10.0);
        }

        if !vendors.is_empty() {
            let compliant = vendors.len() - assessment.high_risk_vendors.len();
            assessment.compliance_rate = compliant as f64 / vendors.len() as f64 * 100.0;
        }
        assessment.carbon_footprint = assessment.carbon_footprint.round();

        assessment
    }

    fn findings(source: &str, assessment: &EsgAssessment) -> Vec<RiskFinding> {
        assessment
            .high_risk_vendors
            .iter()
            .flat_map(|v| {
                v.risks.iter().map(|r| RiskFinding {
                    vendor_id: v.vendor_id.clone(),
                    source: source.to_string(),
                    category: r.category,
                    severity: r.severity,
                    description: r.description.clone(),
                })
            })
            .collect()
    }

    fn recommendations(assessment: &EsgAssessment) -> Vec<String> {
        let mut out = Vec::new();
        if !assessment.high_risk_vendors.is_empty() {
            out.push(format!(
                "Conduct ESG audits for {} high-risk vendors",
                assessment.high_risk_vendors.len()
            ));
        }
        if !assessment.environmental_risks.is_empty() {
            out.push(format!(
                "Implement environmental improvement plans for {} vendors",
                assessment.environmental_risks.len()
            ));
        }
        if !assessment.social_risks.is_empty() {
            out.push(format!("Review labor practices for {} vendors", assessment.social_risks.len()));
        }
        if assessment.compliance_rate < 90.0 {
            out.push("Strengthen ESG compliance requirements in vendor contracts".to_string());
        }
        out.push("Implement quarterly ESG monitoring and reporting".to_string());
        out.push("Set carbon reduction targets for supply chain".to_string());
        out
    }
}

#[async_trait]
impl AnalysisUnit for EsgRiskMonitor {
    fn entity_type(&self) -> &'static str {
        "esg"
    }

    fn description(&self) -> &'static str {
        "ESG risk assessment"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        let vendors: Vec<Vendor> = ctx.store().select_as(Table::Vendors, &Filter::all()).await?;
        let scores: Vec<EsgScore> = ctx.store().select_as(Table::EsgScores, &Filter::all()).await?;

        let mut assessment = self.assess(&vendors, &scores);
        let findings = Self::findings(ctx.agent(), &assessment);
        assessment.risk_findings_written = ctx.store().insert_all(Table::RiskFindings, &findings).await?;

        info!(
            agent = %ctx.agent(),
            vendors = assessment.total_vendors,
            high_risk = assessment.high_risk_vendors.len(),
            compliance_rate = assessment.compliance_rate,
            "esg risks assessed"
        );

        let prompt = format!(
            "Analyze ESG risk assessment: {} vendors, average ESG score {:.1}, {} high-risk vendors, \
             {} environmental, {} social and {} governance risks, compliance rate {:.1}%. \
             Provide insights for ESG risk mitigation and sustainability improvements.",
            assessment.total_vendors,
            assessment.average_esg_score,
            assessment.high_risk_vendors.len(),
            assessment.environmental_risks.len(),
            assessment.social_risks.len(),
            assessment.governance_risks.len(),
            assessment.compliance_rate
        );
        let narrative = ctx.narrate(&prompt, &assessment).await;

        let outcome = Outcome::flagged_if(!assessment.high_risk_vendors.is_empty());
        let summary = format!(
            "ESG assessment completed, {} high-risk vendors identified",
            assessment.high_risk_vendors.len()
        );
        let recommendations = Self::recommendations(&assessment);
        Ok(AnalysisResult::new(ctx.agent(), outcome, summary, Findings::EsgRisk(assessment))
            .with_recommendations(recommendations)
            .with_narrative(narrative))
    }
}
