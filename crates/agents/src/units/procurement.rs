use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use opspilot_core::{DataStoreExt, Filter, Invoice, Outcome, Table, Vendor};

use crate::result::{AgentError, AnalysisResult, Findings};
use crate::unit::{AgentContext, AnalysisUnit};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplyRiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorSpend {
    pub vendor_id: String,
    pub name: String,
    pub spend: f64,
    /// Share of attributed spend, in percent.
    pub percentage: f64,
    pub invoice_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSaving {
    pub vendor_id: String,
    pub name: String,
    pub spend: f64,
    pub potential_saving: f64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyRisk {
    pub vendor_id: String,
    pub name: String,
    pub risk: SupplyRiskLevel,
    pub factors: Vec<String>,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementAnalysis {
    pub invoices_analyzed: usize,
    pub total_spend: f64,
    pub vendor_concentration: Vec<VendorSpend>,
    pub cost_saving_opportunities: Vec<CostSaving>,
    pub supply_risks: Vec<SupplyRisk>,
    /// Up to three vendors proposed for a supplier development programme.
    pub development_candidates: Vec<String>,
}

impl ProcurementAnalysis {
    pub fn high_risk_count(&self) -> usize {
        self.supply_risks.iter().filter(|r| r.risk == SupplyRiskLevel::High).count()
    }

    pub fn total_potential_saving(&self) -> f64 {
        self.cost_saving_opportunities.iter().map(|o| o.potential_saving).sum()
    }
}

/// Spend concentration, savings and supply-risk review.
#[derive(Debug, Clone)]
pub struct ProcurementAnalyzer {
    invoice_window: usize,
    saving_spend_floor: f64,
    saving_score_ceiling: f64,
    saving_rate: f64,
    concentration_ceiling: f64,
}

impl Default for ProcurementAnalyzer {
    fn default() -> Self {
        Self {
            invoice_window: 100,
            saving_spend_floor: 50_000.0,
            saving_score_ceiling: 80.0,
            saving_rate: 0.15,
            concentration_ceiling: 40.0,
        }
    }
}

impl ProcurementAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invoice_window(mut self, window: usize) -> Self {
        self.invoice_window = window;
        self
    }

    fn mitigation(level: SupplyRiskLevel) -> &'static str {
        match level {
            SupplyRiskLevel::High => "Identify alternative suppliers and implement dual sourcing",
            SupplyRiskLevel::Medium => "Monitor closely and develop contingency plans",
            SupplyRiskLevel::Low => "Continue current relationship with regular monitoring",
        }
    }

    pub fn analyze(&self, vendors: &[Vendor], invoices: &[Invoice]) -> ProcurementAnalysis {
        let total_spend: f64 = invoices.iter().map(|i| i.amount).sum();

        let mut spend_by_vendor: HashMap<&str, (f64, usize)> = HashMap::new();
        for invoice in invoices {
            if let Some(vendor_id) = invoice.vendor_id.as_deref() {
                let entry = spend_by_vendor.entry(vendor_id).or_default();
                entry.0 += invoice.amount;
                entry.1 += 1;
            }
        }
        let attributed: f64 = spend_by_vendor.values().map(|(spend, _)| spend).sum();

        let mut vendor_concentration = Vec::new();
        let mut cost_saving_opportunities = Vec::new();
        let mut supply_risks = Vec::with_capacity(vendors.len());

        for vendor in vendors {
            let (spend, invoice_count) = spend_by_vendor.get(vendor.id.as_str()).copied().unwrap_or_default();
            let percentage = if attributed > 0.0 { spend / attributed * 100.0 } else { 0.0 };

            if invoice_count > 0 {
                vendor_concentration.push(VendorSpend {
                    vendor_id: vendor.id.clone(),
                    name: vendor.name.clone(),
                    spend,
                    percentage,
                    invoice_count,
                });
            }

            if spend > self.saving_spend_floor && vendor.score < self.saving_score_ceiling {
                cost_saving_opportunities.push(CostSaving {
                    vendor_id: vendor.id.clone(),
                    name: vendor.name.clone(),
                    spend,
                    potential_saving: spend * self.saving_rate,
                    description: "Replace or negotiate better terms with underperforming vendor".to_string(),
                });
            }

            let mut factors = Vec::new();
            let mut risk = SupplyRiskLevel::Low;
            if percentage > self.concentration_ceiling {
                factors.push("Spend concentration".to_string());
                risk = SupplyRiskLevel::High;
            }
            if vendor.score < 70.0 {
                factors.push("Poor performance".to_string());
                risk = SupplyRiskLevel::High;
            }
            if vendor.on_time_delivery_rate < 80.0 {
                factors.push("Delivery reliability".to_string());
                risk = risk.max(SupplyRiskLevel::Medium);
            }
            supply_risks.push(SupplyRisk {
                vendor_id: vendor.id.clone(),
                name: vendor.name.clone(),
                risk,
                factors,
                mitigation: Self::mitigation(risk).to_string(),
            });
        }

        vendor_concentration.sort_by(|a, b| b.spend.total_cmp(&a.spend));

        let development_candidates = vendors
            .iter()
            .filter(|v| v.score < 75.0)
            .take(3)
            .map(|v| v.name.clone())
            .collect();

        ProcurementAnalysis {
            invoices_analyzed: invoices.len(),
            total_spend,
            vendor_concentration,
            cost_saving_opportunities,
            supply_risks,
            development_candidates,
        }
    }

    fn recommendations(analysis: &ProcurementAnalysis) -> Vec<String> {
        let mut out = Vec::new();
        if !analysis.cost_saving_opportunities.is_empty() {
            out.push(format!(
                "Implement cost-saving initiatives for potential ${} savings",
                analysis.total_potential_saving().round()
            ));
        }
        let high = analysis.high_risk_count();
        if high > 0 {
            out.push(format!("Develop alternative suppliers for {high} high-risk vendors"));
        }
        out.push("Implement strategic sourcing for top spend categories".to_string());
        out.push("Establish vendor performance scorecards and SLAs".to_string());
        out.push("Consider e-procurement platform for efficiency gains".to_string());
        out
    }
}

#[async_trait]
impl AnalysisUnit for ProcurementAnalyzer {
    fn entity_type(&self) -> &'static str {
        "procurement"
    }

    fn description(&self) -> &'static str {
        "procurement optimization"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        let vendors: Vec<Vendor> = ctx.store().select_as(Table::Vendors, &Filter::all()).await?;
        let invoices: Vec<Invoice> = ctx
            .store()
            .select_as(Table::Invoices, &Filter::all().newest_first().limit(self.invoice_window))
            .await?;

        let analysis = self.analyze(&vendors, &invoices);

        info!(
            agent = %ctx.agent(),
            invoices = analysis.invoices_analyzed,
            total_spend = analysis.total_spend,
            opportunities = analysis.cost_saving_opportunities.len(),
            high_risk = analysis.high_risk_count(),
            "procurement analyzed"
        );

        let prompt = format!(
            "Analyze procurement data: total spend ${:.2}, {} cost saving opportunities, {} high-risk vendors. \
             Provide strategic procurement insights and optimization recommendations.",
            analysis.total_spend,
            analysis.cost_saving_opportunities.len(),
            analysis.high_risk_count()
        );
        let narrative = ctx.narrate(&prompt, &analysis).await;

        let outcome = Outcome::flagged_if(analysis.high_risk_count() > 0);
        let summary = format!(
            "Procurement analysis completed, identified {} cost-saving opportunities",
            analysis.cost_saving_opportunities.len()
        );
        let recommendations = Self::recommendations(&analysis);
        Ok(AnalysisResult::new(ctx.agent(), outcome, summary, Findings::Procurement(analysis))
            .with_recommendations(recommendations)
            .with_narrative(narrative))
    }
}
