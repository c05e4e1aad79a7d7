use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use opspilot_core::{DataStoreExt, Filter, Outcome, RiskCategory, RiskFinding, RiskSeverity, Table, Vendor};

use crate::result::{AgentError, AnalysisResult, Findings};
use crate::unit::{AgentContext, AnalysisUnit};

/// Vendor reference used inside reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorRef {
    pub id: String,
    pub name: String,
    pub score: f64,
    pub on_time_delivery_rate: f64,
}

impl From<&Vendor> for VendorRef {
    fn from(v: &Vendor) -> Self {
        Self {
            id: v.id.clone(),
            name: v.name.clone(),
            score: v.score,
            on_time_delivery_rate: v.on_time_delivery_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorPerformance {
    pub total_vendors: usize,
    pub average_score: f64,
    pub top_performers: Vec<VendorRef>,
    pub under_performers: Vec<VendorRef>,
    /// Vendors with a poor on-time delivery rate.
    pub risk_vendors: Vec<VendorRef>,
    pub risk_annotations_written: usize,
}

/// Scores vendor performance and annotates vendors that fall under thresholds.
#[derive(Debug, Clone)]
pub struct VendorMonitor {
    top_score: f64,
    under_score: f64,
    on_time_floor: f64,
    max_top_performers: usize,
}

impl Default for VendorMonitor {
    fn default() -> Self {
        Self {
            top_score: 90.0,
            under_score: 70.0,
            on_time_floor: 80.0,
            max_top_performers: 5,
        }
    }
}

impl VendorMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_under_score(mut self, threshold: f64) -> Self {
        self.under_score = threshold;
        self
    }

    pub fn with_on_time_floor(mut self, threshold: f64) -> Self {
        self.on_time_floor = threshold;
        self
    }

    /// Pure scoring step (no IO).
    pub fn analyze(&self, vendors: &[Vendor]) -> VendorPerformance {
        let average_score = if vendors.is_empty() {
            0.0
        } else {
            vendors.iter().map(|v| v.score).sum::<f64>() / vendors.len() as f64
        };

        VendorPerformance {
            total_vendors: vendors.len(),
            average_score,
            top_performers: vendors
                .iter()
                .filter(|v| v.score >= self.top_score)
                .take(self.max_top_performers)
                .map(VendorRef::from)
                .collect(),
            under_performers: vendors
                .iter()
                .filter(|v| v.score < self.under_score)
                .map(VendorRef::from)
                .collect(),
            risk_vendors: vendors
                .iter()
                .filter(|v| v.on_time_delivery_rate < self.on_time_floor)
                .map(VendorRef::from)
                .collect(),
            risk_annotations_written: 0,
        }
    }

    fn annotations(&self, source: &str, report: &VendorPerformance) -> Vec<RiskFinding> {
        let performance = report.under_performers.iter().map(|v| RiskFinding {
            vendor_id: v.id.clone(),
            source: source.to_string(),
            category: RiskCategory::Performance,
            severity: RiskSeverity::Medium,
            description: format!("{} scored {:.1}, below {:.0}", v.name, v.score, self.under_score),
        });
        let delivery = report.risk_vendors.iter().map(|v| RiskFinding {
            vendor_id: v.id.clone(),
            source: source.to_string(),
            category: RiskCategory::Delivery,
            severity: RiskSeverity::High,
            description: format!(
                "{} delivers on time {:.1}% of the time, below {:.0}%",
                v.name, v.on_time_delivery_rate, self.on_time_floor
            ),
        });
        performance.chain(delivery).collect()
    }

    fn recommendations(report: &VendorPerformance) -> Vec<String> {
        let mut out = Vec::new();
        if !report.under_performers.is_empty() {
            out.push(format!("Review {} underperforming vendors", report.under_performers.len()));
        }
        if !report.risk_vendors.is_empty() {
            out.push(format!("Address delivery issues with {} vendors", report.risk_vendors.len()));
        }
        if report.average_score < 80.0 {
            out.push("Implement vendor improvement program".to_string());
        }
        out.push("Schedule quarterly vendor performance reviews".to_string());
        out
    }
}

#[async_trait]
impl AnalysisUnit for VendorMonitor {
    fn entity_type(&self) -> &'static str {
        "vendor"
    }

    fn description(&self) -> &'static str {
        "vendor performance analysis"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        let vendors: Vec<Vendor> = ctx.store().select_as(Table::Vendors, &Filter::all()).await?;

        let mut report = self.analyze(&vendors);
        let findings = self.annotations(ctx.agent(), &report);
        report.risk_annotations_written = ctx.store().insert_all(Table::RiskFindings, &findings).await?;

        info!(
            agent = %ctx.agent(),
            vendors = report.total_vendors,
            under_performers = report.under_performers.len(),
            risk_vendors = report.risk_vendors.len(),
            "vendor performance analyzed"
        );

        let prompt = format!(
            "Analyze vendor performance: {} vendors, average score {:.1}, {} underperformers, {} delivery-risk vendors. \
             Provide supply chain optimization recommendations.",
            report.total_vendors,
            report.average_score,
            report.under_performers.len(),
            report.risk_vendors.len()
        );
        let narrative = ctx.narrate(&prompt, &report).await;

        let outcome = Outcome::flagged_if(!report.under_performers.is_empty() || !report.risk_vendors.is_empty());
        let recommendations = Self::recommendations(&report);
        Ok(AnalysisResult::new(
            ctx.agent(),
            outcome,
            format!("Analyzed performance of {} vendors", report.total_vendors),
            Findings::VendorPerformance(report),
        )
        .with_recommendations(recommendations)
        .with_narrative(narrative))
    }
}
