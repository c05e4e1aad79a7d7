use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use opspilot_core::{DataStoreExt, Filter, Invoice, InvoiceDiscrepancy, Outcome, Table};

use crate::result::{AgentError, AnalysisResult, Findings};
use crate::unit::{AgentContext, AnalysisUnit};

/// Heuristic indicators; two or more make an invoice a fraud risk.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudFactor {
    AmountAboveCeiling,
    MissingPurchaseOrder,
    MissingGoodsReceipt,
    DueBeforeIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRisk {
    pub invoice_id: String,
    pub invoice_number: String,
    pub factors: Vec<FraudFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceValidation {
    pub total_invoices: usize,
    pub valid_invoices: usize,
    pub discrepancies: Vec<InvoiceDiscrepancy>,
    pub fraud_risk: Vec<FraudRisk>,
    /// Share of invoices without discrepancies, in percent.
    pub accuracy_rate: f64,
}

/// Validates recent invoices against PO/GRN data and fraud heuristics.
#[derive(Debug, Clone)]
pub struct InvoiceValidator {
    amount_ceiling: f64,
    amount_tolerance: f64,
    min_fraud_factors: usize,
    batch_size: usize,
}

impl Default for InvoiceValidator {
    fn default() -> Self {
        Self {
            amount_ceiling: 100_000.0,
            amount_tolerance: 0.01,
            min_fraud_factors: 2,
            batch_size: 50,
        }
    }
}

impl InvoiceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_amount_ceiling(mut self, ceiling: f64) -> Self {
        self.amount_ceiling = ceiling;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fraud indicators present on a single invoice.
    pub fn fraud_factors(&self, invoice: &Invoice) -> Vec<FraudFactor> {
        let mut factors = Vec::new();
        if invoice.amount > self.amount_ceiling {
            factors.push(FraudFactor::AmountAboveCeiling);
        }
        if !invoice.has_po_reference() {
            factors.push(FraudFactor::MissingPurchaseOrder);
        }
        if !invoice.has_grn_reference() {
            factors.push(FraudFactor::MissingGoodsReceipt);
        }
        if let (Some(issue), Some(due)) = (invoice.issue_date, invoice.due_date) {
            if due < issue {
                factors.push(FraudFactor::DueBeforeIssue);
            }
        }
        factors
    }

    pub fn is_fraud_risk(&self, invoice: &Invoice) -> bool {
        self.fraud_factors(invoice).len() >= self.min_fraud_factors
    }

    /// PO-vs-invoice mismatches. Amount takes precedence over quantity.
    pub fn discrepancy(&self, invoice: &Invoice) -> Option<InvoiceDiscrepancy> {
        if let Some(po_amount) = invoice.po_amount {
            if (invoice.amount - po_amount).abs() > self.amount_tolerance {
                return Some(InvoiceDiscrepancy {
                    invoice_id: invoice.id.clone(),
                    kind: "Amount Mismatch".to_string(),
                    item: format!("Invoice {}", invoice.invoice_number),
                    po_value: format!("{po_amount:.2}"),
                    invoice_value: format!("{:.2}", invoice.amount),
                });
            }
        }

        if let (Some(billed), Some(received)) = (invoice.quantity, invoice.received_quantity) {
            if billed != received {
                return Some(InvoiceDiscrepancy {
                    invoice_id: invoice.id.clone(),
                    kind: "Quantity Mismatch".to_string(),
                    item: format!("Invoice {}", invoice.invoice_number),
                    po_value: format!("{received} units"),
                    invoice_value: format!("{billed} units"),
                });
            }
        }

        None
    }

    pub fn validate(&self, invoices: &[Invoice]) -> InvoiceValidation {
        let mut discrepancies = Vec::new();
        let mut fraud_risk = Vec::new();

        for invoice in invoices {
            if let Some(d) = self.discrepancy(invoice) {
                debug!(invoice = %invoice.invoice_number, kind = %d.kind, "invoice discrepancy");
                discrepancies.push(d);
            }

            let factors = self.fraud_factors(invoice);
            if factors.len() >= self.min_fraud_factors {
                fraud_risk.push(FraudRisk {
                    invoice_id: invoice.id.clone(),
                    invoice_number: invoice.invoice_number.clone(),
                    factors,
                });
            }
        }

        let valid_invoices = invoices.len() - discrepancies.len();
        let accuracy_rate = if invoices.is_empty() {
            100.0
        } else {
            valid_invoices as f64 / invoices.len() as f64 * 100.0
        };

        InvoiceValidation {
            total_invoices: invoices.len(),
            valid_invoices,
            discrepancies,
            fraud_risk,
            accuracy_rate,
        }
    }

    fn recommendations(report: &InvoiceValidation) -> Vec<String> {
        let mut out = Vec::new();
        if !report.discrepancies.is_empty() {
            out.push(format!("Review {} invoice discrepancies", report.discrepancies.len()));
        }
        if !report.fraud_risk.is_empty() {
            out.push(format!("Investigate {} invoices for fraud risk", report.fraud_risk.len()));
        }
        if report.accuracy_rate < 95.0 {
            out.push("Implement stricter invoice validation controls".to_string());
        }
        out.push("Automate PO-GRN-Invoice matching process".to_string());
        out
    }

    /// Batch size, overridable per run with `{"limit": n}`.
    fn limit_for(&self, ctx: &AgentContext) -> Result<usize, AgentError> {
        match ctx.input().and_then(|i| i.get("limit")) {
            None => Ok(self.batch_size),
            Some(v) => v
                .as_u64()
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .ok_or_else(|| AgentError::invalid_input("limit must be a positive integer")),
        }
    }
}

#[async_trait]
impl AnalysisUnit for InvoiceValidator {
    fn entity_type(&self) -> &'static str {
        "invoice"
    }

    fn description(&self) -> &'static str {
        "invoice validation"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        let limit = self.limit_for(ctx)?;
        let invoices: Vec<Invoice> = ctx
            .store()
            .select_as(Table::Invoices, &Filter::all().newest_first().limit(limit))
            .await?;

        let report = self.validate(&invoices);
        ctx.store().insert_all(Table::InvoiceDiscrepancies, &report.discrepancies).await?;

        info!(
            agent = %ctx.agent(),
            invoices = report.total_invoices,
            discrepancies = report.discrepancies.len(),
            fraud_risk = report.fraud_risk.len(),
            "invoices validated"
        );

        let prompt = format!(
            "Analyze invoice validation results: {} invoices, {} valid, {} discrepancies, {} fraud risks, accuracy {:.1}%. \
             Provide insights on invoice processing and fraud prevention.",
            report.total_invoices,
            report.valid_invoices,
            report.discrepancies.len(),
            report.fraud_risk.len(),
            report.accuracy_rate
        );
        let narrative = ctx.narrate(&prompt, &report).await;

        let outcome = Outcome::flagged_if(!report.discrepancies.is_empty() || !report.fraud_risk.is_empty());
        let summary = format!(
            "Validated {} invoices, found {} discrepancies",
            report.total_invoices,
            report.discrepancies.len()
        );
        let recommendations = Self::recommendations(&report);
        Ok(AnalysisResult::new(ctx.agent(), outcome, summary, Findings::InvoiceValidation(report))
            .with_recommendations(recommendations)
            .with_narrative(narrative))
    }
}
