use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use opspilot_core::{DataStore, DataStoreExt, Filter, Outcome, Shipment, ShipmentStatus, Table};

use crate::result::{AgentError, AnalysisResult, Findings};
use crate::unit::{AgentContext, AnalysisUnit};

const WEATHER_RISK_CITIES: [&str; 4] = ["Shanghai", "Mumbai", "Miami", "Houston"];

/// Per-shipment evaluation at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentAssessment {
    pub shipment_id: String,
    pub status: ShipmentStatus,
    pub is_delayed: bool,
    /// Whole hours past the ETA (0 when on time).
    pub estimated_delay_hours: i64,
    pub weather_risk: bool,
    /// Status the shipment should move to, if any.
    pub new_status: Option<ShipmentStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub shipment_id: String,
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentTracking {
    pub total_shipments: usize,
    pub in_transit: usize,
    pub on_time: usize,
    pub delayed: Vec<ShipmentAssessment>,
    pub weather_impacted: Vec<String>,
    pub customs_held: Vec<String>,
    pub status_changes: Vec<StatusChange>,
}

/// Tracks active shipments, flags delays and weather exposure, advances status.
#[derive(Debug, Clone, Default)]
pub struct ShipmentTracker;

impl ShipmentTracker {
    pub fn new() -> Self {
        Self
    }

    /// Delay, weather and status evaluation for one shipment.
    pub fn assess(&self, shipment: &Shipment, now: DateTime<Utc>) -> ShipmentAssessment {
        let is_delayed = shipment.status != ShipmentStatus::Delivered && shipment.eta.is_some_and(|eta| now > eta);
        let estimated_delay_hours = match shipment.eta {
            Some(eta) if is_delayed => (now - eta).num_hours(),
            _ => 0,
        };

        let weather_risk = WEATHER_RISK_CITIES
            .iter()
            .any(|city| shipment.origin.contains(city) || shipment.destination.contains(city));

        let new_status = if shipment.actual_delivery.is_some() && shipment.status != ShipmentStatus::Delivered {
            Some(ShipmentStatus::Delivered)
        } else if shipment.status == ShipmentStatus::InTransit && is_delayed {
            Some(ShipmentStatus::Delayed)
        } else {
            None
        };

        ShipmentAssessment {
            shipment_id: shipment.id.clone(),
            status: shipment.status,
            is_delayed,
            estimated_delay_hours,
            weather_risk,
            new_status,
        }
    }

    pub fn track(&self, shipments: &[Shipment], now: DateTime<Utc>) -> ShipmentTracking {
        let mut report = ShipmentTracking {
            total_shipments: shipments.len(),
            in_transit: 0,
            on_time: 0,
            delayed: Vec::new(),
            weather_impacted: Vec::new(),
            customs_held: Vec::new(),
            status_changes: Vec::new(),
        };

        for shipment in shipments {
            let assessment = self.assess(shipment, now);

            match shipment.status {
                ShipmentStatus::InTransit => report.in_transit += 1,
                ShipmentStatus::Customs => report.customs_held.push(shipment.id.clone()),
                _ => {}
            }
            if assessment.weather_risk {
                report.weather_impacted.push(shipment.id.clone());
            }
            if let Some(to) = assessment.new_status {
                report.status_changes.push(StatusChange {
                    shipment_id: shipment.id.clone(),
                    from: shipment.status,
                    to,
                });
            }
            if assessment.is_delayed {
                report.delayed.push(assessment);
            } else if shipment.status == ShipmentStatus::InTransit {
                report.on_time += 1;
            }
        }

        report
    }

    fn recommendations(report: &ShipmentTracking) -> Vec<String> {
        let mut out = Vec::new();
        if !report.delayed.is_empty() {
            out.push(format!("Address {} delayed shipments", report.delayed.len()));
        }
        if !report.weather_impacted.is_empty() {
            out.push(format!("Monitor weather conditions for {} shipments", report.weather_impacted.len()));
        }
        if !report.customs_held.is_empty() {
            out.push(format!("Expedite customs clearance for {} shipments", report.customs_held.len()));
        }
        out.push("Implement proactive delay notification system".to_string());
        out.push("Consider alternative routes for weather-prone areas".to_string());
        out
    }
}

/// Read the shipments the tracking and customs units work on.
pub(crate) async fn active_shipments(store: &dyn DataStore) -> Result<Vec<Shipment>, AgentError> {
    let statuses = ShipmentStatus::ACTIVE.iter().map(|s| s.as_str());
    Ok(store
        .select_as(Table::Shipments, &Filter::all().is_in("status", statuses))
        .await?)
}

#[async_trait]
impl AnalysisUnit for ShipmentTracker {
    fn entity_type(&self) -> &'static str {
        "shipment"
    }

    fn description(&self) -> &'static str {
        "shipment tracking"
    }

    async fn execute(&self, ctx: &AgentContext) -> Result<AnalysisResult, AgentError> {
        let shipments = active_shipments(ctx.store()).await?;
        let report = self.track(&shipments, ctx.now());

        for change in &report.status_changes {
            ctx.store()
                .update(
                    Table::Shipments,
                    &Filter::all().eq("id", change.shipment_id.as_str()),
                    json!({ "status": change.to, "updated_at": Utc::now() }),
                )
                .await?;
        }

        info!(
            agent = %ctx.agent(),
            shipments = report.total_shipments,
            delayed = report.delayed.len(),
            status_changes = report.status_changes.len(),
            "shipments tracked"
        );

        let prompt = format!(
            "Analyze shipment tracking data: {} shipments, {} in transit, {} delayed, {} weather impacted, {} held in customs. \
             Provide insights for delay prevention.",
            report.total_shipments,
            report.in_transit,
            report.delayed.len(),
            report.weather_impacted.len(),
            report.customs_held.len()
        );
        let narrative = ctx.narrate(&prompt, &report).await;

        let outcome = Outcome::flagged_if(!report.delayed.is_empty());
        let summary = format!(
            "Tracked {} shipments, {} delayed",
            report.total_shipments,
            report.delayed.len()
        );
        let recommendations = Self::recommendations(&report);
        Ok(AnalysisResult::new(ctx.agent(), outcome, summary, Findings::ShipmentTracking(report))
            .with_recommendations(recommendations)
            .with_narrative(narrative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};
    use opspilot_core::InMemoryDataStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn shipment(status: ShipmentStatus, eta: Option<DateTime<Utc>>) -> Shipment {
        Shipment {
            id: "s-1".to_string(),
            vendor_id: None,
            origin: "Rotterdam".to_string(),
            destination: "Chicago, USA".to_string(),
            carrier: Some("Maersk".to_string()),
            status,
            eta,
            actual_delivery: None,
            value: Some(1000.0),
            currency: "USD".to_string(),
            documents: Vec::new(),
            hs_code: None,
        }
    }

    #[test]
    fn past_eta_and_not_delivered_is_delayed() {
        let s = shipment(ShipmentStatus::InTransit, Some(now() - Duration::hours(30)));
        let a = ShipmentTracker::new().assess(&s, now());

        assert!(a.is_delayed);
        assert_eq!(a.estimated_delay_hours, 30);
        assert_eq!(a.new_status, Some(ShipmentStatus::Delayed));
    }

    #[test]
    fn future_eta_or_delivered_is_not_delayed() {
        let tracker = ShipmentTracker::new();
        let on_time = shipment(ShipmentStatus::InTransit, Some(now() + Duration::hours(1)));
        assert!(!tracker.assess(&on_time, now()).is_delayed);

        let delivered = shipment(ShipmentStatus::Delivered, Some(now() - Duration::days(3)));
        assert!(!tracker.assess(&delivered, now()).is_delayed);

        let no_eta = shipment(ShipmentStatus::Pending, None);
        assert!(!tracker.assess(&no_eta, now()).is_delayed);
    }

    #[test]
    fn recorded_delivery_transitions_to_delivered() {
        let mut s = shipment(ShipmentStatus::InTransit, Some(now() - Duration::hours(2)));
        s.actual_delivery = Some(now() - Duration::hours(1));
        assert_eq!(ShipmentTracker::new().assess(&s, now()).new_status, Some(ShipmentStatus::Delivered));
    }

    #[test]
    fn weather_routes_are_flagged() {
        let mut s = shipment(ShipmentStatus::Pending, None);
        s.origin = "Shanghai, China".to_string();
        let report = ShipmentTracker::new().track(&[s], now());
        assert_eq!(report.weather_impacted, vec!["s-1".to_string()]);
    }

    #[tokio::test]
    async fn execute_persists_status_transitions() {
        let late = shipment(ShipmentStatus::InTransit, Some(now() - Duration::hours(5)));
        let mut arrived = shipment(ShipmentStatus::InTransit, Some(now() - Duration::hours(2)));
        arrived.id = "s-2".to_string();
        arrived.actual_delivery = Some(now() - Duration::hours(1));
        let mut waiting = shipment(ShipmentStatus::Pending, Some(now() + Duration::days(2)));
        waiting.id = "s-3".to_string();

        let store = Arc::new(InMemoryDataStore::new());
        store.insert_all(Table::Shipments, &[late, arrived, waiting]).await.unwrap();
        let ctx = AgentContext::new("shipment-tracker", store.clone()).with_now(now());

        let result = ShipmentTracker::new().execute(&ctx).await.unwrap();
        assert_eq!(result.outcome, Outcome::Degraded);

        let rows = store.rows(Table::Shipments);
        let status_of = |id: &str| rows.iter().find(|r| r["id"] == id).unwrap().clone();
        assert_eq!(status_of("s-1")["status"], "delayed");
        assert_eq!(status_of("s-2")["status"], "delivered");
        assert!(status_of("s-1")["updated_at"].is_string());
        assert_eq!(status_of("s-3")["status"], "pending");
        assert!(status_of("s-3").get("updated_at").is_none());
    }
}
