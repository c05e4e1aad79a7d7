//! Demo data for local runs.

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use opspilot_core::{
    DataStore, DataStoreExt, EsgScore, Filter, Invoice, Shipment, ShipmentStatus, StoreResult, Table, Vendor,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub vendors: usize,
    pub esg_scores: usize,
    pub shipments: usize,
    pub invoices: usize,
}

fn vendor(id: &str, name: &str, country: &str, score: f64, on_time: f64, quality: f64) -> Vendor {
    Vendor {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(format!("ops@{}.example", id)),
        country: Some(country.to_string()),
        score,
        on_time_delivery_rate: on_time,
        quality_score: quality,
    }
}

fn esg(vendor_id: &str, overall: f64, env: f64, social: f64, gov: f64, carbon: Option<f64>) -> EsgScore {
    EsgScore {
        vendor_id: vendor_id.to_string(),
        overall_score: overall,
        environmental_score: env,
        social_score: social,
        governance_score: gov,
        carbon_footprint: carbon,
    }
}

fn demo_vendors() -> Vec<Vendor> {
    vec![
        vendor("v-acme", "Acme Components", "Germany", 94.0, 97.0, 92.0),
        vendor("v-pacific", "Pacific Textiles", "Vietnam, Southeast Asia", 66.0, 72.0, 70.0),
        vendor("v-andes", "Andes Packaging", "Chile, South America", 81.0, 88.0, 84.0),
        vendor("v-shen", "Shenzhen Electronics", "China", 77.0, 91.0, 79.0),
        vendor("v-lakes", "Great Lakes Freight", "United States", 89.0, 76.0, 90.0),
    ]
}

fn demo_esg_scores() -> Vec<EsgScore> {
    vec![
        esg("v-acme", 86.0, 88.0, 84.0, 86.0, Some(120.5)),
        esg("v-pacific", 48.0, 52.0, 41.0, 45.0, None),
        esg("v-andes", 71.0, 75.0, 62.0, 70.0, Some(240.0)),
        esg("v-shen", 58.0, 55.0, 63.0, 57.0, None),
    ]
}

fn demo_shipments() -> Vec<Shipment> {
    let now = Utc::now();
    let shipment = |id: &str, vendor: &str, origin: &str, destination: &str, status: ShipmentStatus| Shipment {
        id: id.to_string(),
        vendor_id: Some(vendor.to_string()),
        origin: origin.to_string(),
        destination: destination.to_string(),
        carrier: Some("Maersk".to_string()),
        status,
        eta: None,
        actual_delivery: None,
        value: Some(25_000.0),
        currency: "USD".to_string(),
        documents: vec![
            "Commercial Invoice".to_string(),
            "Packing List".to_string(),
            "Bill of Lading".to_string(),
            "Certificate of Origin".to_string(),
        ],
        hs_code: Some("8471300000".to_string()),
    };

    let mut late = shipment("s-1001", "v-shen", "Shanghai, China", "Los Angeles, USA", ShipmentStatus::InTransit);
    late.eta = Some(now - Duration::hours(36));
    late.value = Some(84_250.0);

    let mut on_time = shipment("s-1002", "v-acme", "Hamburg, Germany", "Newark, USA", ShipmentStatus::InTransit);
    on_time.eta = Some(now + Duration::days(4));
    on_time.hs_code = Some("8708100000".to_string());

    let mut held = shipment("s-1003", "v-pacific", "Mumbai, India", "Houston, USA", ShipmentStatus::Customs);
    held.eta = Some(now + Duration::days(1));
    held.documents.retain(|d| d != "Certificate of Origin");
    held.hs_code = Some("620342".to_string());

    let mut arrived = shipment("s-1004", "v-andes", "Santiago, Chile", "Miami, USA", ShipmentStatus::InTransit);
    arrived.eta = Some(now - Duration::hours(4));
    arrived.actual_delivery = Some(now - Duration::hours(2));

    let mut pending = shipment("s-1005", "v-lakes", "Chicago, USA", "Toronto, Canada", ShipmentStatus::Pending);
    pending.carrier = None;
    pending.eta = Some(now + Duration::days(7));

    vec![late, on_time, held, arrived, pending]
}

fn demo_invoices() -> Vec<Invoice> {
    let today = Utc::now().date_naive();
    let invoice = |id: &str, number: &str, vendor: &str, amount: f64| Invoice {
        id: id.to_string(),
        invoice_number: number.to_string(),
        vendor_id: Some(vendor.to_string()),
        po_number: Some(format!("PO-{number}")),
        grn_number: Some(format!("GRN-{number}")),
        amount,
        po_amount: Some(amount),
        quantity: Some(100),
        received_quantity: Some(100),
        currency: "USD".to_string(),
        issue_date: Some(today - Duration::days(10)),
        due_date: Some(today + Duration::days(20)),
    };

    let clean = invoice("i-2001", "2001", "v-acme", 42_000.0);

    let mut mismatched = invoice("i-2002", "2002", "v-shen", 18_400.0);
    mismatched.po_amount = Some(17_900.0);

    let mut short = invoice("i-2003", "2003", "v-pacific", 9_800.0);
    short.received_quantity = Some(92);

    let mut suspicious = invoice("i-2004", "2004", "v-lakes", 150_000.0);
    suspicious.po_number = None;

    let mut backdated = invoice("i-2005", "2005", "v-shen", 61_500.0);
    backdated.grn_number = None;
    backdated.due_date = Some(today - Duration::days(15));

    vec![clean, mismatched, short, suspicious, backdated]
}

/// Insert the demo data set unless vendors already exist.
pub async fn seed_demo_data(store: &dyn DataStore) -> StoreResult<SeedSummary> {
    let existing = store.select(Table::Vendors, &Filter::all().limit(1)).await?;
    if !existing.is_empty() {
        info!("data store already populated; skipping demo seed");
        return Ok(SeedSummary::default());
    }

    let summary = SeedSummary {
        vendors: store.insert_all(Table::Vendors, &demo_vendors()).await?,
        esg_scores: store.insert_all(Table::EsgScores, &demo_esg_scores()).await?,
        shipments: store.insert_all(Table::Shipments, &demo_shipments()).await?,
        invoices: store.insert_all(Table::Invoices, &demo_invoices()).await?,
    };
    info!(
        vendors = summary.vendors,
        esg_scores = summary.esg_scores,
        shipments = summary.shipments,
        invoices = summary.invoices,
        "demo data seeded"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opspilot_core::InMemoryDataStore;

    #[tokio::test]
    async fn seeds_once() {
        let store = InMemoryDataStore::new();

        let first = seed_demo_data(&store).await.unwrap();
        assert_eq!(first.vendors, 5);
        assert_eq!(first.shipments, 5);

        let second = seed_demo_data(&store).await.unwrap();
        assert_eq!(second, SeedSummary::default());
        assert_eq!(store.count(Table::Vendors), 5);
    }

    #[tokio::test]
    async fn seeded_rows_decode_as_records() {
        let store = InMemoryDataStore::new();
        seed_demo_data(&store).await.unwrap();

        let shipments: Vec<Shipment> = store.select_as(Table::Shipments, &Filter::all()).await.unwrap();
        assert_eq!(shipments.len(), 5);
        let invoices: Vec<Invoice> = store.select_as(Table::Invoices, &Filter::all()).await.unwrap();
        assert!(invoices.iter().any(|i| i.amount > 100_000.0 && !i.has_po_reference()));
    }
}
