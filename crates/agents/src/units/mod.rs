//! Built-in analysis units.

pub mod customs_compliance;
pub mod esg_risk;
pub mod invoice_validator;
pub mod procurement;
pub mod shipment_tracker;
pub mod vendor_monitor;

pub use customs_compliance::CustomsCompliance;
pub use esg_risk::EsgRiskMonitor;
pub use invoice_validator::InvoiceValidator;
pub use procurement::ProcurementAnalyzer;
pub use shipment_tracker::ShipmentTracker;
pub use vendor_monitor::VendorMonitor;
