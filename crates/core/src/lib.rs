//! `opspilot-core`: shared building blocks for the analysis subsystem.
//!
//! This crate contains the domain records the analysis units read and write,
//! plus the **Data Store** boundary every unit (and the audit log) goes through.
//! No analysis logic lives here.

pub mod error;
pub mod id;
pub mod in_memory_store;
pub mod records;
pub mod store;

pub use error::{DomainError, DomainResult};
pub use id::RecordId;
pub use in_memory_store::{InMemoryDataStore, stamp_record};
pub use records::{
    AuditRecord, EsgScore, Invoice, InvoiceDiscrepancy, Outcome, RiskCategory, RiskFinding, RiskSeverity,
    Shipment, ShipmentStatus, Vendor,
};
pub use store::{Condition, DataStore, DataStoreExt, Filter, OrderBy, Record, StoreError, StoreResult, Table};
