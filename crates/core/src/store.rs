//! Data Store boundary.
//!
//! Analysis units and the audit log never talk to a database directly: they go
//! through [`DataStore`], which exposes three operations over JSON records:
//! - `select(table, filter)`
//! - `insert(table, records)`
//! - `update(table, filter, patch)`
//!
//! Implementations: [`InMemoryDataStore`](crate::InMemoryDataStore) (tests/dev)
//! and the Postgres store in `opspilot-infra`.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// A stored row: always a JSON object.
pub type Record = JsonValue;

pub type StoreResult<T> = Result<T, StoreError>;

/// Tables the analysis subsystem reads and writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Vendors,
    EsgScores,
    Shipments,
    Invoices,
    InvoiceDiscrepancies,
    RiskFindings,
    /// Append-only audit trail.
    AgentActions,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Vendors,
        Table::EsgScores,
        Table::Shipments,
        Table::Invoices,
        Table::InvoiceDiscrepancies,
        Table::RiskFindings,
        Table::AgentActions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Vendors => "vendors",
            Table::EsgScores => "esg_scores",
            Table::Shipments => "shipments",
            Table::Invoices => "invoices",
            Table::InvoiceDiscrepancies => "invoice_discrepancies",
            Table::RiskFindings => "risk_findings",
            Table::AgentActions => "agent_actions",
        }
    }
}

impl core::fmt::Display for Table {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("invalid record for {table}: {reason}")]
    InvalidRecord { table: Table, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// A single predicate on a top-level record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Eq { field: String, value: JsonValue },
    In { field: String, values: Vec<JsonValue> },
}

impl Condition {
    pub fn field(&self) -> &str {
        match self {
            Condition::Eq { field, .. } | Condition::In { field, .. } => field,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(self.field()).unwrap_or(&JsonValue::Null);
        match self {
            Condition::Eq { value, .. } => actual == value,
            Condition::In { values, .. } => values.iter().any(|v| v == actual),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Conjunctive record filter with optional ordering and limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Filter {
    /// Match every record.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.conditions.push(Condition::Eq {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn is_in<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        self.conditions.push(Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn newest_first(self) -> Self {
        self.order_by("created_at", true)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Apply ordering and limit to an already filtered set.
    ///
    /// The sort is stable, so records with equal keys keep insertion order.
    pub fn arrange(&self, mut records: Vec<Record>) -> Vec<Record> {
        if let Some(order) = &self.order_by {
            records.sort_by(|a, b| {
                let ord = compare_json(
                    a.get(&order.field).unwrap_or(&JsonValue::Null),
                    b.get(&order.field).unwrap_or(&JsonValue::Null),
                );
                if order.descending { ord.reverse() } else { ord }
            });
        }
        if let Some(limit) = self.limit {
            records.truncate(limit);
        }
        records
    }
}

/// Total order over JSON scalars used for sorting: nulls first, then booleans,
/// numbers and strings. RFC 3339 timestamps compare chronologically regardless
/// of fractional-second width. Arrays/objects compare equal.
fn compare_json(a: &JsonValue, b: &JsonValue) -> Ordering {
    fn rank(v: &JsonValue) -> u8 {
        match v {
            JsonValue::Null => 0,
            JsonValue::Bool(_) => 1,
            JsonValue::Number(_) => 2,
            JsonValue::String(_) => 3,
            JsonValue::Array(_) | JsonValue::Object(_) => 4,
        }
    }

    match (a, b) {
        (JsonValue::Bool(x), JsonValue::Bool(y)) => x.cmp(y),
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (JsonValue::String(x), JsonValue::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Persistence boundary shared by all analysis units.
///
/// One store instance is shared read/write across units; no unit takes an
/// exclusive lock, so reads are best-effort consistent.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Return records of `table` matching `filter`.
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>>;

    /// Insert records and return them as stored.
    ///
    /// Implementations assign `id` and `created_at` when the caller omits them.
    async fn insert(&self, table: Table, records: Vec<Record>) -> StoreResult<Vec<Record>>;

    /// Shallow-merge `patch` into every record matching `filter`; returns the updated rows.
    async fn update(&self, table: Table, filter: &Filter, patch: Record) -> StoreResult<Vec<Record>>;
}

#[async_trait]
impl<S> DataStore for Arc<S>
where
    S: DataStore + ?Sized,
{
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        (**self).select(table, filter).await
    }

    async fn insert(&self, table: Table, records: Vec<Record>) -> StoreResult<Vec<Record>> {
        (**self).insert(table, records).await
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Record) -> StoreResult<Vec<Record>> {
        (**self).update(table, filter, patch).await
    }
}

/// Typed convenience layer over [`DataStore`].
#[async_trait]
pub trait DataStoreExt: DataStore {
    /// Select and deserialize each row into `T`.
    async fn select_as<T>(&self, table: Table, filter: &Filter) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let rows = self.select(table, filter).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(StoreError::from))
            .collect()
    }

    /// Serialize and insert a single record.
    async fn insert_one<T>(&self, table: Table, record: &T) -> StoreResult<Record>
    where
        T: Serialize + Sync,
    {
        let row = serde_json::to_value(record)?;
        let mut inserted = self.insert(table, vec![row]).await?;
        inserted
            .pop()
            .ok_or_else(|| StoreError::backend(format!("insert into {table} returned no rows")))
    }

    /// Serialize and insert many records in one call. No-op for an empty slice.
    async fn insert_all<T>(&self, table: Table, records: &[T]) -> StoreResult<usize>
    where
        T: Serialize + Sync,
    {
        if records.is_empty() {
            return Ok(0);
        }
        let rows = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.insert(table, rows).await?.len())
    }
}

impl<S: DataStore + ?Sized> DataStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_eq_and_in() {
        let rec = json!({"status": "pending", "origin": "Shanghai"});

        assert!(Filter::all().matches(&rec));
        assert!(Filter::all().eq("status", "pending").matches(&rec));
        assert!(!Filter::all().eq("status", "delivered").matches(&rec));
        assert!(Filter::all().is_in("status", ["customs", "pending"]).matches(&rec));
        assert!(!Filter::all().is_in("missing", ["x"]).matches(&rec));
    }

    #[test]
    fn arrange_orders_and_limits() {
        let rows = vec![
            json!({"n": 2, "created_at": "2024-01-02T00:00:00+00:00"}),
            json!({"n": 1, "created_at": "2024-01-01T00:00:00+00:00"}),
            json!({"n": 3, "created_at": "2024-01-03T00:00:00+00:00"}),
        ];

        let mixed = vec![
            json!({"n": 1, "created_at": "2024-01-01T00:00:00.5Z"}),
            json!({"n": 2, "created_at": "2024-01-01T00:00:01Z"}),
        ];
        let newest_mixed = Filter::all().newest_first().arrange(mixed);
        assert_eq!(newest_mixed[0]["n"], 2);

        let newest = Filter::all().newest_first().limit(2).arrange(rows.clone());
        assert_eq!(newest.iter().map(|r| r["n"].as_i64().unwrap()).collect::<Vec<_>>(), vec![3, 2]);

        let by_n = Filter::all().order_by("n", false).arrange(rows);
        assert_eq!(by_n.iter().map(|r| r["n"].as_i64().unwrap()).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
