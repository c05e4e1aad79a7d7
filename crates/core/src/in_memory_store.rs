//! In-memory Data Store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;

use crate::id::RecordId;
use crate::store::{DataStore, Filter, Record, StoreError, StoreResult, Table};

/// In-memory Data Store.
///
/// - Rows keep insertion order per table
/// - `id` / `created_at` are assigned on insert when absent
/// - No IO; locks are never held across an `.await`
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    tables: RwLock<HashMap<Table, Vec<Record>>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row in `table` (insertion order). Test helper.
    pub fn rows(&self, table: Table) -> Vec<Record> {
        self.tables
            .read()
            .map(|t| t.get(&table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn count(&self, table: Table) -> usize {
        self.tables
            .read()
            .map(|t| t.get(&table).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

fn poisoned() -> StoreError {
    StoreError::backend("in-memory store lock poisoned")
}

/// Fill in `id` and `created_at` the way a database default would.
pub fn stamp_record(table: Table, record: Record) -> StoreResult<Record> {
    let JsonValue::Object(mut map) = record else {
        return Err(StoreError::InvalidRecord {
            table,
            reason: "record must be a JSON object".to_string(),
        });
    };

    if map.get("id").is_none_or(JsonValue::is_null) {
        map.insert("id".to_string(), JsonValue::String(RecordId::new().to_string()));
    }
    if map.get("created_at").is_none_or(JsonValue::is_null) {
        map.insert("created_at".to_string(), JsonValue::String(Utc::now().to_rfc3339()));
    }

    Ok(JsonValue::Object(map))
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let matching = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        Ok(filter.arrange(matching))
    }

    async fn insert(&self, table: Table, records: Vec<Record>) -> StoreResult<Vec<Record>> {
        let stamped = records
            .into_iter()
            .map(|r| stamp_record(table, r))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.entry(table).or_default().extend(stamped.iter().cloned());
        Ok(stamped)
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Record) -> StoreResult<Vec<Record>> {
        let JsonValue::Object(patch) = patch else {
            return Err(StoreError::InvalidRecord {
                table,
                reason: "patch must be a JSON object".to_string(),
            });
        };

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let mut updated = Vec::new();
        for row in tables.entry(table).or_default().iter_mut() {
            if !filter.matches(row) {
                continue;
            }
            if let JsonValue::Object(fields) = row {
                for (k, v) in &patch {
                    fields.insert(k.clone(), v.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }
}
