//! Postgres-backed Data Store.
//!
//! Every logical [`Table`] maps to its own `opspilot_<table>` relation holding
//! the record as `jsonb`:
//!
//! | Column | Type | Notes |
//! |--------|------|-------|
//! | `seq` | `BIGSERIAL` | insertion order, tie-breaker for sorting |
//! | `id` | `TEXT UNIQUE` | copied from the record's `id` |
//! | `created_at` | `TIMESTAMPTZ` | copied from the record's `created_at` |
//! | `data` | `JSONB` | the record itself |
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|-----------------------|------------|
//! | Database (unique violation) | `23505` | `InvalidRecord` (duplicate id) |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / Io / other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{info, instrument};

use opspilot_core::{Condition, DataStore, Filter, Record, StoreError, StoreResult, Table, stamp_record};

/// Postgres-backed Data Store.
///
/// Filtering is pushed down as exact `jsonb` equality on top-level fields,
/// with a missing field comparing equal to `null`. Ordering and limits are
/// pushed down when sorting by `created_at`; other orderings are applied in
/// memory after the fetch.
#[derive(Debug, Clone)]
pub struct PostgresDataStore {
    pool: Arc<PgPool>,
}

fn table_name(table: Table) -> String {
    format!("opspilot_{}", table.as_str())
}

/// `COALESCE(data -> $field, 'null')`, so absent and explicit-null fields compare alike.
fn push_field(qb: &mut QueryBuilder<'_, Postgres>, field: &str) {
    qb.push("COALESCE(data -> ");
    qb.push_bind(field.to_string());
    qb.push(", 'null'::jsonb)");
}

fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    qb.push(" WHERE TRUE");
    for condition in &filter.conditions {
        match condition {
            Condition::Eq { field, value } => {
                qb.push(" AND ");
                push_field(qb, field);
                qb.push(" = ");
                qb.push_bind(value.clone());
                qb.push("::jsonb");
            }
            Condition::In { field, values } => {
                if values.is_empty() {
                    qb.push(" AND FALSE");
                    continue;
                }
                qb.push(" AND ");
                push_field(qb, field);
                qb.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    qb.push_bind(value.clone());
                    qb.push("::jsonb");
                }
                qb.push(")");
            }
        }
    }
}

/// Whether ordering and limit can be evaluated by Postgres.
fn pushes_down(filter: &Filter) -> bool {
    filter.order_by.as_ref().is_none_or(|o| o.field == "created_at")
}

fn select_query(table: Table, filter: &Filter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT data FROM {}", table_name(table)));
    push_conditions(&mut qb, filter);

    if pushes_down(filter) {
        match &filter.order_by {
            Some(order) if order.descending => qb.push(" ORDER BY created_at DESC, seq ASC"),
            Some(_) => qb.push(" ORDER BY created_at ASC, seq ASC"),
            None => qb.push(" ORDER BY seq ASC"),
        };
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }
    } else {
        qb.push(" ORDER BY seq ASC");
    }
    qb
}

fn record_id(record: &Record) -> String {
    match record.get("id") {
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn record_created_at(record: &Record) -> DateTime<Utc> {
    record
        .get("created_at")
        .and_then(JsonValue::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |t| t.with_timezone(&Utc))
}

impl PostgresDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and make sure every table exists.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for table in Table::ALL {
            let name = table_name(table);
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {name} (
                    seq BIGSERIAL PRIMARY KEY,
                    id TEXT NOT NULL UNIQUE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    data JSONB NOT NULL
                )
                "#
            ))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {name}_data_idx ON {name} USING GIN (data)"
            ))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        info!(tables = Table::ALL.len(), "postgres data store schema ready");
        Ok(())
    }
}

fn decode_rows(rows: Vec<sqlx::postgres::PgRow>) -> StoreResult<Vec<Record>> {
    rows.iter()
        .map(|row| {
            row.try_get::<JsonValue, _>("data")
                .map_err(|e| StoreError::Serialization(format!("failed to decode row: {e}")))
        })
        .collect()
}

#[async_trait]
impl DataStore for PostgresDataStore {
    #[instrument(skip(self, filter), fields(table = %table), err)]
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Record>> {
        let mut qb = select_query(table, filter);
        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("select", e))?;

        let records = decode_rows(rows)?;
        Ok(if pushes_down(filter) {
            records
        } else {
            filter.arrange(records)
        })
    }

    #[instrument(skip(self, records), fields(table = %table, count = records.len()), err)]
    async fn insert(&self, table: Table, records: Vec<Record>) -> StoreResult<Vec<Record>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let stamped = records
            .into_iter()
            .map(|r| stamp_record(table, r))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} (id, created_at, data) ", table_name(table)));
        qb.push_values(&stamped, |mut row, record| {
            row.push_bind(record_id(record))
                .push_bind(record_created_at(record))
                .push_bind(record.clone());
        });
        qb.push(" RETURNING data");

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => StoreError::InvalidRecord {
                    table,
                    reason: format!("duplicate id: {}", db.message()),
                },
                other => map_sqlx_error("insert", other),
            })?;
        decode_rows(rows)
    }

    #[instrument(skip(self, filter, patch), fields(table = %table), err)]
    async fn update(&self, table: Table, filter: &Filter, patch: Record) -> StoreResult<Vec<Record>> {
        if !patch.is_object() {
            return Err(StoreError::InvalidRecord {
                table,
                reason: "patch must be a JSON object".to_string(),
            });
        }

        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET data = data || ", table_name(table)));
        qb.push_bind(patch);
        qb.push("::jsonb");
        push_conditions(&mut qb, filter);
        qb.push(" RETURNING data");

        let rows = qb
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update", e))?;
        decode_rows(rows)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            StoreError::backend(format!(
                "database error in {operation} (code {code}): {}",
                db_err.message()
            ))
        }
        sqlx::Error::PoolClosed => StoreError::backend(format!("connection pool closed in {operation}")),
        sqlx::Error::PoolTimedOut => StoreError::backend(format!("connection pool timed out in {operation}")),
        other => StoreError::backend(format!("{operation} failed: {other}")),
    }
}
