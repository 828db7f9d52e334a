//! Collection-partitioned JSON document store.
//!
//! Every row is a JSON object living in a named collection. Callers can read
//! a whole collection, append, filter by field equality, or patch rows
//! matched by a key field. A collection nobody has
//! written to reads as empty. Concurrent patches to the same row are
//! last-write-wins.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{MonitError, Result};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All rows of `collection`, in insertion order.
    async fn read(&self, collection: &str) -> Result<Vec<Value>>;

    async fn append(&self, collection: &str, row: Value) -> Result<()>;

    /// Rows whose fields equal every `(field, value)` pair.
    async fn query(&self, collection: &str, filters: &[(&str, Value)]) -> Result<Vec<Value>>;

    /// Merges `patch` into every row whose `key_field` equals `key`.
    /// Returns the number of rows touched.
    async fn update(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
        patch: Map<String, Value>,
    ) -> Result<u64>;
}

#[derive(Debug, FromRow)]
struct RecordRow {
    seq: i64,
    body: String,
}

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_rows(&self, collection: &str) -> Result<Vec<RecordRow>> {
        self.fetch_matching(collection, &[]).await
    }

    /// Rows whose scalar filter fields match in SQL. Callers still re-check
    /// with `matches_filters` since SQLite compares numbers loosely.
    async fn fetch_matching(
        &self,
        collection: &str,
        filters: &[(&str, Value)],
    ) -> Result<Vec<RecordRow>> {
        let mut query_builder = select_matching("SELECT seq, body", collection, filters)?;
        let rows = query_builder
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

fn select_matching<'args>(
    select: &str,
    collection: &'args str,
    filters: &[(&str, Value)],
) -> Result<QueryBuilder<'args, Sqlite>> {
    let mut query_builder: QueryBuilder<'args, Sqlite> =
        QueryBuilder::new(format!("{select} FROM records WHERE collection = "));
    query_builder.push_bind(collection);

    for (field, expected) in filters {
        let column = field_expression(field)?;
        match expected {
            Value::String(text) => {
                query_builder
                    .push(format!(" AND {column} = "))
                    .push_bind(text.clone());
            }
            Value::Bool(flag) => {
                query_builder
                    .push(format!(" AND {column} = "))
                    .push_bind(i64::from(*flag));
            }
            Value::Number(number) => {
                if let Some(integer) = number.as_i64() {
                    query_builder
                        .push(format!(" AND {column} = "))
                        .push_bind(integer);
                } else if let Some(real) = number.as_f64() {
                    query_builder
                        .push(format!(" AND {column} = "))
                        .push_bind(real);
                }
            }
            Value::Null => {
                query_builder.push(format!(" AND {column} IS NULL"));
            }
            // arrays and objects are matched in memory
            Value::Array(_) | Value::Object(_) => {}
        }
    }

    query_builder.push(" ORDER BY seq ASC");
    Ok(query_builder)
}

/// Inlined rather than bound so the expression indexes on `patient_id` and
/// `alert_id` apply.
fn field_expression(field: &str) -> Result<String> {
    let plain = !field.is_empty()
        && field
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_');
    if !plain {
        return Err(MonitError::InvalidInput(format!(
            "unsupported record field '{field}'"
        )));
    }
    Ok(format!("json_extract(body, '$.{field}')"))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn read(&self, collection: &str) -> Result<Vec<Value>> {
        self.fetch_rows(collection)
            .await?
            .into_iter()
            .map(|row| decode_body(&row))
            .collect()
    }

    async fn append(&self, collection: &str, row: Value) -> Result<()> {
        if !row.is_object() {
            return Err(MonitError::InvalidInput(format!(
                "records appended to '{collection}' must be JSON objects"
            )));
        }

        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO records (collection, body, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(collection)
        .bind(serde_json::to_string(&row)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query(&self, collection: &str, filters: &[(&str, Value)]) -> Result<Vec<Value>> {
        let mut matched = Vec::new();
        for row in self.fetch_matching(collection, filters).await? {
            let body = decode_body(&row)?;
            if matches_filters(&body, filters) {
                matched.push(body);
            }
        }
        Ok(matched)
    }

    async fn update(
        &self,
        collection: &str,
        key_field: &str,
        key: &str,
        patch: Map<String, Value>,
    ) -> Result<u64> {
        let now = Utc::now().timestamp();
        let mut touched = 0_u64;

        let filters = [(key_field, Value::String(key.to_string()))];
        for row in self.fetch_matching(collection, &filters).await? {
            let mut body = decode_body(&row)?;
            if body.get(key_field).and_then(Value::as_str) != Some(key) {
                continue;
            }
            if let Some(object) = body.as_object_mut() {
                for (field, value) in &patch {
                    object.insert(field.clone(), value.clone());
                }
            }

            sqlx::query(
                r#"
                UPDATE records
                SET body = ?, updated_at = ?
                WHERE seq = ?
                "#,
            )
            .bind(serde_json::to_string(&body)?)
            .bind(now)
            .bind(row.seq)
            .execute(&self.pool)
            .await?;
            touched += 1;
        }

        Ok(touched)
    }
}

fn decode_body(row: &RecordRow) -> Result<Value> {
    serde_json::from_str(&row.body).map_err(MonitError::from)
}

fn matches_filters(row: &Value, filters: &[(&str, Value)]) -> bool {
    filters
        .iter()
        .all(|(field, expected)| row.get(*field) == Some(expected))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use sqlx::Row;

    use super::*;
    use crate::test_support::setup_test_pool;

    #[tokio::test]
    async fn missing_collection_reads_as_empty() {
        let store = SqliteRecordStore::new(setup_test_pool().await);

        let rows = store.read("never_written").await.expect("read should succeed");
        assert!(rows.is_empty());

        let filtered = store
            .query("never_written", &[("patient_id", json!("P001"))])
            .await
            .expect("query should succeed");
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn append_query_and_update_flow_works() {
        let store = SqliteRecordStore::new(setup_test_pool().await);

        store
            .append("alerts", json!({"alert_id": "a-1", "patient_id": "P001", "status": "active"}))
            .await
            .expect("append should succeed");
        store
            .append("alerts", json!({"alert_id": "a-2", "patient_id": "P002", "status": "active"}))
            .await
            .expect("append should succeed");

        let p1 = store
            .query("alerts", &[("patient_id", json!("P001"))])
            .await
            .expect("query should succeed");
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0]["alert_id"], "a-1");

        let mut patch = Map::new();
        patch.insert("status".to_string(), json!("resolved"));
        let touched = store
            .update("alerts", "alert_id", "a-2", patch)
            .await
            .expect("update should succeed");
        assert_eq!(touched, 1);

        let rows = store.read("alerts").await.expect("read should succeed");
        assert_eq!(rows[0]["status"], "active");
        assert_eq!(rows[1]["status"], "resolved");
        assert_eq!(rows[1]["patient_id"], "P002");
    }

    #[tokio::test]
    async fn update_of_unknown_key_touches_nothing() {
        let store = SqliteRecordStore::new(setup_test_pool().await);
        store
            .append("alerts", json!({"alert_id": "a-1"}))
            .await
            .expect("append should succeed");

        let touched = store
            .update("alerts", "alert_id", "missing", Map::new())
            .await
            .expect("update should succeed");
        assert_eq!(touched, 0);
    }

    #[tokio::test]
    async fn patient_lookup_uses_the_expression_index() {
        let pool = setup_test_pool().await;
        let filters = [("patient_id", json!("P001"))];
        let mut query_builder = select_matching("EXPLAIN QUERY PLAN SELECT seq, body", "vitals", &filters)
            .expect("filter should build");

        let plan = query_builder
            .build()
            .fetch_all(&pool)
            .await
            .expect("plan should be explained")
            .iter()
            .map(|row| row.try_get::<String, _>("detail").expect("plan row has detail"))
            .collect::<Vec<_>>()
            .join("\n");

        assert!(plan.contains("idx_records_patient_id"), "plan was: {plan}");
    }

    #[tokio::test]
    async fn scalar_filters_match_by_type() {
        let store = SqliteRecordStore::new(setup_test_pool().await);
        for row in [
            json!({"patient_id": "P001", "age": 65, "icu": true, "ward": null}),
            json!({"patient_id": "P002", "age": "65", "icu": false, "ward": "B"}),
            json!({"patient_id": "P003", "age": 65.5, "icu": true}),
        ] {
            store.append("patients", row).await.expect("append should succeed");
        }

        let by_number = store
            .query("patients", &[("age", json!(65))])
            .await
            .expect("query should succeed");
        assert_eq!(by_number.len(), 1);
        assert_eq!(by_number[0]["patient_id"], "P001");

        let by_real = store
            .query("patients", &[("age", json!(65.5))])
            .await
            .expect("query should succeed");
        assert_eq!(by_real[0]["patient_id"], "P003");

        let in_icu = store
            .query("patients", &[("icu", json!(true))])
            .await
            .expect("query should succeed");
        assert_eq!(in_icu.len(), 2);

        let null_ward = store
            .query("patients", &[("ward", Value::Null)])
            .await
            .expect("query should succeed");
        assert_eq!(null_ward.len(), 1);
        assert_eq!(null_ward[0]["patient_id"], "P001");
    }

    #[tokio::test]
    async fn filter_on_unsafe_field_name_is_rejected() {
        let store = SqliteRecordStore::new(setup_test_pool().await);
        let result = store
            .query("patients", &[("name') OR 1=1 --", json!("x"))])
            .await;
        assert!(matches!(result, Err(MonitError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn append_rejects_non_object_rows() {
        let store = SqliteRecordStore::new(setup_test_pool().await);
        let result = store.append("vitals", json!([1, 2, 3])).await;
        assert!(matches!(result, Err(MonitError::InvalidInput(_))));
    }
}
