//! Execution helpers for generated SQL.
//!
//! Every parameter is bound as text (or NULL); the SQL casts it to the column
//! type, so one binding path serves query strings, JSON bodies and internal writes.

use serde_json::Value;
use sqlx::{postgres::PgArguments, PgExecutor, Postgres};

use crate::filter::types::SqlResult;

type JsonQuery<'q> = sqlx::query::QueryScalar<'q, Postgres, Value, PgArguments>;

/// Text form of a bound value: strings as-is, arrays/objects as JSON text
pub fn param_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn json_query(sql: &SqlResult) -> JsonQuery<'_> {
    sql.params
        .iter()
        .fold(sqlx::query_scalar::<_, Value>(&sql.query), |q, p| q.bind(param_text(p)))
}

/// Run a statement whose single column is a JSON row, returning all rows
pub async fn fetch_rows<'e, E>(executor: E, sql: &SqlResult) -> Result<Vec<Value>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    json_query(sql).fetch_all(executor).await
}

pub async fn fetch_optional_row<'e, E>(executor: E, sql: &SqlResult) -> Result<Option<Value>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    json_query(sql).fetch_optional(executor).await
}

/// Run a `SELECT COUNT(*)` style statement
pub async fn fetch_count<'e, E>(executor: E, sql: &SqlResult) -> Result<i64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sql.params
        .iter()
        .fold(sqlx::query_scalar::<_, i64>(&sql.query), |q, p| q.bind(param_text(p)))
        .fetch_one(executor)
        .await
}
