//! Generic CRUD operations shared by every resource.
//!
//! Writes run validation, `prepare`, the statement and `after_write` in one
//! transaction; rows are presented and populated after commit.

use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config;
use crate::database::models::{Document, Model};
use crate::database::Repository;
use crate::error::ApiError;
use crate::filter::QueryString;
use crate::middleware::{ApiResponse, ApiResult};

const NOT_FOUND: &str = "No document found with that ID";

fn not_found() -> ApiError {
    ApiError::not_found(NOT_FOUND)
}

/// Check run against the stored row before it is modified
pub type Guard<'a> = &'a (dyn Fn(&Value) -> Result<(), ApiError> + Send + Sync);

/// Accepts every row
pub fn unguarded(_: &Value) -> Result<(), ApiError> {
    Ok(())
}

pub async fn list<M: Model>(pool: &PgPool, query: &QueryString, scope: Option<Value>) -> Result<Vec<Value>, ApiError> {
    let query_config = &config::config().query;
    let filter_data =
        query.to_filter_data(M::schema(), M::default_sort(), query_config.default_limit, query_config.max_limit)?;
    let mut rows = Repository::<M>::new(pool.clone()).select_any(filter_data, scope).await?;
    rows.iter_mut().for_each(M::present);
    M::populate(pool, &mut rows, false).await?;
    Ok(rows)
}

pub async fn find<M: Model>(pool: &PgPool, id: Uuid) -> Result<Value, ApiError> {
    let mut row = Repository::<M>::new(pool.clone()).select_404(id).await?;
    M::present(&mut row);
    M::populate(pool, std::slice::from_mut(&mut row), true).await?;
    Ok(row)
}

pub async fn create<M: Model>(pool: &PgPool, body: &Document) -> Result<Value, ApiError> {
    let mut doc = M::validate(body, None)?;

    let mut tx = pool.begin().await?;
    M::prepare(&mut tx, &mut doc, None).await?;
    let mut row = Repository::<M>::insert(&mut tx, &doc).await?;
    M::after_write(&mut tx, None, Some(&row)).await?;
    tx.commit().await?;

    tracing::info!(table = M::schema().table, id = ?row.get("id"), "created");
    M::present(&mut row);
    M::populate(pool, std::slice::from_mut(&mut row), false).await?;
    Ok(row)
}

pub async fn update<M: Model>(pool: &PgPool, id: Uuid, body: &Document, guard: Guard<'_>) -> Result<Value, ApiError> {
    let mut tx = pool.begin().await?;
    let existing = Repository::<M>::lock_id(&mut tx, id).await?.ok_or_else(not_found)?;
    guard(&existing)?;

    let mut doc = M::validate(body, Some(&existing))?;
    M::prepare(&mut tx, &mut doc, Some(&existing)).await?;
    let mut row = Repository::<M>::update_id(&mut tx, id, &doc).await?.ok_or_else(not_found)?;
    M::after_write(&mut tx, Some(&existing), Some(&row)).await?;
    tx.commit().await?;

    tracing::info!(table = M::schema().table, %id, "updated");
    M::present(&mut row);
    M::populate(pool, std::slice::from_mut(&mut row), false).await?;
    Ok(row)
}

pub async fn delete<M: Model>(pool: &PgPool, id: Uuid, guard: Guard<'_>) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;
    let existing = Repository::<M>::lock_id(&mut tx, id).await?.ok_or_else(not_found)?;
    guard(&existing)?;

    let deleted = Repository::<M>::delete_id(&mut tx, id).await?.ok_or_else(not_found)?;
    M::after_write(&mut tx, Some(&deleted), None).await?;
    tx.commit().await?;

    tracing::info!(table = M::schema().table, %id, "deleted");
    Ok(())
}

pub async fn get_all<M: Model>(pool: &PgPool, query: &QueryString, scope: Option<Value>) -> ApiResult<Value> {
    let rows = list::<M>(pool, query, scope).await?;
    let count = rows.len();
    Ok(ApiResponse::success(json!({ "data": rows })).results(count))
}

pub async fn get_one<M: Model>(pool: &PgPool, id: Uuid) -> ApiResult<Value> {
    let row = find::<M>(pool, id).await?;
    Ok(ApiResponse::success(json!({ "data": row })))
}

pub async fn create_one<M: Model>(pool: &PgPool, body: &Document) -> ApiResult<Value> {
    let row = create::<M>(pool, body).await?;
    Ok(ApiResponse::created(json!({ "data": row })))
}

pub async fn update_one<M: Model>(pool: &PgPool, id: Uuid, body: &Document, guard: Guard<'_>) -> ApiResult<Value> {
    let row = update::<M>(pool, id, body, guard).await?;
    Ok(ApiResponse::success(json!({ "data": row })))
}

pub async fn delete_one<M: Model>(pool: &PgPool, id: Uuid, guard: Guard<'_>) -> ApiResult<()> {
    delete::<M>(pool, id, guard).await?;
    Ok(ApiResponse::no_content())
}
