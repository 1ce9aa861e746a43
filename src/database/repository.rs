use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Document, Model};
use crate::database::query_builder::{fetch_optional_row, fetch_rows};
use crate::filter::filter::json_row;
use crate::filter::filter_where::FilterWhere;
use crate::filter::types::SqlResult;
use crate::filter::{Filter, FilterData};

/// SQL access for one model. Rows are JSON objects keyed by API field names.
pub struct Repository<M> {
    pool: PgPool,
    _phantom: std::marker::PhantomData<M>,
}

impl<M: Model> Repository<M> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _phantom: std::marker::PhantomData,
        }
    }

    /// A filter over this model with its base condition applied
    pub fn filter(&self) -> Result<Filter, DatabaseError> {
        let mut filter = Filter::new(M::schema());
        if let Some(base) = M::base_filter() {
            filter.and_where(base)?;
        }
        Ok(filter)
    }

    pub async fn select_any(&self, filter_data: FilterData, scope: Option<Value>) -> Result<Vec<Value>, DatabaseError> {
        let mut filter = self.filter()?;
        if let Some(scope) = scope {
            filter.and_where(scope)?;
        }
        filter.assign(filter_data)?;
        let sql = filter.to_sql()?;
        Ok(fetch_rows(&self.pool, &sql).await?)
    }

    pub async fn select_id(&self, id: Uuid) -> Result<Option<Value>, DatabaseError> {
        let mut filter = self.filter()?;
        filter.and_where(json!({ "id": id.to_string() }))?;
        let sql = filter.to_sql()?;
        Ok(fetch_optional_row(&self.pool, &sql).await?)
    }

    pub async fn select_404(&self, id: Uuid) -> Result<Value, DatabaseError> {
        self.select_id(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("No document found with that ID".to_string()))
    }

    /// Read and row-lock a record inside a transaction
    pub async fn lock_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Value>, DatabaseError> {
        let mut filter = Filter::new(M::schema());
        if let Some(base) = M::base_filter() {
            filter.and_where(base)?;
        }
        filter.and_where(json!({ "id": id.to_string() }))?;
        let mut sql = filter.to_where_sql()?;
        sql.query = format!(
            "SELECT {} AS row FROM {} WHERE {} FOR UPDATE",
            json_row(M::schema().visible()),
            M::schema().quoted_table(),
            sql.query
        );
        Ok(fetch_optional_row(&mut *conn, &sql).await?)
    }

    pub async fn insert(conn: &mut PgConnection, doc: &Document) -> Result<Value, DatabaseError> {
        let sql = Self::insert_sql(doc)?;
        fetch_optional_row(&mut *conn, &sql)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Insert returned no row".to_string()))
    }

    pub async fn update_id(conn: &mut PgConnection, id: Uuid, doc: &Document) -> Result<Option<Value>, DatabaseError> {
        if doc.is_empty() {
            return Self::lock_id(conn, id).await;
        }
        let sql = Self::update_sql(id, doc)?;
        Ok(fetch_optional_row(&mut *conn, &sql).await?)
    }

    pub async fn delete_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Value>, DatabaseError> {
        let sql = Self::delete_sql(id)?;
        Ok(fetch_optional_row(&mut *conn, &sql).await?)
    }

    fn returning() -> String {
        format!("RETURNING {} AS row", json_row(M::schema().visible()))
    }

    /// `"column" = $n::type` assignments (or column/value lists) for a document
    fn assignments(doc: &Document, params: &mut Vec<Value>) -> Result<Vec<(String, String)>, DatabaseError> {
        let schema = M::schema();
        doc.iter()
            .map(|(field, value)| -> Result<(String, String), DatabaseError> {
                let column = schema
                    .field(field)
                    .ok_or_else(|| crate::filter::error::FilterError::InvalidField(field.clone()))?;
                params.push(value.clone());
                Ok((column.quoted(), column.ty.cast_param(&format!("${}", params.len()))))
            })
            .collect()
    }

    fn insert_sql(doc: &Document) -> Result<SqlResult, DatabaseError> {
        let table = M::schema().quoted_table();
        let mut params = Vec::new();
        let pairs = Self::assignments(doc, &mut params)?;

        let query = if pairs.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES {}", table, Self::returning())
        } else {
            let (columns, values): (Vec<String>, Vec<String>) = pairs.into_iter().unzip();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) {}",
                table,
                columns.join(", "),
                values.join(", "),
                Self::returning()
            )
        };
        Ok(SqlResult { query, params })
    }

    fn update_sql(id: Uuid, doc: &Document) -> Result<SqlResult, DatabaseError> {
        let mut params = Vec::new();
        let sets: Vec<String> = Self::assignments(doc, &mut params)?
            .into_iter()
            .map(|(column, value)| format!("{} = {}", column, value))
            .collect();
        let condition = Self::id_condition(id, &mut params)?;

        Ok(SqlResult {
            query: format!(
                "UPDATE {} SET {} WHERE {} {}",
                M::schema().quoted_table(),
                sets.join(", "),
                condition,
                Self::returning()
            ),
            params,
        })
    }

    fn delete_sql(id: Uuid) -> Result<SqlResult, DatabaseError> {
        let mut params = Vec::new();
        let condition = Self::id_condition(id, &mut params)?;
        Ok(SqlResult {
            query: format!(
                "DELETE FROM {} WHERE {} {}",
                M::schema().quoted_table(),
                condition,
                Self::returning()
            ),
            params,
        })
    }

    /// `id = $n` plus the base condition, so writes never touch hidden records
    fn id_condition(id: Uuid, params: &mut Vec<Value>) -> Result<String, DatabaseError> {
        let schema = M::schema();
        let mut parts = vec![FilterWhere::generate(schema, &json!({ "id": id.to_string() }), params)?];
        if let Some(base) = M::base_filter() {
            parts.push(FilterWhere::generate(schema, &base, params)?);
        }
        parts.retain(|p| !p.is_empty());
        Ok(parts.join(" AND "))
    }
}
