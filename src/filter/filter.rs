use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{FilterData, FilterOrderInfo, SqlResult};
use crate::database::models::column::{Column, Schema};

/// Builds parameterised SELECT statements against one model schema.
///
/// Rows come back as a single `row` JSON column shaped with the API field
/// names, so callers never map columns by hand.
pub struct Filter {
    schema: &'static Schema,
    select_columns: Vec<&'static Column>,
    base_conditions: Vec<Value>,
    where_data: Option<Value>,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<i32>,
    offset: Option<i32>,
}

impl Filter {
    pub fn new(schema: &'static Schema) -> Self {
        Self {
            schema,
            select_columns: schema.visible().collect(),
            base_conditions: vec![],
            where_data: None,
            order_data: vec![],
            limit: None,
            offset: None,
        }
    }

    pub fn assign(&mut self, data: FilterData) -> Result<&mut Self, FilterError> {
        if let Some(select) = data.select {
            self.select(select)?;
        }
        if let Some(where_clause) = data.where_clause {
            self.where_clause(where_clause)?;
        }
        if let Some(order) = data.order {
            self.order(order)?;
        }
        if let Some(limit) = data.limit {
            self.limit(limit, data.offset)?;
        }
        Ok(self)
    }

    /// Restrict the projection. Either all entries are inclusions
    /// (`name`, `price`) or all are exclusions (`-summary`); `id` is always kept.
    pub fn select(&mut self, fields: Vec<String>) -> Result<&mut Self, FilterError> {
        let fields: Vec<&str> = fields.iter().map(|f| f.trim()).filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            return Ok(self);
        }

        let excluded = fields.iter().filter(|f| f.starts_with('-')).count();
        if excluded != 0 && excluded != fields.len() {
            return Err(FilterError::InvalidWhereClause(
                "Cannot mix field inclusion and exclusion".to_string(),
            ));
        }

        let mut named = Vec::with_capacity(fields.len());
        for field in &fields {
            let name = field.trim_start_matches('-');
            let column = self
                .schema
                .field(name)
                .filter(|c| !c.hidden)
                .ok_or_else(|| FilterError::InvalidField(name.to_string()))?;
            named.push(column.field);
        }

        self.select_columns = self
            .schema
            .visible()
            .filter(|c| {
                let listed = named.contains(&c.field);
                c.field == "id" || if excluded > 0 { !listed } else { listed }
            })
            .collect();
        Ok(self)
    }

    /// Replace the client conditions (base conditions added with `and_where` stay)
    pub fn where_clause(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.where_data = Some(conditions);
        Ok(self)
    }

    /// Add a condition that must hold in addition to all others
    pub fn and_where(&mut self, conditions: Value) -> Result<&mut Self, FilterError> {
        FilterWhere::validate(&conditions)?;
        self.base_conditions.push(conditions);
        Ok(self)
    }

    pub fn order(&mut self, order_value: Value) -> Result<&mut Self, FilterError> {
        self.order_data = FilterOrder::validate_and_parse(&order_value)?;
        Ok(self)
    }

    pub fn limit(&mut self, limit: i32, offset: Option<i32>) -> Result<&mut Self, FilterError> {
        if limit < 0 {
            return Err(FilterError::InvalidLimit("Limit must be non-negative".to_string()));
        }
        if let Some(off) = offset {
            if off < 0 {
                return Err(FilterError::InvalidOffset("Offset must be non-negative".to_string()));
            }
        }

        let query_config = &crate::config::config().query;
        let max_limit = query_config.max_limit.unwrap_or(i32::MAX);
        let applied_limit = if limit > max_limit {
            if query_config.debug_logging {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max_limit);
            }
            max_limit
        } else {
            limit
        };

        self.limit = Some(applied_limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let order_clause = FilterOrder::generate(self.schema, &self.order_data)?;

        let query = [
            format!("SELECT {} AS row", json_row(self.select_columns.iter().copied())),
            format!("FROM {}", self.schema.quoted_table()),
            if where_result.query.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", where_result.query)
            },
            order_clause,
            self.build_limit_clause(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        if crate::config::config().query.debug_logging {
            tracing::debug!(sql = %query, params = ?where_result.params, "filter query");
        }

        Ok(SqlResult {
            query,
            params: where_result.params,
        })
    }

    /// Conditions only, joined with AND, numbered from `$1`
    pub fn to_where_sql(&self) -> Result<SqlResult, FilterError> {
        let mut params = Vec::new();
        let mut parts = Vec::new();
        for conditions in self.base_conditions.iter().chain(self.where_data.iter()) {
            let sql = FilterWhere::generate(self.schema, conditions, &mut params)?;
            if !sql.is_empty() {
                parts.push(sql);
            }
        }
        Ok(SqlResult {
            query: parts.join(" AND "),
            params,
        })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let where_result = self.to_where_sql()?;
        let table = self.schema.quoted_table();
        let query = if where_result.query.is_empty() {
            format!("SELECT COUNT(*) AS count FROM {}", table)
        } else {
            format!("SELECT COUNT(*) AS count FROM {} WHERE {}", table, where_result.query)
        };
        Ok(SqlResult {
            query,
            params: where_result.params,
        })
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!("LIMIT {}", l),
            (None, Some(o)) => format!("OFFSET {}", o),
            (None, None) => String::new(),
        }
    }
}

/// `json_build_object('field', "column", ...)` over the given columns
pub fn json_row<'a>(columns: impl Iterator<Item = &'a Column>) -> String {
    let pairs: Vec<String> = columns
        .map(|c| format!("'{}', {}", c.field, c.quoted()))
        .collect();
    format!("json_build_object({})", pairs.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::column::ColumnType;
    use serde_json::json;

    static SCHEMA: Schema = Schema {
        table: "tours",
        columns: &[
            Column::new("id", "id", ColumnType::Uuid).readonly(),
            Column::new("name", "name", ColumnType::Text),
            Column::new("price", "price", ColumnType::Float),
            Column::new("summary", "summary", ColumnType::Text),
            Column::new("secretTour", "secret_tour", ColumnType::Boolean),
            Column::new("token", "token", ColumnType::Text).hidden(),
        ],
    };

    #[test]
    fn full_select_with_base_and_client_conditions() {
        let mut filter = Filter::new(&SCHEMA);
        filter.and_where(json!({ "secretTour": { "$ne": true } })).unwrap();
        filter.where_clause(json!({ "price": { "$lt": "500" } })).unwrap();
        filter.order(json!("-price")).unwrap();
        filter.limit(10, Some(20)).unwrap();

        let sql = filter.to_sql().unwrap();
        assert_eq!(
            sql.query,
            "SELECT json_build_object('id', \"id\", 'name', \"name\", 'price', \"price\", \
             'summary', \"summary\", 'secretTour', \"secret_tour\") AS row FROM \"tours\" \
             WHERE \"secret_tour\" IS DISTINCT FROM $1::boolean AND \"price\" < $2::double precision \
             ORDER BY \"price\" DESC, \"id\" ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(sql.params, vec![json!(true), json!("500")]);
    }

    #[test]
    fn inclusion_projection_keeps_id() {
        let mut filter = Filter::new(&SCHEMA);
        filter.select(vec!["name".into(), "price".into()]).unwrap();
        let sql = filter.to_sql().unwrap();
        assert!(sql
            .query
            .starts_with("SELECT json_build_object('id', \"id\", 'name', \"name\", 'price', \"price\") AS row"));
    }

    #[test]
    fn exclusion_projection_drops_fields() {
        let mut filter = Filter::new(&SCHEMA);
        filter.select(vec!["-summary".into(), "-secretTour".into()]).unwrap();
        let sql = filter.to_sql().unwrap();
        assert!(!sql.query.contains("'summary'"));
        assert!(!sql.query.contains("'secretTour'"));
        assert!(sql.query.contains("'name'"));
    }

    #[test]
    fn projection_rejects_mixed_and_hidden_fields() {
        let mut filter = Filter::new(&SCHEMA);
        assert!(filter.select(vec!["name".into(), "-price".into()]).is_err());
        assert!(matches!(
            filter.select(vec!["token".into()]),
            Err(FilterError::InvalidField(_))
        ));
    }

    #[test]
    fn count_shares_conditions() {
        let mut filter = Filter::new(&SCHEMA);
        filter.where_clause(json!({ "name": "x" })).unwrap();
        let sql = filter.to_count_sql().unwrap();
        assert_eq!(sql.query, "SELECT COUNT(*) AS count FROM \"tours\" WHERE \"name\" = $1::text");
    }

    #[test]
    fn negative_limit_is_rejected() {
        let mut filter = Filter::new(&SCHEMA);
        assert!(matches!(filter.limit(-1, None), Err(FilterError::InvalidLimit(_))));
        assert!(matches!(filter.limit(1, Some(-1)), Err(FilterError::InvalidOffset(_))));
    }
}
