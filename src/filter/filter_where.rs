use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::FilterOp;
use crate::database::models::column::{Column, ColumnType, Schema};

/// Translates a where-document into a parameterised SQL predicate.
///
/// Field names are the schema's API names; every value is bound as a
/// parameter and cast to the column type in SQL.
pub struct FilterWhere<'p> {
    schema: &'static Schema,
    params: &'p mut Vec<Value>,
}

impl<'p> FilterWhere<'p> {
    pub fn new(schema: &'static Schema, params: &'p mut Vec<Value>) -> Self {
        Self { schema, params }
    }

    /// Returns the predicate (empty when there are no conditions) and appends
    /// bound values to `params`, numbering placeholders after existing ones.
    pub fn generate(
        schema: &'static Schema,
        where_data: &Value,
        params: &'p mut Vec<Value>,
    ) -> Result<String, FilterError> {
        Self::validate(where_data)?;
        let mut filter_where = Self::new(schema, params);
        let parts = match where_data {
            Value::Object(obj) => filter_where.parse_object(obj)?,
            _ => vec![],
        };
        Ok(parts.join(" AND "))
    }

    pub fn validate(where_data: &Value) -> Result<(), FilterError> {
        match where_data {
            Value::Null | Value::Object(_) => Ok(()),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    fn parse_object(&mut self, obj: &Map<String, Value>) -> Result<Vec<String>, FilterError> {
        let mut parts = Vec::new();
        for (key, value) in obj {
            if key.starts_with('$') {
                return Err(FilterError::UnsupportedOperator(key.clone()));
            }
            parts.extend(self.parse_field_condition(key, value)?);
        }
        Ok(parts)
    }

    fn parse_field_condition(&mut self, field: &str, value: &Value) -> Result<Vec<String>, FilterError> {
        let column = self
            .schema
            .field(field)
            .ok_or_else(|| FilterError::InvalidField(field.to_string()))?;

        if column.ty == ColumnType::Json {
            return Err(FilterError::NotFilterable(field.to_string()));
        }

        match value {
            Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => {
                let mut parts = Vec::new();
                for (op_key, op_val) in obj {
                    let operator = FilterOp::parse(op_key)
                        .ok_or_else(|| FilterError::UnsupportedOperator(op_key.clone()))?;
                    parts.push(self.build_condition(column, operator, op_val)?);
                }
                Ok(parts)
            }
            // Implicit equality: { field: value }
            _ => Ok(vec![self.build_condition(column, FilterOp::Eq, value)?]),
        }
    }

    fn build_condition(&mut self, column: &Column, op: FilterOp, data: &Value) -> Result<String, FilterError> {
        let quoted = column.quoted();
        let element = column.ty.element();

        match op {
            FilterOp::Eq => match (data, element) {
                (Value::Null, _) => Ok(format!("{} IS NULL", quoted)),
                (_, Some(elem)) => Ok(format!("{} = ANY({})", self.param(elem, data)?, quoted)),
                (_, None) => Ok(format!("{} = {}", quoted, self.param(column.ty, data)?)),
            },
            FilterOp::Ne => match (data, element) {
                (Value::Null, _) => Ok(format!("{} IS NOT NULL", quoted)),
                (_, Some(elem)) => Ok(format!("NOT ({} = ANY({}))", self.param(elem, data)?, quoted)),
                (_, None) => Ok(format!("{} IS DISTINCT FROM {}", quoted, self.param(column.ty, data)?)),
            },
            FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
                self.require_comparable(column)?;
                let sql_op = match op {
                    FilterOp::Gt => ">",
                    FilterOp::Gte => ">=",
                    FilterOp::Lt => "<",
                    _ => "<=",
                };
                Ok(format!("{} {} {}", quoted, sql_op, self.param(column.ty, data)?))
            }
            FilterOp::In => {
                self.require_comparable(column)?;
                let values = match data {
                    Value::Array(values) => values.clone(),
                    other => vec![other.clone()],
                };
                if values.is_empty() {
                    return Ok("1=0".to_string());
                }
                let params = values
                    .iter()
                    .map(|v| self.param(column.ty, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{} IN ({})", quoted, params.join(", ")))
            }
        }
    }

    fn require_comparable(&self, column: &Column) -> Result<(), FilterError> {
        if column.ty.is_comparable() {
            Ok(())
        } else {
            Err(FilterError::NotFilterable(column.field.to_string()))
        }
    }

    fn param(&mut self, ty: ColumnType, value: &Value) -> Result<String, FilterError> {
        if value.is_array() || value.is_object() {
            return Err(FilterError::InvalidOperatorData(format!(
                "expected a single value, got {}",
                value
            )));
        }
        self.params.push(value.clone());
        Ok(ty.cast_param(&format!("${}", self.params.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::column::Column;
    use serde_json::json;

    static SCHEMA: Schema = Schema {
        table: "tours",
        columns: &[
            Column::new("id", "id", ColumnType::Uuid),
            Column::new("name", "name", ColumnType::Text),
            Column::new("price", "price", ColumnType::Float),
            Column::new("duration", "duration", ColumnType::Integer),
            Column::new("guides", "guides", ColumnType::UuidArray),
            Column::new("startLocation", "start_location", ColumnType::Json),
            Column::new("ratingsAverage", "ratings_average", ColumnType::Float),
        ],
    };

    #[test]
    fn implicit_equality_and_operators() {
        let mut params = vec![];
        let sql = FilterWhere::generate(
            &SCHEMA,
            &json!({ "name": "The Forest Hiker", "price": { "$gte": "100", "$lt": 500 } }),
            &mut params,
        )
        .unwrap();

        assert_eq!(
            sql,
            "\"name\" = $1::text AND \"price\" >= $2::double precision AND \"price\" < $3::double precision"
        );
        assert_eq!(params, vec![json!("The Forest Hiker"), json!("100"), json!(500)]);
    }

    #[test]
    fn api_names_map_to_columns() {
        let mut params = vec![];
        let sql = FilterWhere::generate(&SCHEMA, &json!({ "ratingsAverage": { "$gte": 4.5 } }), &mut params).unwrap();
        assert_eq!(sql, "\"ratings_average\" >= $1::double precision");
    }

    #[test]
    fn placeholders_continue_after_existing_params() {
        let mut params = vec![json!("already-bound")];
        let sql = FilterWhere::generate(&SCHEMA, &json!({ "duration": 5 }), &mut params).unwrap();
        assert_eq!(sql, "\"duration\" = $2::integer");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn in_list_and_empty_in() {
        let mut params = vec![];
        let sql = FilterWhere::generate(&SCHEMA, &json!({ "duration": { "$in": ["5", "7"] } }), &mut params).unwrap();
        assert_eq!(sql, "\"duration\" IN ($1::integer, $2::integer)");

        let mut params = vec![];
        let sql = FilterWhere::generate(&SCHEMA, &json!({ "duration": { "$in": [] } }), &mut params).unwrap();
        assert_eq!(sql, "1=0");
        assert!(params.is_empty());
    }

    #[test]
    fn not_equal_keeps_nulls() {
        let mut params = vec![];
        let sql = FilterWhere::generate(&SCHEMA, &json!({ "price": { "$ne": 100 } }), &mut params).unwrap();
        assert_eq!(sql, "\"price\" IS DISTINCT FROM $1::double precision");
    }

    #[test]
    fn array_columns_use_membership() {
        let mut params = vec![];
        let id = "5c8a21d02f8fb814b56fa189";
        let sql = FilterWhere::generate(&SCHEMA, &json!({ "guides": id }), &mut params).unwrap();
        assert_eq!(sql, "$1::uuid = ANY(\"guides\")");
    }

    #[test]
    fn null_equality() {
        let mut params = vec![];
        let sql = FilterWhere::generate(&SCHEMA, &json!({ "name": null }), &mut params).unwrap();
        assert_eq!(sql, "\"name\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn rejects_unknown_fields_json_columns_and_operators() {
        let mut params = vec![];
        assert!(matches!(
            FilterWhere::generate(&SCHEMA, &json!({ "nope": 1 }), &mut params),
            Err(FilterError::InvalidField(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&SCHEMA, &json!({ "startLocation": 1 }), &mut params),
            Err(FilterError::NotFilterable(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&SCHEMA, &json!({ "price": { "$where": "1" } }), &mut params),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&SCHEMA, &json!({ "$or": [{ "price": 1 }] }), &mut params),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&SCHEMA, &json!({ "name": { "$like": "The%" } }), &mut params),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(matches!(
            FilterWhere::generate(&SCHEMA, &json!({ "guides": { "$gt": 1 } }), &mut params),
            Err(FilterError::NotFilterable(_))
        ));
        assert!(FilterWhere::generate(&SCHEMA, &json!([1, 2]), &mut params).is_err());
    }
}
