use serde_json::Value;

use super::error::FilterError;
use super::types::{FilterOrderInfo, SortDirection};
use crate::database::models::column::Schema;

pub struct FilterOrder;

impl FilterOrder {
    /// Parse an order value into `FilterOrderInfo` entries keyed by API field name.
    ///
    /// Accepts `"-price,ratingsAverage"` and `"price desc"`.
    pub fn validate_and_parse(order: &Value) -> Result<Vec<FilterOrderInfo>, FilterError> {
        match order {
            Value::Null => Ok(vec![]),
            Value::String(s) => Self::parse_order_string(s),
            other => Err(FilterError::InvalidWhereClause(format!("Invalid sort: {}", other))),
        }
    }

    fn parse_order_string(s: &str) -> Result<Vec<FilterOrderInfo>, FilterError> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut it = trimmed.split_whitespace();
            let Some(token) = it.next() else { continue };
            let (field, mut sort) = match token.strip_prefix('-') {
                Some(field) => (field, SortDirection::Desc),
                None => (token, SortDirection::Asc),
            };
            if let Some(dir) = it.next() {
                sort = Self::parse_direction(dir)?;
            }
            out.push(FilterOrderInfo {
                column: field.to_string(),
                sort,
            });
        }
        Ok(out)
    }

    fn parse_direction(dir: &str) -> Result<SortDirection, FilterError> {
        match dir.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(FilterError::InvalidWhereClause(format!(
                "Invalid sort direction: {}",
                other
            ))),
        }
    }

    /// Render `ORDER BY`, resolving API names to columns. `id` is always the last key.
    pub fn generate(schema: &Schema, infos: &[FilterOrderInfo]) -> Result<String, FilterError> {
        let mut parts = Vec::with_capacity(infos.len() + 1);
        let mut has_id = false;
        for info in infos {
            let column = schema
                .field(&info.column)
                .filter(|c| !c.hidden)
                .ok_or_else(|| FilterError::InvalidField(info.column.clone()))?;
            if !column.ty.is_comparable() {
                return Err(FilterError::NotFilterable(info.column.clone()));
            }
            has_id |= column.column == "id";
            parts.push(format!("{} {}", column.quoted(), info.sort.to_sql()));
        }
        if !has_id {
            parts.push("\"id\" ASC".to_string());
        }
        Ok(format!("ORDER BY {}", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::column::{Column, ColumnType};
    use serde_json::json;

    static SCHEMA: Schema = Schema {
        table: "tours",
        columns: &[
            Column::new("id", "id", ColumnType::Uuid),
            Column::new("price", "price", ColumnType::Float),
            Column::new("ratingsAverage", "ratings_average", ColumnType::Float),
            Column::new("images", "images", ColumnType::TextArray),
            Column::new("secret", "secret", ColumnType::Text).hidden(),
        ],
    };

    #[test]
    fn dash_prefix_sorts_descending() {
        let infos = FilterOrder::validate_and_parse(&json!("-price,ratingsAverage")).unwrap();
        assert_eq!(
            infos,
            vec![
                FilterOrderInfo { column: "price".into(), sort: SortDirection::Desc },
                FilterOrderInfo { column: "ratingsAverage".into(), sort: SortDirection::Asc },
            ]
        );
        assert_eq!(
            FilterOrder::generate(&SCHEMA, &infos).unwrap(),
            "ORDER BY \"price\" DESC, \"ratings_average\" ASC, \"id\" ASC"
        );
    }

    #[test]
    fn word_directions() {
        let infos = FilterOrder::validate_and_parse(&json!("price desc, ratingsAverage ASC")).unwrap();
        assert_eq!(infos[0].sort, SortDirection::Desc);
        assert_eq!(infos[1].sort, SortDirection::Asc);

        assert!(FilterOrder::validate_and_parse(&json!("price sideways")).is_err());
        assert!(FilterOrder::validate_and_parse(&json!(["price"])).is_err());
    }

    #[test]
    fn id_tiebreaker_is_not_duplicated() {
        let infos = FilterOrder::validate_and_parse(&json!("-id")).unwrap();
        assert_eq!(FilterOrder::generate(&SCHEMA, &infos).unwrap(), "ORDER BY \"id\" DESC");
        assert_eq!(FilterOrder::generate(&SCHEMA, &[]).unwrap(), "ORDER BY \"id\" ASC");
    }

    #[test]
    fn rejects_unknown_hidden_and_array_fields() {
        for field in ["nope", "secret", "images"] {
            let infos = FilterOrder::validate_and_parse(&json!(field)).unwrap();
            assert!(FilterOrder::generate(&SCHEMA, &infos).is_err(), "{}", field);
        }
    }
}
