//! Translation of list-endpoint query strings into `FilterData`.
//!
//! `?difficulty=easy&price[lt]=1500&sort=-price&fields=name,price&page=2&limit=10`

use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::FilterData;
use crate::database::models::column::Schema;

/// Keys that control paging, sorting and projection rather than filtering
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

/// Fields that may repeat in a query string; repeats become an IN list.
/// Any other repeated key keeps its last value.
pub const REPEATABLE_FIELDS: [&str; 6] = [
    "duration",
    "ratingsQuantity",
    "ratingsAverage",
    "maxGroupSize",
    "difficulty",
    "price",
];

/// Operators accepted in `field[op]=value` form
const QUERY_OPERATORS: [&str; 5] = ["gte", "gt", "lte", "lt", "ne"];

/// Decoded query-string pairs in their original order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryString {
    pairs: Vec<(String, String)>,
}

impl QueryString {
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .map(|raw| {
                url::form_urlencoded::parse(raw.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    /// Replace every occurrence of `key` with a single value
    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.pairs.retain(|(k, _)| k != key);
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// Last value given for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Build the list query: conditions, sort (default `default_sort`),
    /// projection and paging (`page` from 1, `limit` defaulting to `default_limit`
    /// and capped at `max_limit` before the page offset is derived).
    pub fn to_filter_data(
        &self,
        schema: &Schema,
        default_sort: Option<&str>,
        default_limit: i32,
        max_limit: Option<i32>,
    ) -> Result<FilterData, FilterError> {
        let page = match self.get("page") {
            Some(v) => parse_positive(v).ok_or_else(|| FilterError::InvalidOffset(format!("page={}", v)))?,
            None => 1,
        };
        let limit = match self.get("limit") {
            Some(v) => parse_positive(v).ok_or_else(|| FilterError::InvalidLimit(format!("limit={}", v)))?,
            None => default_limit,
        };
        let limit = match max_limit {
            Some(max) if limit > max => {
                tracing::warn!("Limit {} exceeds max {}, capping to max", limit, max);
                max
            }
            _ => limit,
        };
        let offset = (page - 1)
            .checked_mul(limit)
            .ok_or_else(|| FilterError::InvalidOffset(format!("page={}", page)))?;

        let order = self
            .get("sort")
            .filter(|s| !s.trim().is_empty())
            .or(default_sort)
            .map(|s| Value::String(s.to_string()));

        let select = self
            .get("fields")
            .map(|f| f.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect::<Vec<_>>())
            .filter(|f| !f.is_empty());

        Ok(FilterData {
            select,
            where_clause: Some(self.conditions(schema)?),
            order,
            limit: Some(limit),
            offset: Some(offset),
        })
    }

    /// Where-document for every non-reserved key, e.g. `{ "price": { "$lt": "1500" } }`
    pub fn conditions(&self, schema: &Schema) -> Result<Value, FilterError> {
        let mut fields: Map<String, Value> = Map::new();

        for (key, value) in &self.pairs {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }

            let (field, op) = split_key(key)?;
            if schema.field(field).filter(|c| !c.hidden).is_none() {
                return Err(FilterError::InvalidField(field.to_string()));
            }

            let ops = fields
                .entry(field.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(ops) = ops else { continue };

            let value = Value::String(value.clone());
            match op {
                "$eq" if REPEATABLE_FIELDS.contains(&field) => match ops.remove("$eq") {
                    Some(previous) => {
                        ops.insert("$in".to_string(), Value::Array(vec![previous, value]));
                    }
                    None => match ops.get_mut("$in") {
                        Some(Value::Array(list)) => list.push(value),
                        _ => {
                            ops.insert("$eq".to_string(), value);
                        }
                    },
                },
                "$eq" => {
                    ops.remove("$in");
                    ops.insert("$eq".to_string(), value);
                }
                op => {
                    ops.insert(op.to_string(), value);
                }
            }
        }

        Ok(Value::Object(fields))
    }
}

/// `price[gte]` → (`price`, `$gte`); `price` → (`price`, `$eq`)
fn split_key(key: &str) -> Result<(&str, &'static str), FilterError> {
    let Some((field, rest)) = key.split_once('[') else {
        return Ok((key, "$eq"));
    };
    let op = rest
        .strip_suffix(']')
        .filter(|op| !op.contains('[') && !op.contains(']'))
        .ok_or_else(|| FilterError::InvalidWhereClause(format!("Malformed query key: {}", key)))?;

    QUERY_OPERATORS
        .iter()
        .position(|known| *known == op)
        .map(|i| (field, ["$gte", "$gt", "$lte", "$lt", "$ne"][i]))
        .ok_or_else(|| FilterError::UnsupportedOperator(op.to_string()))
}

fn parse_positive(value: &str) -> Option<i32> {
    value.trim().parse::<i32>().ok().filter(|n| *n >= 1)
}
