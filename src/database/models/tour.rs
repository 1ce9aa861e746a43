use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

use super::column::{Column, ColumnType, Schema};
use super::{as_number, merged, require, writable_fields, Document, Model, Review, User, ValidationErrors};
use crate::database::manager::DatabaseError;
use crate::database::query_builder::{fetch_count, fetch_rows};
use crate::error::ApiError;
use crate::filter::Filter;

pub const DIFFICULTIES: [&str; 3] = ["easy", "medium", "difficult"];

pub static TOUR_SCHEMA: Schema = Schema {
    table: "tours",
    columns: &[
        Column::new("id", "id", ColumnType::Uuid).readonly(),
        Column::new("name", "name", ColumnType::Text),
        Column::new("slug", "slug", ColumnType::Text).readonly(),
        Column::new("duration", "duration", ColumnType::Integer),
        Column::new("maxGroupSize", "max_group_size", ColumnType::Integer),
        Column::new("difficulty", "difficulty", ColumnType::Text),
        Column::new("ratingsAverage", "ratings_average", ColumnType::Float).readonly(),
        Column::new("ratingsQuantity", "ratings_quantity", ColumnType::Integer).readonly(),
        Column::new("price", "price", ColumnType::Float),
        Column::new("priceDiscount", "price_discount", ColumnType::Float),
        Column::new("summary", "summary", ColumnType::Text),
        Column::new("description", "description", ColumnType::Text),
        Column::new("imageCover", "image_cover", ColumnType::Text),
        Column::new("images", "images", ColumnType::TextArray),
        Column::new("createdAt", "created_at", ColumnType::Timestamp).readonly(),
        Column::new("startDates", "start_dates", ColumnType::TimestampArray),
        Column::new("secretTour", "secret_tour", ColumnType::Boolean),
        Column::new("startLocation", "start_location", ColumnType::Json),
        Column::new("locations", "locations", ColumnType::Json),
        Column::new("guides", "guides", ColumnType::UuidArray),
    ],
};

pub struct Tour;

#[async_trait]
impl Model for Tour {
    fn schema() -> &'static Schema {
        &TOUR_SCHEMA
    }

    fn base_filter() -> Option<Value> {
        Some(json!({ "secretTour": { "$ne": true } }))
    }

    fn validate(body: &Document, existing: Option<&Value>) -> Result<Document, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let doc = writable_fields(&TOUR_SCHEMA, body, &mut errors);

        require(&doc, existing, "name", "A tour must have a name", &mut errors);
        require(&doc, existing, "duration", "A tour must have a duration", &mut errors);
        require(&doc, existing, "maxGroupSize", "A tour must have a group size", &mut errors);
        require(&doc, existing, "difficulty", "A tour must have a difficulty", &mut errors);
        require(&doc, existing, "price", "A tour must have a price", &mut errors);
        require(&doc, existing, "summary", "A tour must have a description", &mut errors);
        require(&doc, existing, "imageCover", "A tour must have a cover image", &mut errors);

        if let Some(name) = doc.get("name").and_then(Value::as_str) {
            let len = name.chars().count();
            if len > 40 {
                errors.add("name", "A tour name must have less or equal then 40 characters");
            } else if len < 10 {
                errors.add("name", "A tour name must have more or equal then 10 characters");
            }
        }

        for (field, message) in [
            ("duration", "Duration must be above 0"),
            ("maxGroupSize", "Group size must be above 0"),
        ] {
            if doc.get(field).and_then(as_number).is_some_and(|n| n <= 0.0) {
                errors.add(field, message);
            }
        }

        if let Some(difficulty) = doc.get("difficulty").and_then(Value::as_str) {
            if !DIFFICULTIES.contains(&difficulty) {
                errors.add("difficulty", "Difficulty is either: easy, medium, difficult");
            }
        }

        if doc.get("price").and_then(as_number).is_some_and(|n| n < 0.0) {
            errors.add("price", "Price must not be negative");
        }

        if let Some(discount) = doc.get("priceDiscount").and_then(as_number) {
            let price = merged(&doc, existing, "price").and_then(as_number);
            if price.map_or(true, |price| discount >= price) {
                errors.add(
                    "priceDiscount",
                    format!("Discount price ({}) should be below regular price", discount),
                );
            }
        }

        if let Some(start) = doc.get("startLocation").filter(|v| !v.is_null()) {
            if let Err(message) = check_point(start) {
                errors.add("startLocation", message);
            }
        }

        if let Some(locations) = doc.get("locations").filter(|v| !v.is_null()) {
            match locations.as_array() {
                Some(points) => {
                    if let Some(message) = points.iter().find_map(|p| check_point(p).err()) {
                        errors.add("locations", message);
                    }
                }
                None => errors.add("locations", "Locations must be an array of GeoJSON points"),
            }
        }

        errors.finish(doc)
    }

    async fn prepare(
        conn: &mut PgConnection,
        doc: &mut Document,
        _existing: Option<&Value>,
    ) -> Result<(), ApiError> {
        if let Some(name) = doc.get("name").and_then(Value::as_str) {
            let slug = slugify(name);
            doc.insert("slug".to_string(), Value::String(slug));
        }

        if let Some(Value::Array(guides)) = doc.get("guides") {
            if !guides.is_empty() {
                let mut filter = Filter::new(User::schema());
                if let Some(base) = User::base_filter() {
                    filter.and_where(base)?;
                }
                filter.where_clause(json!({ "id": { "$in": guides } }))?;
                let found = fetch_count(&mut *conn, &filter.to_count_sql()?).await?;
                if found != guides.len() as i64 {
                    return Err(ApiError::bad_request("Every guide must be an existing user"));
                }
            }
        }
        Ok(())
    }

    fn present(row: &mut Value) {
        if let Some(duration) = row.get("duration").and_then(Value::as_f64) {
            row["durationWeeks"] = json!(duration / 7.0);
        }
    }

    async fn populate(pool: &PgPool, rows: &mut [Value], detail: bool) -> Result<(), DatabaseError> {
        populate_guides(pool, rows).await?;

        if detail {
            for row in rows.iter_mut() {
                let Some(id) = row.get("id").and_then(Value::as_str).map(str::to_string) else {
                    continue;
                };
                let mut filter = Filter::new(Review::schema());
                filter.and_where(json!({ "tour": id }))?;
                filter.order(json!("createdAt"))?;
                let mut reviews = fetch_rows(pool, &filter.to_sql()?).await?;
                Review::populate(pool, &mut reviews, false).await?;
                row["reviews"] = Value::Array(reviews);
            }
        }
        Ok(())
    }
}

/// Replace guide ids with `{id, name, email, photo, role}` of active users
async fn populate_guides(pool: &PgPool, rows: &mut [Value]) -> Result<(), DatabaseError> {
    let mut ids: Vec<Value> = rows
        .iter()
        .filter_map(|row| row.get("guides").and_then(Value::as_array))
        .flatten()
        .cloned()
        .collect();
    ids.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    ids.dedup();
    if ids.is_empty() {
        return Ok(());
    }

    let mut filter = Filter::new(User::schema());
    if let Some(base) = User::base_filter() {
        filter.and_where(base)?;
    }
    filter.where_clause(json!({ "id": { "$in": ids } }))?;
    filter.select(vec!["name".into(), "email".into(), "photo".into(), "role".into()])?;
    let guides: HashMap<String, Value> = fetch_rows(pool, &filter.to_sql()?)
        .await?
        .into_iter()
        .filter_map(|g| Some((g.get("id")?.as_str()?.to_string(), g)))
        .collect();

    for row in rows.iter_mut() {
        if let Some(Value::Array(refs)) = row.get_mut("guides") {
            let resolved: Vec<Value> = refs
                .iter()
                .filter_map(|r| r.as_str().and_then(|id| guides.get(id)).cloned())
                .collect();
            *refs = resolved;
        }
    }
    Ok(())
}

/// GeoJSON point with `coordinates: [lng, lat]`
fn check_point(value: &Value) -> Result<(), String> {
    let invalid = || "Location must be a GeoJSON Point with coordinates [lng, lat]".to_string();
    let point = value.as_object().ok_or_else(invalid)?;
    if point.get("type").and_then(Value::as_str).unwrap_or("Point") != "Point" {
        return Err(invalid());
    }
    let coords = point.get("coordinates").and_then(Value::as_array).ok_or_else(invalid)?;
    match coords.as_slice() {
        [lng, lat] => match (lng.as_f64(), lat.as_f64()) {
            (Some(lng), Some(lat)) if (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat) => Ok(()),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Lowercase, ASCII alphanumerics separated by single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
