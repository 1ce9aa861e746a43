use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::column::{Column, ColumnType, Schema};
use super::{as_number, require, writable_fields, Document, Model, User, ValidationErrors};
use crate::database::manager::DatabaseError;
use crate::database::query_builder::fetch_rows;
use crate::filter::Filter;
use crate::services::ratings;

pub static REVIEW_SCHEMA: Schema = Schema {
    table: "reviews",
    columns: &[
        Column::new("id", "id", ColumnType::Uuid).readonly(),
        Column::new("review", "review", ColumnType::Text),
        Column::new("rating", "rating", ColumnType::Integer),
        Column::new("createdAt", "created_at", ColumnType::Timestamp).readonly(),
        Column::new("tour", "tour_id", ColumnType::Uuid),
        Column::new("user", "user_id", ColumnType::Uuid),
    ],
};

pub struct Review;

#[async_trait]
impl Model for Review {
    fn schema() -> &'static Schema {
        &REVIEW_SCHEMA
    }

    fn validate(body: &Document, existing: Option<&Value>) -> Result<Document, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut doc = writable_fields(&REVIEW_SCHEMA, body, &mut errors);

        if existing.is_some() {
            // Authorship never changes
            doc.remove("user");
        }

        require(&doc, existing, "review", "Review can not be empty!", &mut errors);
        require(&doc, existing, "rating", "A review must have a rating", &mut errors);
        require(&doc, existing, "tour", "Review must belong to a tour.", &mut errors);
        require(&doc, existing, "user", "Review must belong to a user", &mut errors);

        if let Some(rating) = doc.get("rating").and_then(as_number) {
            if rating < 1.0 {
                errors.add("rating", "Rating must be above 1.0");
            } else if rating > 5.0 {
                errors.add("rating", "Rating must be below 5.0");
            }
        }

        errors.finish(doc)
    }

    async fn populate(pool: &PgPool, rows: &mut [Value], _detail: bool) -> Result<(), DatabaseError> {
        let ids: BTreeSet<String> = rows
            .iter()
            .filter_map(|row| row.get("user").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let mut filter = Filter::new(User::schema());
        if let Some(base) = User::base_filter() {
            filter.and_where(base)?;
        }
        filter.where_clause(json!({ "id": { "$in": ids } }))?;
        filter.select(vec!["name".into(), "photo".into()])?;
        let users: HashMap<String, Value> = fetch_rows(pool, &filter.to_sql()?)
            .await?
            .into_iter()
            .filter_map(|u| Some((u.get("id")?.as_str()?.to_string(), u)))
            .collect();

        for row in rows.iter_mut() {
            let author = row
                .get("user")
                .and_then(Value::as_str)
                .and_then(|id| users.get(id))
                .cloned()
                .unwrap_or(Value::Null);
            row["user"] = author;
        }
        Ok(())
    }

    /// Keep the rating summary of every affected tour in step with its reviews
    async fn after_write(
        conn: &mut PgConnection,
        before: Option<&Value>,
        after: Option<&Value>,
    ) -> Result<(), DatabaseError> {
        let tours: BTreeSet<Uuid> = [before, after]
            .into_iter()
            .flatten()
            .filter_map(tour_id)
            .collect();
        for tour in tours {
            ratings::recompute(&mut *conn, tour).await?;
        }
        Ok(())
    }
}

/// Tour a review row belongs to
pub fn tour_id(row: &Value) -> Option<Uuid> {
    row.get("tour").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}

/// Author of a review row (before population)
pub fn author_id(row: &Value) -> Option<Uuid> {
    row.get("user").and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn complete_review_is_accepted() {
        let tour = Uuid::new_v4().to_string();
        let user = Uuid::new_v4().to_string();
        let doc = Review::validate(
            &body(json!({ "review": "Amazing!", "rating": "5", "tour": tour, "user": user })),
            None,
        )
        .unwrap();
        assert_eq!(doc["rating"], json!(5));
    }

    #[test]
    fn rating_bounds() {
        let tour = Uuid::new_v4().to_string();
        let user = Uuid::new_v4().to_string();
        let low = Review::validate(&body(json!({ "review": "x", "rating": 0, "tour": tour, "user": user })), None);
        assert_eq!(low.unwrap_err().get("rating"), Some("Rating must be above 1.0"));
        let high = Review::validate(&body(json!({ "review": "x", "rating": 6, "tour": tour, "user": user })), None);
        assert_eq!(high.unwrap_err().get("rating"), Some("Rating must be below 5.0"));
    }

    #[test]
    fn missing_fields() {
        let errors = Review::validate(&Document::new(), None).unwrap_err();
        assert_eq!(errors.get("review"), Some("Review can not be empty!"));
        assert_eq!(errors.get("tour"), Some("Review must belong to a tour."));
        assert_eq!(errors.get("user"), Some("Review must belong to a user"));
    }

    #[test]
    fn updates_cannot_reassign_author() {
        let existing = json!({ "review": "Good", "rating": 4, "tour": Uuid::new_v4(), "user": Uuid::new_v4() });
        let doc = Review::validate(
            &body(json!({ "rating": 3, "user": Uuid::new_v4().to_string() })),
            Some(&existing),
        )
        .unwrap();
        assert!(!doc.contains_key("user"));
        assert_eq!(doc["rating"], json!(3));
    }

    #[test]
    fn row_references() {
        let tour = Uuid::new_v4();
        let row = json!({ "tour": tour.to_string(), "user": "not-a-uuid" });
        assert_eq!(tour_id(&row), Some(tour));
        assert_eq!(author_id(&row), None);
    }
}
