use axum::extract::{Path, RawQuery, State};
use serde_json::{json, Value};
use uuid::Uuid;

use super::factory;
use crate::database::models::review::author_id;
use crate::database::models::{parse_id, Document, Review, Role};
use crate::error::ApiError;
use crate::filter::QueryString;
use crate::middleware::{ApiJson, ApiResult, CurrentUser};
use crate::state::AppState;

const REVIEWERS: [Role; 1] = [Role::User];
const REVIEW_EDITORS: [Role; 2] = [Role::User, Role::Admin];

/// Admins may change any review, users only their own
pub fn check_author(user: &CurrentUser, review: &Value) -> Result<(), ApiError> {
    if user.role() == Role::Admin || author_id(review) == Some(user.id()) {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only modify your own reviews"))
    }
}

/// The author is always the current user; a nested route fixes the tour
pub fn review_body(mut body: Document, user: Uuid, tour: Option<Uuid>) -> Document {
    body.insert("user".to_string(), json!(user));
    if let Some(tour) = tour {
        body.insert("tour".to_string(), json!(tour));
    }
    body
}

pub async fn get_all_reviews(State(state): State<AppState>, RawQuery(raw): RawQuery) -> ApiResult<Value> {
    factory::get_all::<Review>(&state.pool, &QueryString::parse(raw.as_deref()), None).await
}

pub async fn get_tour_reviews(
    State(state): State<AppState>,
    Path(tour): Path<String>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Value> {
    let tour = parse_id(&tour)?;
    let scope = json!({ "tour": tour });
    factory::get_all::<Review>(&state.pool, &QueryString::parse(raw.as_deref()), Some(scope)).await
}

pub async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<Document>,
) -> ApiResult<Value> {
    user.restrict_to(&REVIEWERS)?;
    factory::create_one::<Review>(&state.pool, &review_body(body, user.id(), None)).await
}

pub async fn create_tour_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(tour): Path<String>,
    ApiJson(body): ApiJson<Document>,
) -> ApiResult<Value> {
    user.restrict_to(&REVIEWERS)?;
    let tour = parse_id(&tour)?;
    factory::create_one::<Review>(&state.pool, &review_body(body, user.id(), Some(tour))).await
}

pub async fn get_review(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    factory::get_one::<Review>(&state.pool, parse_id(&id)?).await
}

pub async fn update_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Document>,
) -> ApiResult<Value> {
    user.restrict_to(&REVIEW_EDITORS)?;
    let guard = |review: &Value| check_author(&user, review);
    factory::update_one::<Review>(&state.pool, parse_id(&id)?, &body, &guard).await
}

pub async fn delete_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    user.restrict_to(&REVIEW_EDITORS)?;
    let guard = |review: &Value| check_author(&user, review);
    factory::delete_one::<Review>(&state.pool, parse_id(&id)?, &guard).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::User;
    use chrono::Utc;

    fn current(role: Role) -> CurrentUser {
        CurrentUser(User {
            id: Uuid::new_v4(),
            name: "Laura Wilson".into(),
            email: "laura@example.com".into(),
            photo: "default.jpg".into(),
            role,
            password: String::new(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn only_author_or_admin_may_modify() {
        let author = current(Role::User);
        let other = current(Role::User);
        let admin = current(Role::Admin);
        let review = json!({ "id": Uuid::new_v4(), "user": author.id().to_string() });

        assert!(check_author(&author, &review).is_ok());
        assert_eq!(check_author(&other, &review).unwrap_err().status_code(), 403);
        assert!(check_author(&admin, &review).is_ok());
    }

    #[test]
    fn body_takes_author_and_nested_tour() {
        let user = Uuid::new_v4();
        let tour = Uuid::new_v4();
        let body = json!({ "review": "Great", "rating": 5, "user": Uuid::new_v4(), "tour": Uuid::new_v4() });

        let doc = review_body(body.as_object().cloned().unwrap(), user, Some(tour));
        assert_eq!(doc["user"], json!(user));
        assert_eq!(doc["tour"], json!(tour));

        let doc = review_body(Document::new(), user, None);
        assert!(!doc.contains_key("tour"));
    }
}
