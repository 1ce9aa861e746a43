use axum::extract::{Path, RawQuery, State};
use serde_json::{json, Value};

use super::factory;
use crate::database::models::{parse_id, Document, Role, User};
use crate::error::ApiError;
use crate::filter::QueryString;
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser};
use crate::state::AppState;

/// Fields a user may change on their own account
const SELF_EDITABLE: [&str; 2] = ["name", "email"];

/// Reject password fields and keep only self-editable ones
pub fn self_update(body: &Document) -> Result<Document, ApiError> {
    if body.contains_key("password") || body.contains_key("passwordConfirm") {
        return Err(ApiError::bad_request(
            "This route is not for password updates. Please use /updatePassword.",
        ));
    }
    Ok(body
        .iter()
        .filter(|(key, _)| SELF_EDITABLE.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect())
}

pub async fn get_me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Value> {
    factory::get_one::<User>(&state.pool, user.id()).await
}

pub async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(body): ApiJson<Document>,
) -> ApiResult<Value> {
    let doc = self_update(&body)?;
    let updated = factory::update::<User>(&state.pool, user.id(), &doc, &factory::unguarded).await?;
    Ok(ApiResponse::success(json!({ "user": updated })))
}

pub async fn delete_me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<()> {
    User::deactivate(&state.pool, user.id()).await?;
    tracing::info!(user = %user.id(), "account deactivated");
    Ok(ApiResponse::no_content())
}

/// Accounts are only created through signup
pub async fn create_user() -> ApiError {
    ApiError::internal_server_error("This route is not defined! Please use /signup instead")
}

pub async fn get_all_users(
    State(state): State<AppState>,
    user: CurrentUser,
    RawQuery(raw): RawQuery,
) -> ApiResult<Value> {
    user.restrict_to(&[Role::Admin])?;
    factory::get_all::<User>(&state.pool, &QueryString::parse(raw.as_deref()), None).await
}

pub async fn get_user(State(state): State<AppState>, user: CurrentUser, Path(id): Path<String>) -> ApiResult<Value> {
    user.restrict_to(&[Role::Admin])?;
    factory::get_one::<User>(&state.pool, parse_id(&id)?).await
}

pub async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Document>,
) -> ApiResult<Value> {
    user.restrict_to(&[Role::Admin])?;
    factory::update_one::<User>(&state.pool, parse_id(&id)?, &body, &factory::unguarded).await
}

pub async fn delete_user(State(state): State<AppState>, user: CurrentUser, Path(id): Path<String>) -> ApiResult<()> {
    user.restrict_to(&[Role::Admin])?;
    factory::delete_one::<User>(&state.pool, parse_id(&id)?, &factory::unguarded).await
}
