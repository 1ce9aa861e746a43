//! Signup, login and password management.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use super::factory;
use crate::auth::password::{hash_password, hash_reset_token, verify_password, ResetToken};
use crate::auth::session::{LogoutResponse, TokenResponse};
use crate::config;
use crate::database::models::{row_id, user::check_new_password, Document, User, ValidationErrors};
use crate::error::ApiError;
use crate::middleware::{ApiJson, CurrentUser};
use crate::services::Email;
use crate::state::AppState;

/// Fields accepted by signup; anything else (notably `role`) is ignored
const SIGNUP_FIELDS: [&str; 4] = ["name", "email", "password", "passwordConfirm"];

const BAD_CREDENTIALS: &str = "Incorrect email or password";

fn text<'a>(body: &'a Document, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn password_rule_error((field, message): (&str, &str)) -> ApiError {
    let mut errors = ValidationErrors::new();
    errors.add(field, message);
    errors.into()
}

/// Validate and hash a replacement password
async fn new_password_hash(body: &Document) -> Result<String, ApiError> {
    check_new_password(
        body.get("password").and_then(Value::as_str),
        body.get("passwordConfirm").and_then(Value::as_str),
    )
    .map_err(password_rule_error)?;
    let password = text(body, "password").unwrap_or_default();
    Ok(hash_password(password, config::config().security.bcrypt_cost).await?)
}

pub fn signup_body(body: &Document) -> Document {
    body.iter()
        .filter(|(key, _)| SIGNUP_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub async fn signup(State(state): State<AppState>, ApiJson(body): ApiJson<Document>) -> Result<TokenResponse, ApiError> {
    let row = factory::create::<User>(&state.pool, &signup_body(&body)).await?;
    let id = row_id(&row).ok_or_else(|| ApiError::unexpected("created user row has no id"))?;
    let user = User::find_active(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::unexpected("created user is not readable"))?;

    tracing::info!(user = %user.id, "signed up");
    TokenResponse::issue(user, StatusCode::CREATED)
}

pub async fn login(State(state): State<AppState>, ApiJson(body): ApiJson<Document>) -> Result<TokenResponse, ApiError> {
    let (Some(email), Some(password)) = (text(&body, "email"), text(&body, "password")) else {
        return Err(ApiError::bad_request("Please provide email and password!"));
    };

    let Some(user) = User::find_by_email(&state.pool, email).await? else {
        tracing::warn!("login for unknown email");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    };
    if !verify_password(password, &user.password).await? {
        tracing::warn!(user = %user.id, "login with wrong password");
        return Err(ApiError::unauthorized(BAD_CREDENTIALS));
    }

    TokenResponse::issue(user, StatusCode::OK)
}

pub async fn logout() -> LogoutResponse {
    LogoutResponse
}

/// `{scheme}://{host}` the client used to reach us
pub fn request_origin(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let server = &config::config().server;
            format!("{}:{}", server.host, server.port)
        });
    format!("{}://{}", scheme, host)
}

pub async fn forget_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<Document>,
) -> Result<Json<Value>, ApiError> {
    let email = text(&body, "email").ok_or_else(|| ApiError::bad_request("Please provide your email"))?;
    let user = User::find_by_email(&state.pool, email)
        .await?
        .ok_or_else(|| ApiError::not_found("There is no user with email address."))?;

    let ttl = config::config().security.password_reset_ttl_minutes;
    let reset = ResetToken::generate();
    let expires = Utc::now() + Duration::minutes(ttl);
    User::set_reset_token(&state.pool, user.id, Some((&reset.token_hash, expires))).await?;

    let url = format!("{}/api/v1/users/resetPassword/{}", request_origin(&headers), reset.token);
    if let Err(e) = state.mailer.send(Email::password_reset(&user.email, &url, ttl)).await {
        tracing::error!(user = %user.id, "password reset mail failed: {}", e);
        User::set_reset_token(&state.pool, user.id, None).await?;
        return Err(ApiError::internal_server_error(
            "There was an error sending the email. Try again later!",
        ));
    }

    Ok(Json(json!({ "status": "success", "message": "Token sent to email!" })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    ApiJson(body): ApiJson<Document>,
) -> Result<TokenResponse, ApiError> {
    let user = User::find_by_reset_token(&state.pool, &hash_reset_token(&token))
        .await?
        .ok_or_else(|| ApiError::bad_request("Token is invalid or has expired"))?;

    let hashed = new_password_hash(&body).await?;
    let user = User::set_password(&state.pool, user.id, &hashed).await?;

    tracing::info!(user = %user.id, "password reset");
    TokenResponse::issue(user, StatusCode::OK)
}

pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(body): ApiJson<Document>,
) -> Result<TokenResponse, ApiError> {
    let current = text(&body, "passwordCurrent").unwrap_or_default();
    if !verify_password(current, &user.password).await? {
        return Err(ApiError::unauthorized("Your current password is wrong."));
    }

    let hashed = new_password_hash(&body).await?;
    let user = User::set_password(&state.pool, user.id, &hashed).await?;

    tracing::info!(user = %user.id, "password changed");
    TokenResponse::issue(user, StatusCode::OK)
}
