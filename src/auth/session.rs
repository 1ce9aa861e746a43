//! Session token delivery: JSON body plus an http-only `jwt` cookie.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::config;
use crate::database::models::user::User;
use crate::error::ApiError;

pub const TOKEN_COOKIE: &str = "jwt";

/// Response carrying a freshly signed session token for `user`
#[derive(Debug)]
pub struct TokenResponse {
    status: StatusCode,
    token: String,
    user: User,
}

impl TokenResponse {
    pub fn issue(user: User, status: StatusCode) -> Result<Self, ApiError> {
        let token = super::generate_jwt(user.id)?;
        Ok(Self { status, token, user })
    }
}

impl IntoResponse for TokenResponse {
    fn into_response(self) -> Response {
        let security = &config::config().security;
        let cookie = token_cookie(&self.token, security.jwt_cookie_expiry_days, security.secure_cookies);

        let body = Json(json!({
            "status": "success",
            "token": self.token,
            "data": { "user": self.user },
        }));

        let mut response = (self.status, body).into_response();
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        response
    }
}

/// Clears the session by overwriting the cookie with a value that expires in seconds
#[derive(Debug)]
pub struct LogoutResponse;

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::OK, Json(json!({ "status": "success" }))).into_response();
        response
            .headers_mut()
            .insert(header::SET_COOKIE, HeaderValue::from_static(LOGGED_OUT_COOKIE));
        response
    }
}

const LOGGED_OUT_COOKIE: &str = "jwt=loggedout; Max-Age=10; Path=/; HttpOnly; SameSite=Lax";

pub fn token_cookie(token: &str, expiry_days: u64, secure: bool) -> String {
    let max_age = expiry_days * 24 * 60 * 60;
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        TOKEN_COOKIE, token, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extract the session token from `Authorization: Bearer` or the `jwt` cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.is_empty() && *value != "loggedout")
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_http_only_with_max_age() {
        let cookie = token_cookie("abc.def.ghi", 90, false);
        assert!(cookie.starts_with("jwt=abc.def.ghi;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains(&format!("Max-Age={}", 90 * 86_400)));
        assert!(!cookie.contains("Secure"));

        assert!(token_cookie("t", 1, true).ends_with("; Secure"));
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        headers.insert(header::COOKIE, HeaderValue::from_static("jwt=cookie-token"));
        assert_eq!(extract_token(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn token_is_read_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; jwt=cookie-token"));
        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn logged_out_cookie_and_bad_scheme_yield_nothing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("jwt=loggedout"));
        assert_eq!(extract_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_token(&headers), None);
    }
}
