use axum::extract::FromRequest;

use crate::error::ApiError;

/// `Json` whose rejections render as API errors
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
