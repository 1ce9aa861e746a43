//! Shared application state handed to every handler.

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::ApiConfig;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::SharedMailer;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub mailer: SharedMailer,
    /// `None` when rate limiting is disabled
    pub limiter: Option<Arc<RateLimiter>>,
}

impl AppState {
    pub fn new(pool: PgPool, mailer: SharedMailer, api: &ApiConfig) -> Self {
        let limiter = api
            .enable_rate_limiting
            .then(|| RateLimiter::new(api.rate_limit_requests, api.rate_limit_window_secs))
            .flatten()
            .map(Arc::new);

        Self { pool, mailer, limiter }
    }
}
