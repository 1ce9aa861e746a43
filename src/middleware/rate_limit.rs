//! Per-client request limiting for the `/api` routes.
//!
//! Each address gets a fixed window that opens with its first request and
//! allows `requests` calls until it closes.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use moka::future::Cache;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::state::AppState;

const TOO_MANY_REQUESTS: &str = "Too many requests from this IP, please try again in an hour!";

/// Upper bound on tracked addresses; the least recently used are dropped first
const MAX_TRACKED_CLIENTS: u64 = 100_000;

/// Fixed-window request counter keyed by client address
pub struct RateLimiter {
    windows: Cache<IpAddr, Arc<AtomicU32>>,
    requests: u32,
}

impl RateLimiter {
    /// Allow `requests` per `window_secs` for each address.
    /// `None` if either value is zero.
    pub fn new(requests: u32, window_secs: u64) -> Option<Self> {
        if requests == 0 || window_secs == 0 {
            return None;
        }
        let windows = Cache::builder()
            .max_capacity(MAX_TRACKED_CLIENTS)
            .time_to_live(Duration::from_secs(window_secs))
            .build();
        Some(Self { windows, requests })
    }

    /// Count one request from `ip`; `false` once its window is used up
    pub async fn check(&self, ip: IpAddr) -> bool {
        let hits = self
            .windows
            .get_with(ip, async { Arc::new(AtomicU32::new(0)) })
            .await;
        hits.fetch_add(1, Ordering::Relaxed) < self.requests
    }
}

/// First `X-Forwarded-For` address, then the peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .or_else(|| peer.map(|addr| addr.ip()))
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(limiter) = state.limiter.as_ref() else {
        return next.run(request).await;
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);

    if !limiter.check(ip).await {
        tracing::warn!(%ip, "rate limit exceeded");
        return ApiError::too_many_requests(TOO_MANY_REQUESTS).into_response();
    }

    next.run(request).await
}
