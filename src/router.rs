use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{self, SecurityConfig};
use crate::handlers::{self, auth, reviews, tours, users};
use crate::middleware::{rate_limit::rate_limit, sanitize::sanitize_body, security_headers::security_headers};
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let config = config::config();

    let api = Router::new()
        .nest("/tours", tour_routes())
        .nest("/users", user_routes())
        .nest("/reviews", review_routes())
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(sanitize_body));

    if config.security.enable_cors {
        app = app.layer(cors_layer(&config.security));
    }
    if config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    app.layer(middleware::from_fn(security_headers)).with_state(state)
}

fn tour_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(tours::get_all_tours).post(tours::create_tour))
        .route("/top-5-cheap", get(tours::alias_top_tours))
        .route("/tour-stats", get(tours::get_tour_stats))
        .route("/monthly-tours/:year", get(tours::get_monthly_plan))
        .route(
            "/tours-within/:distance/center/:latlng/unit/:unit",
            get(tours::get_tours_within),
        )
        .route("/distances/:latlng/unit/:unit", get(tours::get_distances))
        .route(
            "/:id",
            get(tours::get_tour).patch(tours::update_tour).delete(tours::delete_tour),
        )
        .route(
            "/:id/reviews",
            get(reviews::get_tour_reviews).post(reviews::create_tour_review),
        )
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/forgetPassword", post(auth::forget_password))
        .route("/resetPassword/:token", patch(auth::reset_password))
        .route("/updatePassword", patch(auth::update_password))
        .route("/Me", get(users::get_me))
        .route("/updateMe", patch(users::update_me))
        .route("/deleteMe", axum::routing::delete(users::delete_me))
        .route("/", get(users::get_all_users).post(users::create_user))
        .route(
            "/:id",
            get(users::get_user).patch(users::update_user).delete(users::delete_user),
        )
}

fn review_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(reviews::get_all_reviews).post(reviews::create_review))
        .route(
            "/:id",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
}

/// Any origin when the list contains `*`, otherwise the configured origins
fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
