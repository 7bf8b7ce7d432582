use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    let authenticated = middleware::from_fn_with_state(
        app_state.clone(),
        middlewares::auth::auth_middleware,
    );

    Router::new()
        // Public endpoints
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .merge(hunt_routes())
        // Protected endpoints (require JWT)
        .merge(player_routes().route_layer(authenticated.clone()))
        .merge(organizer_routes().route_layer(authenticated))
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn hunt_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/hunts", get(handlers::hunts::list_hunts))
        .route("/api/v1/hunts/{id}", get(handlers::hunts::get_hunt))
        .route(
            "/api/v1/achievements",
            get(handlers::achievements::list_achievements),
        )
}

fn player_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/sessions", post(handlers::sessions::join_hunt))
        .route("/api/v1/sessions/{id}", get(handlers::sessions::get_session))
        .route(
            "/api/v1/sessions/{id}/clues",
            post(handlers::sessions::submit_clue),
        )
        .route(
            "/api/v1/sessions/{id}/hints",
            post(handlers::sessions::use_hint),
        )
        .route(
            "/api/v1/sessions/{id}/abandon",
            post(handlers::sessions::abandon),
        )
        .route(
            "/api/v1/sessions/{id}/stream",
            get(handlers::sse::session_stream),
        )
        .route(
            "/api/v1/users/me/achievements",
            get(handlers::achievements::my_achievements),
        )
}

/// Authoring; the guard runs after `auth_middleware` has attached the claims.
fn organizer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/organizer/hunts",
            post(handlers::hunts::create_hunt),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::organizer_guard_middleware,
        ))
}
