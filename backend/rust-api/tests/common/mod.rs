#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use treasurehunt_api::{
    config::{Config, SyncConfig},
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    services::{proximity::HaversineOracle, store::InMemoryStore, AppState},
};

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// Louvre courtyard, inside the first sample clue's radius.
pub const COURTYARD: (f64, f64) = (48.8611, 2.3358);

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    Config {
        mongo_uri: "mongodb://unused".to_string(),
        redis_uri: "redis://unused".to_string(),
        mongo_database: "treasurehunt_test".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        sync: SyncConfig {
            tick_interval_ms: 20,
            flush_every_ticks: 1,
            ..SyncConfig::default()
        },
    }
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = Arc::new(InMemoryStore::new());
    let state = Arc::new(AppState::with_stores(
        test_config(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(HaversineOracle),
    ));

    TestApp {
        router: create_router(state.clone()),
        store,
        state,
    }
}

pub fn token_for(user_id: &str, role: &str) -> String {
    JwtService::new(TEST_JWT_SECRET)
        .generate_token(&JwtClaims::new(user_id, role, 3600))
        .expect("token")
}

/// Sends a request and returns the status plus the JSON body
/// (`Value::Null` when the body is empty or not JSON).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
