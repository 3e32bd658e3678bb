//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use orbit_tap::config::EconomyConfig;
use orbit_tap::db::Database;
use orbit_tap::gateway::{self, AppState};

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: Once = Once::new();

/// Ensure the ledger schema exists (runs the migration once per test suite).
pub fn ensure_schema() {
    SCHEMA_INIT.call_once(|| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = Database::connect(&test_db_url()).await.unwrap();
            db.migrate().await.unwrap();
        });
    });
}

/// Connect to the test database with empty ledger tables.
pub async fn setup_test_db() -> Database {
    ensure_schema();
    let db = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    truncate_all_tables(db.pool().expect("postgres backend")).await;
    db
}

/// Truncate all tables to ensure test isolation.
pub async fn truncate_all_tables(pool: &sqlx::PgPool) {
    sqlx::raw_sql(
        "TRUNCATE TABLE stats, tasks, active_boosts, generators, accounts RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Gateway state over a fresh in-memory ledger and the default catalog.
pub fn test_state() -> Arc<AppState> {
    AppState::new(Database::in_memory(), EconomyConfig::default())
}

/// Build an Axum test app router over a fresh in-memory ledger.
pub fn build_test_app() -> (Router, Arc<AppState>) {
    let state = test_state();
    (gateway::build_router(state.clone(), None), state)
}

/// Sends a GET request and returns the status code and parsed JSON body
/// (`null` when the body is not JSON).
pub async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::json!(null));
    (status, json)
}

/// Sends a GET request and returns the status code and raw body text.
pub async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// Sends a POST request with a JSON body and returns the status code and parsed response.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_raw(app, uri, body.to_string()).await
}

/// Sends a POST request with an arbitrary body labelled as JSON.
pub async fn post_raw(app: &Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null));
    (status, json)
}

/// Sign in a Telegram user and return the `user` object.
pub async fn sign_in(app: &Router, telegram_id: i64, start_param: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "id": telegram_id,
        "first_name": "Ada",
        "last_name": "Lovelace",
    });
    if let Some(code) = start_param {
        body["start_param"] = serde_json::json!(code);
    }
    let (status, json) = post_json(app, "/api/auth/telegram", body).await;
    assert_eq!(status, StatusCode::OK, "sign-in failed: {json}");
    assert_eq!(json["success"], true);
    json["user"].clone()
}

/// Give an account points through the points endpoint (source `bonus`, no energy change).
pub async fn grant(app: &Router, account_id: i64, points: f64) -> serde_json::Value {
    let (status, json) = post_json(
        app,
        &format!("/api/user/{account_id}/points"),
        serde_json::json!({"points": points, "source": "bonus"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "grant failed: {json}");
    json
}

/// Serve the gateway on an ephemeral local port. Returns the `http://` base
/// URL and the shared state; the server runs until the test runtime ends.
pub async fn spawn_live_server(economy: EconomyConfig) -> (String, Arc<AppState>) {
    let state = AppState::new(Database::in_memory(), economy);
    let app = gateway::build_router(state.clone(), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}
