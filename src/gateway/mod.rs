//! # Gateway — REST Endpoints and Push Channel
//!
//! Runs an Axum HTTP server that validates incoming economic events,
//! applies them to the ledger through the economy engine, and pushes
//! asynchronous notifications (referral bonuses, snapshots) over a
//! per-account WebSocket.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/auth/telegram` | [`routes_auth`] |
//! | `GET /api/catalog` | [`routes_shop`] |
//! | `GET /api/user/{id}` | [`routes_user`] |
//! | `POST /api/user/{id}/points`, `/wallet` | [`routes_user`] |
//! | `POST /api/user/{id}/generators`, `/boosts`, `/upgrades` | [`routes_shop`] |
//! | `POST /api/user/{id}/tasks/complete`, `/tasks/progress` | [`routes_tasks`] |
//! | `GET /ws?userId=` | [`websocket`] |
//! | `GET /healthz`, `/readyz`, `/metrics` | [`routes_health`] |

pub mod connections;
mod error;
pub mod identity;
pub mod locks;
mod routes_auth;
mod routes_health;
mod routes_shop;
mod routes_tasks;
mod routes_user;
pub mod session;
mod websocket;

pub use error::ApiError;

use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Instrument};

use crate::config::{EconomyConfig, ServerConfig};
use crate::db::Database;
use crate::metrics;
use connections::ConnectionManager;
use identity::{AcceptAll, IdentityVerifier};
use locks::AccountLocks;

/// Lock a mutex, recovering from poisoning.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AppState {
    pub db: Database,
    pub economy: EconomyConfig,
    pub connections: ConnectionManager,
    pub locks: AccountLocks,
    pub verifier: Box<dyn IdentityVerifier>,
    pub metrics: metrics::Metrics,
}

impl AppState {
    pub fn new(db: Database, economy: EconomyConfig) -> Arc<Self> {
        Self::with_verifier(db, economy, Box::new(AcceptAll))
    }

    pub fn with_verifier(
        db: Database,
        economy: EconomyConfig,
        verifier: Box<dyn IdentityVerifier>,
    ) -> Arc<Self> {
        Arc::new(AppState {
            db,
            economy,
            connections: ConnectionManager::new(),
            locks: AccountLocks::new(),
            verifier,
            metrics: metrics::Metrics::new(),
        })
    }
}

/// Request span, `x-request-id` echo and the latency histogram.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let route = route_label(&path);
    let span = tracing::info_span!("request", %request_id, %method, %path);

    let started = std::time::Instant::now();
    let mut response = next.run(req).instrument(span).await;
    state
        .metrics
        .http_request_duration
        .get_or_create(&metrics::HttpLabel {
            method,
            path: route.to_string(),
        })
        .observe(started.elapsed().as_secs_f64());

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

const FIXED_ROUTES: &[&str] = &[
    "/api/auth/telegram",
    "/api/catalog",
    "/ws",
    "/healthz",
    "/readyz",
    "/metrics",
];

/// Per-account routes below `/api/user/{id}`.
const ACCOUNT_ROUTES: &[(&str, &str)] = &[
    ("", "/api/user/:id"),
    ("points", "/api/user/:id/points"),
    ("wallet", "/api/user/:id/wallet"),
    ("generators", "/api/user/:id/generators"),
    ("boosts", "/api/user/:id/boosts"),
    ("upgrades", "/api/user/:id/upgrades"),
    ("tasks/complete", "/api/user/:id/tasks/complete"),
    ("tasks/progress", "/api/user/:id/tasks/progress"),
];

/// Histogram label for a request path: the route template, or `unmatched`
/// so that scanners can't grow the label set.
fn route_label(path: &str) -> &'static str {
    if let Some(route) = FIXED_ROUTES.iter().copied().find(|r| *r == path) {
        return route;
    }
    if let Some(rest) = path.strip_prefix("/api/user/") {
        let (id, action) = rest.split_once('/').unwrap_or((rest, ""));
        if !id.is_empty() {
            if let Some(&(_, route)) = ACCOUNT_ROUTES.iter().find(|(a, _)| *a == action) {
                return route;
            }
        }
    }
    "unmatched"
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}

pub fn build_router(state: Arc<AppState>, cors_origin: Option<&str>) -> Router {
    Router::new()
        .route("/ws", get(websocket::handler_ws))
        .route(
            "/api/auth/telegram",
            post(routes_auth::handler_auth_telegram),
        )
        .route("/api/catalog", get(routes_shop::handler_catalog))
        .route("/api/user/{id}", get(routes_user::handler_user_get))
        .route(
            "/api/user/{id}/points",
            post(routes_user::handler_user_points),
        )
        .route(
            "/api/user/{id}/wallet",
            post(routes_user::handler_user_wallet),
        )
        .route(
            "/api/user/{id}/generators",
            post(routes_shop::handler_user_generators),
        )
        .route(
            "/api/user/{id}/boosts",
            post(routes_shop::handler_user_boosts),
        )
        .route(
            "/api/user/{id}/upgrades",
            post(routes_shop::handler_user_upgrades),
        )
        .route(
            "/api/user/{id}/tasks/complete",
            post(routes_tasks::handler_tasks_complete),
        )
        .route(
            "/api/user/{id}/tasks/progress",
            post(routes_tasks::handler_tasks_progress),
        )
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        .layer(cors_layer(cors_origin))
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .with_state(state)
}

/// Rows removed by one [`sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Swept {
    pub boosts: u64,
    pub daily_tasks: u64,
}

/// Delete every account's expired boosts, and daily task rows that expired
/// more than `task_retention` before `now`. Rollover only looks at unexpired
/// rows, so neither deletion changes what a player sees.
pub async fn sweep(
    state: &AppState,
    now: DateTime<Utc>,
    task_retention: chrono::Duration,
) -> Result<Swept> {
    let boosts = state.db.prune_all_expired_boosts(now).await?;
    let daily_tasks = match now.checked_sub_signed(task_retention) {
        Some(cutoff) => state.db.prune_expired_daily_tasks(cutoff).await?,
        None => 0,
    };
    Ok(Swept { boosts, daily_tasks })
}

/// Run [`sweep`] once per `interval` and refresh the push-connection gauge.
pub fn spawn_housekeeping(
    state: Arc<AppState>,
    interval: Duration,
    task_retention: chrono::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep(&state, Utc::now(), task_retention).await {
                Ok(swept) if swept != Swept::default() => {
                    info!(boosts = swept.boosts, daily_tasks = swept.daily_tasks, "housekeeping sweep")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "housekeeping sweep failed"),
            }
            state
                .metrics
                .push_connections
                .set(state.connections.len() as i64);
        }
    })
}

pub async fn run(config: &ServerConfig, db: Database, economy: EconomyConfig) -> Result<()> {
    info!(backend = db.backend_name(), "ledger ready");
    let state = AppState::new(db, economy);
    let app = build_router(state.clone(), config.cors_origin.as_deref());
    let housekeeping = spawn_housekeeping(
        Arc::clone(&state),
        config.housekeeping_interval,
        config.task_retention,
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(port = config.port, "gateway running");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    housekeeping.abort();
    info!("gateway shut down gracefully");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix. Open push sockets are dropped
/// with the server; clients reconnect and resync.
async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!(signal = "SIGINT", "gateway stopping"),
        _ = terminate => info!(signal = "SIGTERM", "gateway stopping"),
    }
}
