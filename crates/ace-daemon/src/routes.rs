//! HTTP service surface (§6). Grounded on `gator-cli::serve_cmd`'s
//! `build_router`/`run_serve`/`shutdown_signal` shape, generalized from a
//! read-only dashboard API over Postgres to a control surface over the
//! in-memory Pool Scheduler.

use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::AppError;
use crate::state::AppState;
use crate::webhook::verify_signature;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/webhook/github", post(webhook_github))
        .route("/agents/status", get(agents_status))
        .route("/agents/spawn", post(agents_spawn))
        .route("/agents/run", post(agents_run))
        .route("/agents/start", post(agents_start))
        .route("/agents/stop", post(agents_stop))
        .route("/scheduler/start", post(scheduler_start))
        .route("/scheduler/stop", post(scheduler_stop))
        .route("/scheduler/status", get(scheduler_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("ace-daemon listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("ace-daemon shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

#[derive(Debug, Deserialize)]
struct TargetQuery {
    #[allow(dead_code)]
    target: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics_handle.render(),
    )
}

async fn webhook_github(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(secret) = &state.config.github_webhook_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing X-Hub-Signature-256 header"))?;

        if !verify_signature(secret, &body, signature) {
            return Err(AppError::unauthorized("signature mismatch"));
        }
    }

    Ok(Json(serde_json::json!({ "status": "queued" })))
}

async fn agents_status(
    State(state): State<AppState>,
    Query(_query): Query<TargetQuery>,
) -> Json<ace_core::model::PoolStatus> {
    Json(state.scheduler.pool_status().await)
}

async fn agents_spawn(State(state): State<AppState>) -> Json<serde_json::Value> {
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        scheduler.process_work_queue().await;
    });
    Json(serde_json::json!({ "status": "spawning" }))
}

async fn agents_run(State(state): State<AppState>) -> Json<serde_json::Value> {
    if state.scheduler.has_active_agents().await {
        return Json(serde_json::json!({ "status": "already_running" }));
    }

    let scheduler = state.scheduler.clone();
    let check_interval = std::time::Duration::from_secs(state.config.poll_interval_seconds);
    tokio::spawn(async move {
        if let Err(e) = scheduler.run_until_empty(check_interval).await {
            tracing::warn!(error = %e, "agents/run drain pass failed");
        }
    });
    Json(serde_json::json!({ "status": "running" }))
}

async fn agents_start(State(state): State<AppState>) -> Json<serde_json::Value> {
    let scheduler = state.scheduler.clone();
    let poll_interval = std::time::Duration::from_secs(state.config.poll_interval_seconds);
    tokio::spawn(async move {
        if let Err(e) = scheduler.run_continuous(poll_interval).await {
            tracing::warn!(error = %e, "agents/start continuous run failed");
        }
    });
    Json(serde_json::json!({ "status": "started" }))
}

async fn agents_stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.scheduler.stop();
    Json(serde_json::json!({ "status": "stopped" }))
}

async fn scheduler_start(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.daily.start().await;
    Json(serde_json::json!({ "status": "started" }))
}

async fn scheduler_stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.daily.stop().await;
    Json(serde_json::json!({ "status": "stopped" }))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<crate::daily::SchedulerStatus> {
    Json(state.daily.status())
}
