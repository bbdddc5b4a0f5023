//! HTTP API: operator endpoints, health probes and Prometheus metrics

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use sentinel_lib::{
    health::{ComponentStatus, HealthRegistry},
    scheduler::ReconcileJob,
    store::{AuditFilter, NotificationFilter, NotificationStore},
    Reconciler, SentinelError,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub store: Arc<dyn NotificationStore>,
    pub reconciler: Reconciler,
    pub job: Arc<ReconcileJob>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, job: Arc<ReconcileJob>) -> Self {
        let reconciler = job.reconciler().clone();
        Self {
            health_registry,
            store: reconciler.store().clone(),
            reconciler,
            job,
        }
    }
}

/// Error body `{ "error": ... }` with a status derived from the failure kind
#[derive(Debug)]
pub enum ApiError {
    Sentinel(SentinelError),
    Busy(String),
    BadRequest(String),
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        ApiError::Sentinel(err)
    }
}

impl From<sentinel_lib::StoreError> for ApiError {
    fn from(err: sentinel_lib::StoreError) -> Self {
        ApiError::Sentinel(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Busy(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Sentinel(err) => match err {
                SentinelError::NotFound(_) => StatusCode::NOT_FOUND,
                SentinelError::Conflict { .. } => StatusCode::CONFLICT,
                SentinelError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SentinelError::Timeout { .. } | SentinelError::Sampler { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                SentinelError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let message = match self {
            ApiError::Busy(msg) | ApiError::BadRequest(msg) => msg,
            ApiError::Sentinel(err) => {
                if status.is_server_error() {
                    error!(error = %err, "Request failed");
                }
                err.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    filter: Result<Query<NotificationFilter>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(filter) = filter?;
    let page = state.store.list(&filter).await?;
    Ok(Json(page))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state
        .store
        .get(id)
        .await?
        .ok_or(SentinelError::NotFound(id))?;
    Ok(Json(notification))
}

#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub by: String,
}

async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<AckRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state.reconciler.acknowledge(id, &body.by, Utc::now()).await?;
    Ok(Json(notification))
}

async fn list_audit(
    State(state): State<Arc<AppState>>,
    filter: Result<Query<AuditFilter>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(filter) = filter?;
    let events = state.store.audit_events(&filter).await?;
    Ok(Json(events))
}

/// Trigger a pass now, under the same lock as the scheduler
async fn scan(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    match state.job.try_run(Utc::now()).await? {
        Some(summary) => Ok(Json(summary)),
        None => Err(ApiError::Busy(
            "a reconciliation pass is already running".to_string(),
        )),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id", get(get_notification))
        .route("/api/notifications/:id/ack", post(acknowledge))
        .route("/api/audit", get(list_audit))
        .route("/api/scan", post(scan))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
