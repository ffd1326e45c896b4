//! Administrative HTTP surface.

use crate::admin::{AdminState, AdminStatus};
use crate::error::{ChaosError, Result};
use crate::experiment::{ExperimentManager, ExperimentSummary};
use crate::health::HealthResponse;
use crate::shutdown::ShutdownCoordinator;
use crate::types::{ExperimentId, ExperimentType, Fingerprint};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminApi {
    manager: Arc<ExperimentManager>,
    metrics: Option<PrometheusHandle>,
}

impl AdminApi {
    pub fn new(manager: Arc<ExperimentManager>) -> Self {
        Self {
            manager,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Build the admin router.
pub fn router(api: AdminApi) -> Router {
    Router::new()
        .route("/admin/state", get(get_admin_state).post(set_admin_state))
        .route("/health", get(get_health))
        .route("/experiments", get(list_active))
        .route("/experiments/pending", get(list_pending))
        .route("/experiments/container/:fingerprint", post(trigger_container))
        .route("/experiments/:id/abort", post(abort_experiment))
        .route("/metrics", get(render_metrics))
        .with_state(api)
}

/// Serve the admin API until shutdown.
pub async fn serve(listener: TcpListener, api: AdminApi, shutdown: ShutdownCoordinator) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Admin server listening");
    }

    axum::serve(listener, router(api))
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await
        .map_err(|e| ChaosError::Internal(format!("Admin server failed: {}", e)))
}

// Request types

#[derive(Deserialize)]
struct StateQuery {
    state: String,
}

#[derive(Deserialize)]
struct TriggerQuery {
    kind: Option<String>,
}

// Handlers

async fn get_admin_state(State(api): State<AdminApi>) -> Json<AdminStatus> {
    Json(api.manager.admin().status())
}

async fn set_admin_state(
    State(api): State<AdminApi>,
    Query(query): Query<StateQuery>,
) -> std::result::Result<Json<AdminStatus>, (StatusCode, String)> {
    let state: AdminState = query
        .state
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
    Ok(Json(api.manager.admin().set_state(state)))
}

async fn get_health(State(api): State<AdminApi>) -> (StatusCode, Json<HealthResponse>) {
    let response = api.manager.health().response();
    let code = StatusCode::from_u16(response.status.to_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(response))
}

async fn list_active(State(api): State<AdminApi>) -> Json<Vec<ExperimentSummary>> {
    Json(api.manager.active_experiments())
}

async fn list_pending(State(api): State<AdminApi>) -> Json<Vec<ExperimentSummary>> {
    Json(api.manager.pending_experiments())
}

async fn trigger_container(
    State(api): State<AdminApi>,
    Path(fingerprint): Path<String>,
    Query(query): Query<TriggerQuery>,
) -> std::result::Result<Json<Vec<ExperimentSummary>>, (StatusCode, String)> {
    let fingerprint: Fingerprint = fingerprint
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid fingerprint: {}", e)))?;
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<ExperimentType>)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    api.manager
        .experiment_container_id(fingerprint, kind)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn abort_experiment(
    State(api): State<AdminApi>,
    Path(id): Path<String>,
) -> std::result::Result<Json<ExperimentSummary>, (StatusCode, String)> {
    let id: ExperimentId = id
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid experiment ID: {}", e)))?;

    api.manager
        .abort_experiment(id)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn render_metrics(State(api): State<AdminApi>) -> std::result::Result<String, StatusCode> {
    api.metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::NOT_FOUND)
}

fn error_response(e: ChaosError) -> (StatusCode, String) {
    let code = match &e {
        ChaosError::NotFound(_) => StatusCode::NOT_FOUND,
        ChaosError::UnsupportedExperiment { .. } | ChaosError::NoExperimentKinds(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, e.to_string())
}
