use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{NaiveDate, Utc};
use credit_automation::error::AppError;
use credit_automation::workflows::applications::{
    application_router, CreditApplicationService, SweepSummary,
};
use serde::Deserialize;
use serde_json::json;

use crate::infra::{day_end, day_start, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExpirySweepRequest {
    /// Day whose expiring limits are announced. Defaults to today (UTC).
    #[serde(default)]
    pub(crate) day: Option<NaiveDate>,
}

pub(crate) fn with_operational_routes(service: Arc<CreditApplicationService>) -> Router {
    let sweep = Router::new()
        .route(
            "/api/v1/credit/limits/expiring/notify",
            post(expiry_sweep_endpoint),
        )
        .with_state(Arc::clone(&service));

    application_router(service)
        .merge(sweep)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn expiry_sweep_endpoint(
    State(service): State<Arc<CreditApplicationService>>,
    Json(request): Json<ExpirySweepRequest>,
) -> Result<Json<SweepSummary>, AppError> {
    let day = request.day.unwrap_or_else(|| Utc::now().date_naive());
    service
        .notify_expiring_limits(day_start(day), day_end(day))
        .await
        .map(Json)
        .map_err(AppError::from)
}
