use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::decision::DecisionReport;
use super::domain::{Actor, ActorType, ApplicationKey, ClientDebtorId, UserId};
use super::service::{
    CompanyDetailsRequest, CreditApplicationService, CreditLimitRequest, IntakeError,
    PartnerDetailsRequest, UnderwriterDecision,
};

/// Header carrying the acting user's id; requests without it act as the system.
pub const ACTOR_HEADER: &str = "x-user-id";
/// Optional header distinguishing client users from staff.
pub const ACTOR_TYPE_HEADER: &str = "x-user-type";

/// Router builder exposing intake, decisioning and renewal endpoints.
pub fn application_router(service: Arc<CreditApplicationService>) -> Router {
    Router::new()
        .route(
            "/api/v1/credit/applications",
            post(company_details_handler),
        )
        .route("/api/v1/credit/applications/:key", get(status_handler))
        .route(
            "/api/v1/credit/applications/:key/partners",
            put(partner_details_handler),
        )
        .route(
            "/api/v1/credit/applications/:key/credit-limit",
            put(credit_limit_handler),
        )
        .route(
            "/api/v1/credit/applications/:key/submit",
            post(submit_handler),
        )
        .route(
            "/api/v1/credit/applications/:key/automation",
            post(retry_automation_handler),
        )
        .route(
            "/api/v1/credit/applications/:key/decision",
            post(decision_handler),
        )
        .route(
            "/api/v1/credit/limits/:client_debtor_id/renewals",
            post(renewal_handler),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenewalRequest {
    pub credit_limit: Decimal,
}

pub(crate) fn actor_from(headers: &HeaderMap) -> Actor {
    let Some(id) = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Actor::system();
    };
    let kind = match headers
        .get(ACTOR_TYPE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some("client-user") => ActorType::ClientUser,
        _ => ActorType::User,
    };
    Actor {
        kind,
        id: UserId(id.to_string()),
    }
}

/// HTTP status for an intake failure.
pub fn status_for(error: &IntakeError) -> StatusCode {
    match error.code() {
        "NO_APPLICATION_FOUND" | "NO_RECORD_FOUND" => StatusCode::NOT_FOUND,
        "APPLICATION_ALREADY_EXISTS" | "INVALID_TRANSITION" | "ALREADY_DECIDED" => {
            StatusCode::CONFLICT
        }
        "REQUIRE_FIELD_MISSING" | "INSUFFICIENT_DATA" | "INVALID_CREDIT_LIMIT" => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: IntakeError) -> Response {
    let payload = json!({
        "code": error.code(),
        "error": error.to_string(),
    });
    (status_for(&error), Json(payload)).into_response()
}

pub(crate) async fn company_details_handler(
    State(service): State<Arc<CreditApplicationService>>,
    headers: HeaderMap,
    Json(request): Json<CompanyDetailsRequest>,
) -> Response {
    match service
        .store_company_details(request, &actor_from(&headers))
        .await
    {
        Ok(step) => (StatusCode::CREATED, Json(step)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler(
    State(service): State<Arc<CreditApplicationService>>,
    Path(key): Path<ApplicationKey>,
) -> Response {
    match service.get(&key).await {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn partner_details_handler(
    State(service): State<Arc<CreditApplicationService>>,
    Path(key): Path<ApplicationKey>,
    Json(request): Json<PartnerDetailsRequest>,
) -> Response {
    match service.store_partner_details(&key, request).await {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn credit_limit_handler(
    State(service): State<Arc<CreditApplicationService>>,
    Path(key): Path<ApplicationKey>,
    Json(request): Json<CreditLimitRequest>,
) -> Response {
    match service.store_credit_limit_details(&key, request).await {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

fn automation_response(result: Result<DecisionReport, IntakeError>) -> Response {
    match result {
        Ok(report) => {
            let payload = json!({
                "decision": report.decision,
                "application": report.application.status_view(),
                "insurer": report.insurer,
                "sideEffectFailures": report.side_effect_failures,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler(
    State(service): State<Arc<CreditApplicationService>>,
    headers: HeaderMap,
    Path(key): Path<ApplicationKey>,
) -> Response {
    automation_response(service.submit(&key, &actor_from(&headers)).await)
}

pub(crate) async fn retry_automation_handler(
    State(service): State<Arc<CreditApplicationService>>,
    headers: HeaderMap,
    Path(key): Path<ApplicationKey>,
) -> Response {
    automation_response(service.retry_automation(&key, &actor_from(&headers)).await)
}

pub(crate) async fn decision_handler(
    State(service): State<Arc<CreditApplicationService>>,
    headers: HeaderMap,
    Path(key): Path<ApplicationKey>,
    Json(decision): Json<UnderwriterDecision>,
) -> Response {
    match service
        .record_underwriter_decision(&key, decision, &actor_from(&headers))
        .await
    {
        Ok(report) => {
            let payload = json!({
                "decision": report.decision,
                "application": report.application.status_view(),
                "sideEffectFailures": report.side_effect_failures,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn renewal_handler(
    State(service): State<Arc<CreditApplicationService>>,
    headers: HeaderMap,
    Path(client_debtor_id): Path<String>,
    Json(request): Json<RenewalRequest>,
) -> Response {
    let id = ClientDebtorId(client_debtor_id);
    match service
        .renew(&id, request.credit_limit, &actor_from(&headers))
        .await
    {
        Ok(Some(ticket)) => {
            let payload = json!({
                "renewed": true,
                "application": ticket.application.status_view(),
            });
            (StatusCode::ACCEPTED, Json(payload)).into_response()
        }
        Ok(None) => (StatusCode::OK, Json(json!({ "renewed": false }))).into_response(),
        Err(error) => error_response(error),
    }
}
