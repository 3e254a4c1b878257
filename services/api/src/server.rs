use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use credit_automation::config::AppConfig;
use credit_automation::error::AppError;
use credit_automation::telemetry;
use tracing::info;

use crate::cli::ServeArgs;
use crate::infra::{seeded_store, AppState, LocalBackend};
use crate::routes::with_operational_routes;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let backend = LocalBackend::new(seeded_store(Utc::now()), &config.automation);

    let app = with_operational_routes(backend.service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        policy_timeout_ms = config.automation.policy_lookup_timeout.as_millis() as u64,
        "credit automation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
