use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::applications::router::status_for;
use crate::workflows::applications::IntakeError;

/// Top-level error for the binary and HTTP surface.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("application error: {0}")]
    Application(#[from] IntakeError),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Application(err) => err.code(),
            AppError::Config(_) => "CONFIGURATION_ERROR",
            AppError::Telemetry(_) | AppError::Io(_) | AppError::Server(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Application(err) => status_for(err),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "code": self.code(), "error": self.to_string() }));
        (status, body).into_response()
    }
}
