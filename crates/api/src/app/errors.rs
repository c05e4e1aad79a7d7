use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

use opspilot_agents::OrchestratorError;

pub fn orchestrator_error_to_response(err: OrchestratorError) -> axum::response::Response {
    match err {
        OrchestratorError::NotFound(name) => json_error(
            StatusCode::NOT_FOUND,
            "agent_not_found",
            format!("agent '{name}' not found"),
        ),
        err @ OrchestratorError::UnitExecution { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "unit_execution_failed", err.to_string())
        }
        OrchestratorError::Registry(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "registry_error", e.to_string())
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}
