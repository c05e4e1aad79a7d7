use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};

use opspilot_infra::TriggerRequest;
use serde_json::json;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/run-all", post(run_all))
        .route("/run/:name", post(run_agent))
        .route("/status", get(status))
        .route("/actions", get(recent_actions))
        .route("/schedule/trigger", post(trigger_schedule))
}

pub async fn run_agent(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
    body: Option<Json<dto::RunAgentRequest>>,
) -> axum::response::Response {
    let input = body.and_then(|Json(req)| req.data);
    match services.orchestrator().run_one(&name, input).await {
        Ok(result) => dto::ok(result),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn run_all(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.orchestrator().run_all().await {
        Ok(batch) => dto::ok(batch),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn status(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.orchestrator().registry().status() {
        Ok(status) => dto::ok(status),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "registry_error", e.to_string()),
    }
}

pub async fn recent_actions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ActionsQuery>,
) -> axum::response::Response {
    match services.orchestrator().audit().recent(query.effective_limit()).await {
        Ok(actions) => dto::ok(actions),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

/// Ask the recurring scheduler for an immediate `run_all` pass (202, runs in the background).
pub async fn trigger_schedule(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let Some(trigger) = services.scheduler_trigger() else {
        return errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "scheduler_disabled",
            "the recurring scheduler is not running",
        );
    };

    match trigger.request() {
        TriggerRequest::Stopped => errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "scheduler_stopped",
            "the recurring scheduler has stopped",
        ),
        request => dto::accepted(json!({ "request": request })),
    }
}
