use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

pub const DEFAULT_ACTIONS_LIMIT: usize = 20;
pub const MAX_ACTIONS_LIMIT: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct RunAgentRequest {
    /// Unit-specific input, passed through unchanged.
    pub data: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionsQuery {
    pub limit: Option<usize>,
}

impl ActionsQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_ACTIONS_LIMIT).clamp(1, MAX_ACTIONS_LIMIT)
    }
}

/// `200 {success: true, data, timestamp}`.
pub fn ok<T: Serialize>(data: T) -> axum::response::Response {
    (
        StatusCode::OK,
        axum::Json(json!({
            "success": true,
            "data": data,
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}

/// `202 {success: true, data, timestamp}` for work handed off to a background task.
pub fn accepted<T: Serialize>(data: T) -> axum::response::Response {
    (
        StatusCode::ACCEPTED,
        axum::Json(json!({
            "success": true,
            "data": data,
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}
