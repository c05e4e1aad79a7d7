use axum::Router;

pub mod agents;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new().nest("/agents", agents::router())
}
