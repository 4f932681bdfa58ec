use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a runtime summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let defaults = state.router.defaults();
    Json(json!({
        "status": "ok",
        "service": "llm-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "streams": {
            "active": state.sessions.active_count(),
            "max_concurrent": state.sessions.max_concurrent(),
        },
        "providers": state.providers.enabled().iter().map(|p| p.id().to_string()).collect::<Vec<_>>(),
        "routing": {
            "default_provider_id": defaults.provider_id,
            "default_model_id": defaults.model_id,
        },
        "pending_permissions": state.permissions.pending(None).len(),
    }))
}
