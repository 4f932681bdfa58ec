use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures_util::future::join_all;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::api::common::ok_json_response;
use crate::state::AppState;

const MODEL_CREATED: u64 = 1_677_610_602;

#[derive(Debug, Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    created: u64,
    owned_by: String,
}

#[derive(Debug, Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

/// Collect `provider/model` entries from every enabled provider. Providers
/// are queried concurrently; a failing provider is logged and left out.
async fn collect_models(state: &AppState) -> ModelList {
    let providers = state.providers.enabled();
    let results = join_all(providers.iter().map(|provider| provider.list_models())).await;

    let mut seen = FxHashSet::default();
    let mut data = Vec::new();
    for (provider, result) in providers.iter().zip(results) {
        match result {
            Ok(models) => {
                for model in models {
                    let id = format!("{}/{model}", provider.id());
                    if seen.insert(id.clone()) {
                        data.push(ModelEntry {
                            id,
                            object: "model",
                            created: MODEL_CREATED,
                            owned_by: provider.id().to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                tracing::warn!(provider = %provider.id(), "model listing failed: {err}");
            }
        }
    }
    ModelList {
        object: "list",
        data,
    }
}

/// `GET /v1/models`, in the `OpenAI` list format.
pub async fn handler(State(state): State<Arc<AppState>>) -> Response {
    let list = collect_models(&state).await;
    match ok_json_response(&list) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
