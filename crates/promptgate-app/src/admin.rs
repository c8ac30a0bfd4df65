//! The admin surface: queue introspection and reconfiguration, cache
//! control, health, and a read-only view of the running configuration.
//! Every mutation is audited through `EventSink::admin_mutation` before it
//! returns, regardless of outcome.

use crate::context::RequestId;
use crate::events::AdminMutation;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use promptgate_concurrency::ParallelLimit;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Deserialize)]
struct ModelQuery {
    model: Option<String>,
}

async fn queue_stats(State(state): State<AppState>, Query(q): Query<ModelQuery>) -> Response {
    match q.model {
        Some(model) => match state.concurrency.stats_for(&model) {
            Some(stats) => Json(stats).into_response(),
            None => (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown model", "model": model }))).into_response(),
        },
        None => Json(state.concurrency.stats_all()).into_response(),
    }
}

async fn queue_memory(State(_state): State<AppState>) -> Response {
    Json(promptgate_concurrency::host_memory()).into_response()
}

#[derive(Deserialize)]
struct ResetBody {
    /// Absent means every model seen so far.
    model: Option<String>,
}

async fn queue_reset(State(state): State<AppState>, Json(body): Json<ResetBody>) -> Response {
    let detail = match &body.model {
        Some(model) => {
            state.concurrency.reset_counters(model);
            model.clone()
        }
        None => {
            for stats in state.concurrency.stats_all() {
                state.concurrency.reset_counters(&stats.model);
            }
            "*".to_string()
        }
    };
    state.events.admin_mutation(AdminMutation {
        request_id: RequestId::new(),
        action: "queue_reset".to_string(),
        detail: detail.clone(),
    });
    (StatusCode::OK, Json(json!({ "model": detail, "reset": true }))).into_response()
}

/// Either a fixed slot count or the literal string `"auto"`, matching the
/// configuration surface's `int | "auto"` shape.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum ParallelLimitBody {
    Fixed(usize),
    Auto(AutoTag),
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
enum AutoTag {
    Auto,
}

impl From<ParallelLimitBody> for ParallelLimit {
    fn from(value: ParallelLimitBody) -> Self {
        match value {
            ParallelLimitBody::Fixed(n) => ParallelLimit::Fixed(n),
            ParallelLimitBody::Auto(AutoTag::Auto) => ParallelLimit::Auto,
        }
    }
}

#[derive(Deserialize)]
struct UpdateBody {
    model: String,
    parallel_limit: Option<ParallelLimitBody>,
    queue_limit: Option<usize>,
}

async fn queue_update(State(state): State<AppState>, Json(body): Json<UpdateBody>) -> Response {
    state
        .concurrency
        .reconfigure(&body.model, body.parallel_limit.map(Into::into), body.queue_limit);
    state.events.admin_mutation(AdminMutation {
        request_id: RequestId::new(),
        action: "queue_update".to_string(),
        detail: format!(
            "model={} parallel_limit={:?} queue_limit={:?}",
            body.model, body.parallel_limit.map(ParallelLimit::from), body.queue_limit
        ),
    });
    (StatusCode::OK, Json(json!({ "model": body.model, "updated": true }))).into_response()
}

async fn health() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

async fn config(State(state): State<AppState>) -> Response {
    Json(&state.config).into_response()
}

async fn cache_clear(State(state): State<AppState>) -> Response {
    state.input_scan.clear_cache();
    state.output_scan.clear_cache();
    state.events.admin_mutation(AdminMutation {
        request_id: RequestId::new(),
        action: "cache_clear".to_string(),
        detail: String::new(),
    });
    (
        StatusCode::OK,
        Json(json!({
            "cleared": true,
            "input_scan": state.input_scan.cache_stats(),
            "output_scan": state.output_scan.cache_stats(),
        })),
    )
        .into_response()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue/stats", get(queue_stats))
        .route("/queue/memory", get(queue_memory))
        .route("/admin/queue/reset", post(queue_reset))
        .route("/admin/queue/update", post(queue_update))
        .route("/health", get(health))
        .route("/config", get(config))
        .route("/admin/cache/clear", post(cache_clear))
}
