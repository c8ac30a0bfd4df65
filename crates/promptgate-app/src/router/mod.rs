//! Route table: wires every endpoint to its handler and builds the
//! `axum::Router` handed to `axum::serve`.

mod blocked;
mod handlers;
mod request;

use crate::state::AppState;
use axum::extract::{ConnectInfo, State};
use axum::http::Method;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use std::net::SocketAddr;

async fn generate(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, body: Bytes) -> Response {
    handlers::handle_scanned(state, addr.ip(), "/api/generate", request::parse_ollama_generate, body).await
}

async fn chat(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, body: Bytes) -> Response {
    handlers::handle_scanned(state, addr.ip(), "/api/chat", request::parse_ollama_chat, body).await
}

async fn embed(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, body: Bytes) -> Response {
    handlers::handle_scanned(state, addr.ip(), "/api/embed", request::parse_ollama_embed, body).await
}

async fn chat_completions(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    handlers::handle_scanned(
        state,
        addr.ip(),
        "/v1/chat/completions",
        request::parse_openai_chat_completions,
        body,
    )
    .await
}

async fn completions(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, body: Bytes) -> Response {
    handlers::handle_scanned(state, addr.ip(), "/v1/completions", request::parse_openai_completions, body).await
}

async fn embeddings(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, body: Bytes) -> Response {
    handlers::handle_scanned(state, addr.ip(), "/v1/embeddings", request::parse_openai_embeddings, body).await
}

/// One `passthrough` handler per relayed path, since `axum`'s extractors
/// don't give us the matched route template inside the handler body.
macro_rules! passthrough_route {
    ($name:ident, $path:expr) => {
        async fn $name(
            State(state): State<AppState>,
            ConnectInfo(addr): ConnectInfo<SocketAddr>,
            method: Method,
            body: Bytes,
        ) -> Response {
            handlers::passthrough(state, addr.ip(), method, $path.to_string(), body).await
        }
    };
}

passthrough_route!(tags, "/api/tags");
passthrough_route!(ps, "/api/ps");
passthrough_route!(version, "/api/version");
passthrough_route!(show, "/api/show");
passthrough_route!(pull, "/api/pull");
passthrough_route!(push, "/api/push");
passthrough_route!(create, "/api/create");
passthrough_route!(copy, "/api/copy");
passthrough_route!(delete, "/api/delete");
passthrough_route!(models, "/v1/models");

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/chat", post(chat))
        .route("/api/embed", post(embed))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/completions", post(completions))
        .route("/v1/embeddings", post(embeddings))
        .route("/api/tags", get(tags))
        .route("/api/ps", get(ps))
        .route("/api/version", get(version))
        .route("/api/show", post(show))
        .route("/api/pull", post(pull))
        .route("/api/push", post(push))
        .route("/api/create", post(create))
        .route("/api/copy", post(copy))
        .route("/api/delete", axum::routing::delete(delete))
        .route("/v1/models", get(models))
        .merge(crate::admin::router())
        .with_state(state)
}
