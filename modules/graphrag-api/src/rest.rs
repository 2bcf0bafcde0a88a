use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use graphrag_common::{AskRequest, RagError, Strategy};

use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

/// Fused answer. Routing overrides are ignored and the route trace is omitted.
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<AskRequest>,
) -> Response {
    if body.question.trim().is_empty() {
        return bad_request("question must not be empty");
    }
    body.strategy = Some(Strategy::Fused);
    body.auto = Some(false);

    match state.pipeline.ask(&body).await {
        Ok(mut response) => {
            response.route_decision = None;
            response.seeds = None;
            Json(response).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Routed answer; honours `strategy` and `auto`, and reports the decision.
pub async fn ask_route(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> Response {
    if body.question.trim().is_empty() {
        return bad_request("question must not be empty");
    }
    match state.pipeline.ask(&body).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn schema(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.schema().snapshot().await {
        Ok(snapshot) => Json(snapshot.as_ref()).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn refresh_schema(State(state): State<Arc<AppState>>) -> Response {
    match state.pipeline.schema().refresh().await {
        Ok(snapshot) => Json(snapshot.as_ref()).into_response(),
        Err(e) => error_response(e),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn error_response(e: RagError) -> Response {
    let status = match e {
        RagError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %e, status = status.as_u16(), "Request failed");
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
