use std::sync::Arc;

use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod rest;

pub struct AppState {
    pub pipeline: graphrag_graph::Router,
}

/// HTTP surface over the retrieval pipeline.
pub fn app(state: Arc<AppState>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/", get(rest::health))
        .route("/ask", post(rest::ask))
        .route("/ask/route", post(rest::ask_route))
        .route("/schema", get(rest::schema))
        .route("/schema/refresh", post(rest::refresh_schema))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    path = %req.uri().path(),
                )
            }),
        )
        .with_state(state)
}
