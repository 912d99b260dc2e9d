use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use nodemetrics_collector::{CONTENT_TYPE, render_text};
use tracing::error;

use crate::router::ExporterState;

pub async fn scrape_metrics(State(state): State<Arc<ExporterState>>) -> Response {
    let registry = Arc::clone(&state.registry);
    let payload = match tokio::task::spawn_blocking(move || render_text(&registry.gather())).await {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "metrics gather task failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "metrics gather failed").into_response();
        }
    };

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));

    response
}

pub async fn count_requests(
    State(state): State<Arc<ExporterState>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    state.requests.inc();
    response
}
