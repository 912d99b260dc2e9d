use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use nodemetrics_collector::{Registry, RequestCounter};

use crate::handlers;

pub struct ExporterState {
    pub registry: Arc<Registry>,
    pub requests: Arc<RequestCounter>,
}

const HEALTH_LIVE_PATH: &str = "/health/live";

// Only literal segments are allowed so the path can never hit axum's
// capture or wildcard syntax.
pub fn validate_metrics_path(path: &str) -> std::io::Result<()> {
    let invalid = |reason: &str| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid --metrics-path {path:?}: {reason}"),
        )
    };

    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid("must start with '/'"));
    };
    if path == HEALTH_LIVE_PATH {
        return Err(invalid("shadows the liveness route"));
    }
    if rest.is_empty() {
        return Ok(());
    }

    for segment in rest.split('/') {
        if segment.is_empty() {
            return Err(invalid("contains an empty segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
        {
            return Err(invalid("segments may only use letters, digits, '-', '_', '.', '~'"));
        }
    }

    Ok(())
}

pub fn exporter_router(state: Arc<ExporterState>, metrics_path: &str) -> Router {
    Router::new()
        .route(metrics_path, get(handlers::metrics::scrape_metrics))
        .route(HEALTH_LIVE_PATH, get(handlers::health::health_live))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            handlers::metrics::count_requests,
        ))
        .with_state(state)
}
