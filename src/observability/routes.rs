use axum::routing::get;
use axum::{extract::State, response::IntoResponse, Router};
use http::{header::CONTENT_TYPE, StatusCode};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

use crate::config::settings::MetricsConfig;
use crate::server::server::AppState;

/// Metrics route, empty when metrics are disabled or not collected.
pub fn router(state: &AppState, metrics_config: &MetricsConfig) -> Router<AppState> {
    let mut router = Router::new();
    if metrics_config.is_enabled && state.metrics.is_some() {
        router = router.route(metrics_config.path.as_str(), get(get_metrics));
    }
    router
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, String::new()).into_response();
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metrics.registry.gather(), &mut buffer) {
        error!("failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }

    (
        StatusCode::OK,
        [(CONTENT_TYPE, encoder.format_type().to_owned())],
        String::from_utf8_lossy(&buffer).into_owned(),
    )
        .into_response()
}
