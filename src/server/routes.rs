use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::settings::MetricsConfig;
use crate::endpoints::EndpointResult;
use crate::server::server::AppState;
use crate::server::socket;
use crate::utils::constants::{ROUTE_ENDPOINTS, ROUTE_SOCKET, ROUTE_SUBSCRIPTIONS, ROUTE_ZONES};

#[derive(Serialize)]
struct EndpointSummary<'a> {
    name: &'a str,
    interval: &'a str,
}

pub fn router(state: &AppState, metrics_config: &MetricsConfig) -> Router<AppState> {
    let mut router = Router::new()
        .route(ROUTE_ZONES, get(get_zones))
        .route(ROUTE_ENDPOINTS, get(get_endpoints))
        .route(ROUTE_SUBSCRIPTIONS, get(get_subscriptions))
        .route(ROUTE_SOCKET, get(socket::upgrade));

    for endpoint in state.dashboard.endpoints() {
        let route = endpoint.route();
        if metrics_config.is_enabled && route == metrics_config.path {
            warn!(endpoint = endpoint.name(), "route taken by metrics, endpoint not served over HTTP");
            continue;
        }
        info!("served path: {}", route);
        let name = endpoint.name().to_owned();
        router = router.route(
            &route,
            get(move |State(state): State<AppState>| get_endpoint_result(state, name.clone())),
        );
    }
    router
}

async fn get_zones(State(state): State<AppState>) -> impl IntoResponse {
    let zones = state.dashboard.store().zones().await;
    Json(json!({ "zones": zones }))
}

async fn get_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints: Vec<EndpointSummary> = state
        .dashboard
        .endpoints()
        .map(|e| EndpointSummary {
            name: e.name(),
            interval: e.interval(),
        })
        .collect();
    Json(json!({ "endpoints": endpoints }))
}

async fn get_subscriptions(State(state): State<AppState>) -> impl IntoResponse {
    let counts = state.dashboard.subscriptions().counts().await;
    Json(json!({ "subscriptions": counts }))
}

/// Latest cached result, a not-found result until the first run lands.
async fn get_endpoint_result(state: AppState, name: String) -> Response {
    let result = state
        .dashboard
        .result(&name)
        .await
        .unwrap_or_else(EndpointResult::not_found);
    (
        StatusCode::from(result.status),
        Json(result.to_message(&name)),
    )
        .into_response()
}
