use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

use crate::config::settings::SettingsConfig;
use crate::observability;
use crate::observability::metrics::Metrics;
use crate::runtime::Dashboard;
use crate::server::routes;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Dashboard,
    pub metrics: Option<Arc<Metrics>>,
}

impl AppState {
    pub fn new(dashboard: Dashboard) -> Self {
        let metrics = dashboard.metrics().cloned();
        Self { dashboard, metrics }
    }
}

/// Built-in routes, one route per endpoint, the socket and optionally metrics.
pub fn router(dashboard: Dashboard, settings: &SettingsConfig) -> Result<Router> {
    let state = AppState::new(dashboard);

    let mut app = Router::new()
        .merge(routes::router(&state, &settings.metrics))
        .merge(observability::routes::router(&state, &settings.metrics))
        .with_state(state);

    if !settings.cors_hosts.is_empty() {
        app = app.layer(cors_layer(&settings.cors_hosts)?);
    }
    Ok(app)
}

fn cors_layer(hosts: &[String]) -> Result<CorsLayer> {
    let origins = hosts
        .iter()
        .map(|host| HeaderValue::from_str(host).with_context(|| format!("invalid CORS host '{}'", host)))
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET]))
}

/// Bind `settings.server` and serve until ctrl-c.
pub async fn start(dashboard: Dashboard, settings: &SettingsConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    serve(listener, dashboard, settings, shutdown_signal()).await
}

pub async fn serve<F>(listener: TcpListener, dashboard: Dashboard, settings: &SettingsConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics = dashboard.metrics().cloned();
    let app = router(dashboard, settings)?;

    info!(address = %listener.local_addr()?, "serving dashboard");
    if let Some(metrics) = &metrics {
        metrics.up.set(1);
    }
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;
    if let Some(metrics) = &metrics {
        metrics.up.set(0);
    }
    served.context("server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {}", e);
        return;
    }
    info!("shutdown signal received");
}
