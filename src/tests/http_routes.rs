// HTTP surface served by the dashboard:
//  - /zones, /endpoints and /subs reflect the runtime state
//  - an endpoint route answers 404 until its first run, then the cached result
//  - /metrics exposes the run counters when enabled

#[cfg(test)]
mod test {

use http::StatusCode;
use serde_json::Value;

use crate::config::settings::SettingsConfig;
use crate::endpoints::{Endpoint, EndpointContext};
use crate::observability::metrics::Metrics;
use crate::runtime::Dashboard;
use crate::server::server;
use crate::tests::common::{build_reqwest_client, json, spawn_axum};

fn dashboard() -> Dashboard {
    Dashboard::builder()
        .endpoint(Endpoint::new("/test/endpoint/", "10m", |_ctx: EndpointContext| async {
            Ok(json!("hello_world"))
        }))
        .metrics(Metrics::new().unwrap())
        .build()
        .unwrap()
}

fn settings() -> SettingsConfig {
    let mut settings = SettingsConfig::default();
    settings.metrics.is_enabled = true;
    settings
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn builtin_routes_reflect_runtime_state() {
    let dashboard = dashboard();
    dashboard.store().add_zone("main").await.unwrap();
    let (handle, addr) = spawn_axum(server::router(dashboard.clone(), &settings()).unwrap()).await;
    let client = build_reqwest_client();

    let zones: Value = client.get(format!("http://{}/zones", addr)).send().await.unwrap().json().await.unwrap();
    assert_eq!(zones, json!({"zones": [{"name": "main", "widgets": []}]}));

    let endpoints: Value = client.get(format!("http://{}/endpoints", addr)).send().await.unwrap().json().await.unwrap();
    assert_eq!(endpoints, json!({"endpoints": [{"name": "/test/endpoint/", "interval": "10m"}]}));

    let subs: Value = client.get(format!("http://{}/subs", addr)).send().await.unwrap().json().await.unwrap();
    assert_eq!(subs, json!({"subscriptions": {}}));

    handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn endpoint_route_serves_the_cached_result() {
    let dashboard = dashboard();
    let (handle, addr) = spawn_axum(server::router(dashboard.clone(), &settings()).unwrap()).await;
    let client = build_reqwest_client();
    let url = format!("http://{}/test/endpoint", addr);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"type": "/test/endpoint/", "status": 404, "data": null}));

    dashboard.run_endpoint("/test/endpoint/").await.unwrap();

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"type": "/test/endpoint/", "status": 200, "data": "hello_world"}));

    handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn metrics_route_exposes_run_counters() {
    let dashboard = dashboard();
    dashboard.run_endpoint("/test/endpoint/").await.unwrap();
    let (handle, addr) = spawn_axum(server::router(dashboard.clone(), &settings()).unwrap()).await;
    let client = build_reqwest_client();

    let res = client.get(format!("http://{}/metrics", addr)).send().await.unwrap();
    assert!(res.status().is_success(), "unexpected status: {}", res.status());
    let body = res.text().await.unwrap();
    assert!(body.contains("dashboardagent_endpoint_runs_total"), "{}", body);
    assert!(body.contains(r#"endpoint="/test/endpoint/""#), "{}", body);

    handle.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn metrics_route_is_absent_when_disabled() {
    let (handle, addr) = spawn_axum(server::router(dashboard(), &SettingsConfig::default()).unwrap()).await;
    let client = build_reqwest_client();

    let res = client.get(format!("http://{}/metrics", addr)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    handle.abort();
}

}
