//! Runtime orchestrator: owns the endpoints, their timers, the result cache,
//! subscriber fan-out and the dirty-config persistence timer.
//!
//! Every endpoint has its own timer task. A run that is still in flight when
//! the next tick fires makes that tick a no-op, so one endpoint never runs
//! twice at the same time. Different endpoints interleave freely.

pub mod subscriptions;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn, Span};

use crate::endpoints::{validate_endpoints, Endpoint, EndpointExecutor, EndpointResult};
use crate::observability::metrics::{Metrics, ERROR_MSG, OK_MSG};
use crate::store::{ConfigError, ConfigStore, Factories};
use crate::tokens::refresh::TokenRefresher;
use crate::tokens::TokenFactory;
use crate::utils::constants::{
    DEFAULT_CONFIG_FOLDER, DEFAULT_HANDLER_TIMEOUT_MS, DEFAULT_PERSIST_INTERVAL_MS,
    DEFAULT_REFRESH_TIMEOUT_MS,
};
use crate::validation::{Checker, ValidationError};
use crate::widgets::WidgetFactory;

pub use subscriptions::{ClientMessage, SocketId, Subscriber, SubscriptionChange, SubscriptionRegistry};

/// Where the configuration lives and how long work may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardOptions {
    /// Directory holding the config folder.
    pub path: PathBuf,
    pub folder: String,
    pub persist_interval: Duration,
    pub handler_timeout: Option<Duration>,
    pub refresh_timeout: Option<Duration>,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            folder: DEFAULT_CONFIG_FOLDER.to_owned(),
            persist_interval: Duration::from_millis(DEFAULT_PERSIST_INTERVAL_MS),
            handler_timeout: Some(Duration::from_millis(DEFAULT_HANDLER_TIMEOUT_MS)),
            refresh_timeout: Some(Duration::from_millis(DEFAULT_REFRESH_TIMEOUT_MS)),
        }
    }
}

/// Collects what the host application supplies, validated on `build`.
pub struct DashboardBuilder {
    factories: Factories,
    endpoints: Vec<Endpoint>,
    options: DashboardOptions,
    span: Span,
    metrics: Option<Arc<Metrics>>,
}

impl Default for DashboardBuilder {
    fn default() -> Self {
        Self {
            factories: Factories::new(),
            endpoints: Vec::new(),
            options: DashboardOptions::default(),
            span: Span::none(),
            metrics: None,
        }
    }
}

impl DashboardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn widget_factory<F>(mut self, widget_type: impl Into<String>, factory: F) -> Self
    where
        F: WidgetFactory + 'static,
    {
        self.factories = self.factories.with_widget(widget_type, Arc::new(factory));
        self
    }

    pub fn token_factory<F>(mut self, token_type: impl Into<String>, factory: F) -> Self
    where
        F: TokenFactory + 'static,
    {
        self.factories = self.factories.with_token(token_type, Arc::new(factory));
        self
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn options(mut self, options: DashboardOptions) -> Self {
        self.options = options;
        self
    }

    /// Parent span of every event the dashboard records.
    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Dashboard, ValidationError> {
        let mut checker = Checker::new(None);
        checker.merge(self.factories.validate());
        checker.merge(validate_endpoints(&self.endpoints));
        checker.finish()?;

        let factories = Arc::new(self.factories);
        let store = ConfigStore::with_documents(
            self.options.folder.clone(),
            factories,
            Vec::new(),
            Default::default(),
        );
        let subscriptions = SubscriptionRegistry::new(
            self.endpoints.iter().map(|e| e.name().to_owned()),
            self.metrics.clone(),
        );

        Ok(Dashboard {
            inner: Arc::new(Inner {
                executor: EndpointExecutor::new(
                    self.options.handler_timeout,
                    self.span.clone(),
                    self.metrics.clone(),
                ),
                refresher: TokenRefresher::new(self.options.refresh_timeout, self.metrics.clone()),
                endpoints: self
                    .endpoints
                    .into_iter()
                    .map(|endpoint| Scheduled {
                        endpoint,
                        running: AtomicBool::new(false),
                    })
                    .collect(),
                store: Arc::new(store),
                results: RwLock::new(HashMap::new()),
                subscriptions,
                options: self.options,
                span: self.span,
                metrics: self.metrics,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

struct Scheduled {
    endpoint: Endpoint,
    running: AtomicBool,
}

/// Clears the in-flight flag however the run ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    endpoints: Vec<Scheduled>,
    store: Arc<ConfigStore>,
    executor: EndpointExecutor,
    refresher: TokenRefresher,
    results: RwLock<HashMap<String, EndpointResult>>,
    subscriptions: SubscriptionRegistry,
    options: DashboardOptions,
    span: Span,
    metrics: Option<Arc<Metrics>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheap to clone, all clones drive the same runtime.
#[derive(Clone)]
pub struct Dashboard {
    inner: Arc<Inner>,
}

impl Dashboard {
    pub fn builder() -> DashboardBuilder {
        DashboardBuilder::new()
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.inner.store
    }

    pub fn options(&self) -> &DashboardOptions {
        &self.inner.options
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.inner.metrics.as_ref()
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.inner.refresher
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Endpoint> {
        self.inner.endpoints.iter().map(|s| &s.endpoint)
    }

    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints().find(|e| e.name() == name)
    }

    pub fn endpoint_for_route(&self, route: &str) -> Option<&Endpoint> {
        self.endpoints().find(|e| e.route() == route)
    }

    /// Replace the in-memory documents with the persisted ones.
    pub async fn load_config(&self) -> Result<(), ConfigError> {
        self.inner.store.reload(&self.inner.options.path).await
    }

    /// Latest cached result of `name`, `None` if it never ran.
    pub async fn result(&self, name: &str) -> Option<EndpointResult> {
        self.inner.results.read().await.get(name).cloned()
    }

    /// Run `name` once, cache the result and push it to its subscribers.
    /// `None` when the endpoint is unknown or a run is already in flight.
    pub async fn run_endpoint(&self, name: &str) -> Option<EndpointResult> {
        let scheduled = self.inner.endpoints.iter().find(|s| s.endpoint.name() == name)?;
        if scheduled.running.swap(true, Ordering::SeqCst) {
            debug!(parent: &self.inner.span, endpoint = name, "previous run in flight, skipping");
            if let Some(metrics) = &self.inner.metrics {
                metrics.endpoint_runs_skipped.with_label_values(&[name]).inc();
            }
            return None;
        }
        let _running = RunningGuard(&scheduled.running);

        let result = self
            .inner
            .executor
            .perform(&scheduled.endpoint, &self.inner.store, Some(&self.inner.refresher))
            .await;

        self.inner
            .results
            .write()
            .await
            .insert(name.to_owned(), result.clone());

        match serde_json::to_string(&result.to_message(name)) {
            Ok(message) => {
                let delivered = self.inner.subscriptions.publish(name, &message).await;
                debug!(parent: &self.inner.span, endpoint = name, status = result.status.code(), delivered, "endpoint result published");
            }
            Err(err) => {
                error!(parent: &self.inner.span, endpoint = name, error = %err, "failed to serialize endpoint result");
            }
        }
        Some(result)
    }

    /// Save when dirty. A failed save is logged and leaves the flag set for the next tick.
    pub async fn persist(&self) -> Result<bool, ConfigError> {
        let outcome = self.inner.store.persist_if_dirty(&self.inner.options.path).await;
        let label = match &outcome {
            Ok(false) => None,
            Ok(true) => Some(OK_MSG),
            Err(err) => {
                error!(parent: &self.inner.span, error = %err, "failed to persist configuration");
                Some(ERROR_MSG)
            }
        };
        if let (Some(label), Some(metrics)) = (label, &self.inner.metrics) {
            metrics.config_saves.with_label_values(&[label]).inc();
        }
        outcome
    }

    /// Cross-checks of zones, tokens and factory declarations. Problems are
    /// logged and returned, never fatal.
    pub async fn preflight(&self) -> Vec<String> {
        let store = &self.inner.store;
        let factories = store.factories();
        let zones = store.zones().await;
        let tokens = store.tokens().await;
        let mut problems = Vec::new();

        for zone in &zones {
            for widget in &zone.widgets {
                if factories.widget(&widget.widget_type).is_none() {
                    problems.push(format!(
                        "zone '{}': no widget factory for '{}'",
                        zone.name,
                        widget.label()
                    ));
                }
            }
        }

        let mut required_tokens = BTreeSet::new();
        for (widget_type, factory) in factories.widgets() {
            for endpoint in factory.required_endpoints() {
                if self.endpoint(&endpoint).is_none() {
                    problems.push(format!(
                        "widget '{}' requires unknown endpoint '{}'",
                        widget_type, endpoint
                    ));
                }
            }
            required_tokens.extend(factory.required_tokens());
        }
        for endpoint in self.endpoints() {
            required_tokens.extend(endpoint.required_tokens().iter().cloned());
        }

        for token_type in &required_tokens {
            if !tokens.contains_key(token_type) {
                problems.push(format!("required token '{}' is not configured", token_type));
            }
            if factories.token(token_type).is_none() {
                problems.push(format!("required token '{}' has no token factory", token_type));
            }
        }
        for token_type in tokens.keys() {
            if factories.token(token_type).is_none() && !required_tokens.contains(token_type) {
                problems.push(format!("stored token '{}' has no token factory", token_type));
            }
        }

        for problem in &problems {
            warn!(parent: &self.inner.span, "{}", problem);
        }
        problems
    }

    /// Run every endpoint once, then start the per-endpoint timers and the
    /// persistence timer. Returns after the first round has been cached.
    pub async fn start(&self) {
        info!(
            parent: &self.inner.span,
            endpoints = self.inner.endpoints.len(),
            "starting dashboard"
        );
        join_all(self.endpoints().map(|e| self.run_endpoint(e.name()))).await;

        let mut tasks = Vec::with_capacity(self.inner.endpoints.len() + 1);
        for endpoint in self.endpoints() {
            let Some(period) = endpoint.period() else {
                continue;
            };
            tasks.push(spawn_timer(
                Arc::downgrade(&self.inner),
                period,
                endpoint.name().to_owned(),
            ));
        }
        tasks.push(spawn_persistence(
            Arc::downgrade(&self.inner),
            self.inner.options.persist_interval,
        ));

        self.lock_tasks().extend(tasks);
    }

    /// Stop every timer, then persist anything still dirty.
    pub async fn shutdown(&self) -> Result<(), ConfigError> {
        let tasks: Vec<JoinHandle<()>> = self.lock_tasks().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        info!(parent: &self.inner.span, stopped = tasks.len(), "dashboard stopped");
        self.persist().await.map(|_| ())
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_timer(inner: Weak<Inner>, period: Duration, name: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            Dashboard { inner }.run_endpoint(&name).await;
        }
    })
}

fn spawn_persistence(inner: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            // failures are logged and retried on the next tick
            let _ = Dashboard { inner }.persist().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{EndpointContext, EndpointStatus};
    use serde_json::{json, Value};

    #[test]
    fn invalid_endpoints_refuse_to_build() {
        let err = Dashboard::builder()
            .endpoint(Endpoint::new("clock", "whenever", |_ctx: EndpointContext| async {
                Ok(Value::Null)
            }))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.errors[0].path, "clock.interval");
    }

    #[tokio::test]
    async fn unknown_endpoint_does_not_run() {
        let dashboard = Dashboard::builder().build().unwrap();
        assert!(dashboard.run_endpoint("nope").await.is_none());
        assert!(dashboard.result("nope").await.is_none());
    }

    #[tokio::test]
    async fn run_replaces_the_cached_result() {
        let dashboard = Dashboard::builder()
            .endpoint(Endpoint::new("clock", "1h", |_ctx: EndpointContext| async {
                Ok(json!({"now": 1}))
            }))
            .build()
            .unwrap();

        let result = dashboard.run_endpoint("clock").await.unwrap();
        assert_eq!(result.status, EndpointStatus::Ok);
        assert_eq!(dashboard.result("clock").await, Some(result));
    }

    #[tokio::test]
    async fn shutdown_without_start_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let dashboard = Dashboard::builder()
            .options(DashboardOptions {
                path: dir.path().to_path_buf(),
                ..DashboardOptions::default()
            })
            .build()
            .unwrap();
        dashboard.shutdown().await.unwrap();
        assert!(!dir.path().join(DEFAULT_CONFIG_FOLDER).exists());
    }
}
