use std::sync::Arc;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

pub static NAMESPACE: &str = "dashboardagent";

pub static OK_MSG: &str = "ok";
pub static ERROR_MSG: &str = "error";

/// Process metrics, owned by the dashboard and handed to whoever records them.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Endpoint engine
    pub endpoint_runs: IntCounterVec,
    pub endpoint_run_duration: HistogramVec,
    pub endpoint_runs_skipped: IntCounterVec,

    // Tokens
    pub token_refreshes: IntCounterVec,

    // Subscriptions
    pub subscribers: IntGaugeVec,

    // Config/runtime
    pub config_saves: IntCounterVec,
    pub up: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Arc<Self>> {
        let registry = Registry::new_custom(Some(NAMESPACE.to_owned()), None)?;

        let metrics = Self {
            // Endpoint engine
            endpoint_runs: IntCounterVec::new(
                Opts::new("endpoint_runs_total", "Endpoint runs by result status"),
                &["endpoint", "status"],
            )?,
            endpoint_run_duration: HistogramVec::new(
                HistogramOpts::new("endpoint_run_duration_seconds", "Endpoint run time")
                    .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
                &["endpoint"],
            )?,
            endpoint_runs_skipped: IntCounterVec::new(
                Opts::new("endpoint_runs_skipped_total", "Runs skipped while the previous one was in flight"),
                &["endpoint"],
            )?,

            // Tokens
            token_refreshes: IntCounterVec::new(
                Opts::new("token_refreshes_total", "Token refresh attempts by outcome"),
                &["token_type", "outcome"],
            )?,

            // Subscriptions
            subscribers: IntGaugeVec::new(
                Opts::new("subscribers", "Live subscriptions per endpoint"),
                &["endpoint"],
            )?,

            // Config/runtime
            config_saves: IntCounterVec::new(
                Opts::new("config_saves_total", "Configuration saves by outcome"),
                &["outcome"],
            )?,
            up: IntGauge::new("up", "1 if service is serving")?,

            registry,
        };

        let reg = &metrics.registry;
        reg.register(Box::new(metrics.endpoint_runs.clone()))?;
        reg.register(Box::new(metrics.endpoint_run_duration.clone()))?;
        reg.register(Box::new(metrics.endpoint_runs_skipped.clone()))?;
        reg.register(Box::new(metrics.token_refreshes.clone()))?;
        reg.register(Box::new(metrics.subscribers.clone()))?;
        reg.register(Box::new(metrics.config_saves.clone()))?;
        reg.register(Box::new(metrics.up.clone()))?;

        Ok(Arc::new(metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn metrics_live_under_the_namespace() {
        let metrics = Metrics::new().unwrap();
        metrics.endpoint_runs.with_label_values(&["clock", "200"]).inc();
        metrics.up.set(1);

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metrics.registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("dashboardagent_endpoint_runs_total{endpoint=\"clock\",status=\"200\"} 1"));
        assert!(text.contains("dashboardagent_up 1"));
    }

    #[test]
    fn each_instance_has_its_own_registry() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.config_saves.with_label_values(&[OK_MSG]).inc();
        assert_eq!(second.config_saves.with_label_values(&[OK_MSG]).get(), 0);
    }
}
