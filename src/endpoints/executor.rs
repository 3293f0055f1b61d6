use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument, Span};

use crate::endpoints::{Endpoint, EndpointContext, EndpointResult};
use crate::observability::metrics::Metrics;
use crate::resilience::timeout::with_timeout;
use crate::store::ConfigStore;
use crate::tokens::refresh::RefreshToken;
use crate::tokens::{Token, TokenError, TokenFactory};

/// Runs after the first attempt, each one preceded by a forced refresh.
pub const MAX_REAUTH_RETRIES: usize = 1;

/// Turns one endpoint run into exactly one `EndpointResult`.
#[derive(Clone)]
pub struct EndpointExecutor {
    handler_timeout: Option<Duration>,
    span: Span,
    metrics: Option<Arc<Metrics>>,
}

impl Default for EndpointExecutor {
    fn default() -> Self {
        Self::new(None, Span::none(), None)
    }
}

impl EndpointExecutor {
    pub fn new(handler_timeout: Option<Duration>, span: Span, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            handler_timeout,
            span,
            metrics,
        }
    }

    pub async fn perform(
        &self,
        endpoint: &Endpoint,
        store: &ConfigStore,
        refresher: Option<&dyn RefreshToken>,
    ) -> EndpointResult {
        let span = info_span!(parent: &self.span, "endpoint", name = %endpoint.name());
        let start = Instant::now();

        let result = self.run(endpoint, store, refresher).instrument(span).await;

        if let Some(metrics) = &self.metrics {
            metrics
                .endpoint_runs
                .with_label_values(&[endpoint.name(), result.status.as_label()])
                .inc();
            metrics
                .endpoint_run_duration
                .with_label_values(&[endpoint.name()])
                .observe(start.elapsed().as_secs_f64());
        }
        result
    }

    async fn run(
        &self,
        endpoint: &Endpoint,
        store: &ConfigStore,
        refresher: Option<&dyn RefreshToken>,
    ) -> EndpointResult {
        for attempt in 0..=MAX_REAUTH_RETRIES {
            // the retry runs with refresh disabled, so a second reauth request ends the run
            let refresher = if attempt == 0 { refresher } else { None };

            if let Err(result) = self.prepare_tokens(endpoint, store, refresher).await {
                return result;
            }

            let ctx = EndpointContext {
                zones: store.zones().await,
                tokens: store.tokens().await,
            };
            let err = match with_timeout(self.handler_timeout, endpoint.handler().handle(ctx)).await {
                Ok(Ok(data)) => return EndpointResult::with_data(data),
                Ok(Err(err)) => err,
                Err(_) => {
                    warn!(timeout = ?self.handler_timeout, "endpoint handler timed out");
                    return EndpointResult::not_found();
                }
            };

            match err.downcast_ref::<TokenError>() {
                Some(TokenError::ReauthRequired(token_type)) => {
                    let Some(refresh) = refresher else {
                        debug!(token_type = %token_type, "reauthentication requested, refresh unavailable");
                        return EndpointResult::not_authenticated();
                    };
                    debug!(token_type = %token_type, attempt, "reauthentication requested, forcing refresh");
                    if let Err(err) = self.refresh(token_type, store, refresh, true).await {
                        return token_failure(&err);
                    }
                }
                Some(token_err) => return token_failure(token_err),
                None => {
                    warn!(error = %format_args!("{:#}", err), "endpoint handler failed");
                    return EndpointResult::not_found();
                }
            }
        }
        EndpointResult::not_authenticated()
    }

    /// Every required token must exist and have a factory. With a refresher,
    /// each one is brought up to date in declaration order.
    async fn prepare_tokens(
        &self,
        endpoint: &Endpoint,
        store: &ConfigStore,
        refresher: Option<&dyn RefreshToken>,
    ) -> Result<(), EndpointResult> {
        for token_type in endpoint.required_tokens() {
            let outcome = match refresher {
                Some(refresh) => self.refresh(token_type, store, refresh, false).await,
                None => lookup(token_type, store).await.map(|_| ()),
            };
            outcome.map_err(|err| token_failure(&err))?;
        }
        Ok(())
    }

    async fn refresh(
        &self,
        token_type: &str,
        store: &ConfigStore,
        refresh: &dyn RefreshToken,
        skip_expiry_check: bool,
    ) -> Result<(), TokenError> {
        let (token, factory) = lookup(token_type, store).await?;
        refresh.refresh(&token, factory, store, skip_expiry_check).await
    }
}

async fn lookup(token_type: &str, store: &ConfigStore) -> Result<(Token, Arc<dyn TokenFactory>), TokenError> {
    let token = store
        .token(token_type)
        .await
        .ok_or_else(|| TokenError::Missing(token_type.to_owned()))?;
    let factory = store
        .token_factory(token_type)
        .ok_or_else(|| TokenError::MissingFactory(token_type.to_owned()))?;
    Ok((token, factory))
}

fn token_failure(err: &TokenError) -> EndpointResult {
    match err {
        TokenError::ReauthRequired(_) | TokenError::Expired(_) => {
            warn!(token_type = err.token_type(), reason = err.as_label(), "credential unusable");
            EndpointResult::not_authenticated()
        }
        TokenError::Missing(_) | TokenError::MissingFactory(_) => {
            warn!(token_type = err.token_type(), reason = err.as_label(), "required token unavailable");
            EndpointResult::not_found()
        }
    }
}

/// Run `endpoint` once with no timeout, span or metrics.
pub async fn perform_endpoint(
    endpoint: &Endpoint,
    store: &ConfigStore,
    refresher: Option<&dyn RefreshToken>,
) -> EndpointResult {
    EndpointExecutor::default().perform(endpoint, store, refresher).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::EndpointStatus;
    use crate::store::Factories;
    use serde_json::{json, Value};

    fn store() -> ConfigStore {
        ConfigStore::new(Arc::new(Factories::new()))
    }

    #[tokio::test]
    async fn handler_value_becomes_data() {
        let endpoint = Endpoint::new("hello", "10m", |_ctx: EndpointContext| async {
            Ok(json!("hello_world"))
        });
        let result = perform_endpoint(&endpoint, &store(), None).await;
        assert_eq!(result, EndpointResult::with_data(json!("hello_world")));
    }

    #[tokio::test]
    async fn unclassified_error_is_not_found() {
        let endpoint = Endpoint::new("broken", "10m", |_ctx: EndpointContext| async {
            Err::<Value, anyhow::Error>(anyhow::anyhow!("upstream exploded"))
        });
        let result = perform_endpoint(&endpoint, &store(), None).await;
        assert_eq!(result.status, EndpointStatus::NotFound);
        assert_eq!(result.data, None);
    }

    #[tokio::test]
    async fn expired_error_from_handler_is_not_authenticated() {
        let endpoint = Endpoint::new("stale", "10m", |_ctx: EndpointContext| async {
            Err::<Value, anyhow::Error>(TokenError::Expired("github".into()).into())
        });
        let result = perform_endpoint(&endpoint, &store(), None).await;
        assert_eq!(result, EndpointResult::not_authenticated());
    }

    #[tokio::test]
    async fn missing_required_token_is_not_found() {
        let endpoint = Endpoint::new("repos", "10m", |_ctx: EndpointContext| async { Ok(Value::Null) })
            .with_required_tokens(["github"]);
        let result = perform_endpoint(&endpoint, &store(), None).await;
        assert_eq!(result, EndpointResult::not_found());
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let endpoint = Endpoint::new("slow", "10m", |_ctx: EndpointContext| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        });
        let executor = EndpointExecutor::new(Some(Duration::from_millis(50)), Span::none(), None);
        let result = executor.perform(&endpoint, &store(), None).await;
        assert_eq!(result, EndpointResult::not_found());
    }

    #[tokio::test]
    async fn runs_are_counted_by_status() {
        let metrics = Metrics::new().unwrap();
        let executor = EndpointExecutor::new(None, Span::none(), Some(metrics.clone()));
        let endpoint = Endpoint::new("hello", "10m", |_ctx: EndpointContext| async { Ok(json!(1)) });

        executor.perform(&endpoint, &store(), None).await;
        executor.perform(&endpoint, &store(), None).await;
        assert_eq!(metrics.endpoint_runs.with_label_values(&["hello", "200"]).get(), 2);
    }
}
