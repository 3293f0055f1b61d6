//! Token refresh with at-most-one in-flight renewal per token type.
//!
//! The first caller that finds a token expired becomes the leader: it starts
//! the factory call and registers it as a shared future. That future writes
//! the renewed token back to the store before it resolves, so every caller
//! joining it observes the stored outcome, whichever of them drives it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::observability::metrics::Metrics;
use crate::resilience::timeout::with_timeout;
use crate::store::{ConfigStore, TokenWriter};
use crate::tokens::{Token, TokenError, TokenFactory};

static REFRESHED_MSG: &str = "refreshed";
static JOINED_MSG: &str = "joined";
static FAILED_MSG: &str = "failed";

pub type RefreshOutcome = Result<Token, TokenError>;
pub type InflightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Role of a caller in a refresh of one token type.
pub enum Joined {
    Leader(InflightRefresh),
    Follower(InflightRefresh),
}

/// Pending renewals keyed by token type. An entry exists only while the
/// renewal for that type is outstanding.
#[derive(Default)]
pub struct RefreshRegistry {
    inflight: Mutex<HashMap<String, InflightRefresh>>,
}

impl RefreshRegistry {
    /// Join the pending renewal for `token_type`, or register the one built by `start`.
    pub fn join_or_start<F>(&self, token_type: &str, start: F) -> Joined
    where
        F: FnOnce() -> BoxFuture<'static, RefreshOutcome>,
    {
        let mut inflight = self.lock();
        if let Some(pending) = inflight.get(token_type) {
            return Joined::Follower(pending.clone());
        }
        let pending = start().shared();
        inflight.insert(token_type.to_owned(), pending.clone());
        Joined::Leader(pending)
    }

    pub fn is_pending(&self, token_type: &str) -> bool {
        self.lock().contains_key(token_type)
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn finish(&self, token_type: &str) {
        self.lock().remove(token_type);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, InflightRefresh>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the leader's entry however the leader exits, cancellation included.
struct InflightGuard<'a> {
    registry: &'a RefreshRegistry,
    token_type: &'a str,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.registry.finish(self.token_type);
    }
}

/// The refresh step the endpoint engine runs before and during a handler.
#[async_trait]
pub trait RefreshToken: Send + Sync {
    async fn refresh(
        &self,
        token: &Token,
        factory: Arc<dyn TokenFactory>,
        store: &ConfigStore,
        skip_expiry_check: bool,
    ) -> Result<(), TokenError>;
}

/// Default refresh protocol, optionally bounded by a timeout.
#[derive(Clone, Default)]
pub struct TokenRefresher {
    timeout: Option<Duration>,
    metrics: Option<Arc<Metrics>>,
}

impl TokenRefresher {
    pub fn new(timeout: Option<Duration>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { timeout, metrics }
    }

    fn start(
        &self,
        token: Token,
        factory: Arc<dyn TokenFactory>,
        writer: TokenWriter,
    ) -> BoxFuture<'static, RefreshOutcome> {
        let limit = self.timeout;
        let metrics = self.metrics.clone();
        async move {
            let token_type = token.token_type.clone();
            let outcome = match with_timeout(limit, factory.refresh_token(&token)).await {
                Ok(Ok(Some(fields))) => Ok(Token::new(token_type.clone(), fields)),
                Ok(Ok(None)) => {
                    debug!(token_type = %token_type, "factory could not renew token");
                    Err(TokenError::Expired(token_type.clone()))
                }
                Ok(Err(err)) => {
                    debug!(token_type = %token_type, error = %err, "factory refresh failed");
                    Err(TokenError::Expired(token_type.clone()))
                }
                Err(_) => {
                    debug!(token_type = %token_type, timeout = ?limit, "factory refresh timed out");
                    Err(TokenError::Expired(token_type.clone()))
                }
            };

            match &outcome {
                Ok(fresh) => {
                    writer.set_token(fresh.clone()).await;
                    info!(token_type = %token_type, "token refreshed");
                    record(&metrics, &token_type, REFRESHED_MSG);
                }
                Err(err) => {
                    warn!(token_type = %token_type, error = %err, "token refresh failed");
                    record(&metrics, &token_type, FAILED_MSG);
                }
            }
            outcome
        }
        .boxed()
    }
}

fn record(metrics: &Option<Arc<Metrics>>, token_type: &str, outcome: &str) {
    if let Some(metrics) = metrics {
        metrics
            .token_refreshes
            .with_label_values(&[token_type, outcome])
            .inc();
    }
}

#[async_trait]
impl RefreshToken for TokenRefresher {
    async fn refresh(
        &self,
        token: &Token,
        factory: Arc<dyn TokenFactory>,
        store: &ConfigStore,
        skip_expiry_check: bool,
    ) -> Result<(), TokenError> {
        if !skip_expiry_check && !factory.has_expired(token) {
            return Ok(());
        }

        let token_type = token.token_type.as_str();
        let joined = store.refreshes().join_or_start(token_type, || {
            self.start(token.clone(), factory, store.token_writer())
        });
        match joined {
            Joined::Follower(pending) => {
                debug!(token_type, "joining in-flight refresh");
                record(&self.metrics, token_type, JOINED_MSG);
                pending.await.map(|_| ())
            }
            Joined::Leader(pending) => {
                let _guard = InflightGuard {
                    registry: store.refreshes(),
                    token_type,
                };
                pending.await.map(|_| ())
            }
        }
    }
}

/// Run the default protocol without timeout or metrics.
pub async fn perform_token_refresh(
    token: &Token,
    factory: Arc<dyn TokenFactory>,
    store: &ConfigStore,
    skip_expiry_check: bool,
) -> Result<(), TokenError> {
    TokenRefresher::default()
        .refresh(token, factory, store, skip_expiry_check)
        .await
}
