// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Notify;

use crate::store::{ConfigStore, Factories};
use crate::tokens::{Token, TokenFactory, TokenFields};
use crate::widgets::{WidgetFactory, WidgetFields};

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

pub fn fields(value: Value) -> TokenFields {
    value.as_object().cloned().expect("object literal")
}

/// Token the mock factory reports as expired.
pub fn stale_token(token_type: &str, secret: &str) -> Token {
    Token::new(token_type, fields(json!({"secret": secret, "stale": true})))
}

pub fn fresh_token(token_type: &str, secret: &str) -> Token {
    Token::new(token_type, fields(json!({"secret": secret})))
}

/// Store holding `token` with `factory` registered for its type.
pub fn store_with(token: Token, factory: MockTokenFactory) -> ConfigStore {
    let factories = Factories::new().with_token(token.token_type.clone(), Arc::new(factory));
    let mut tokens = BTreeMap::new();
    tokens.insert(token.token_type.clone(), token);
    ConfigStore::with_documents(".dashboard", Arc::new(factories), Vec::new(), tokens)
}

#[derive(Default)]
struct MockTokenState {
    refreshes: AtomicUsize,
    renewed: Mutex<Option<TokenFields>>,
    fail: AtomicBool,
    delay_ms: AtomicU64,
    gate: Mutex<Option<Arc<Notify>>>,
}

/// Token factory counting refresh calls. Clones share their counters.
/// A token carrying `"stale": true` is expired.
#[derive(Clone, Default)]
pub struct MockTokenFactory {
    state: Arc<MockTokenState>,
}

impl MockTokenFactory {
    /// Refresh succeeds with `value`.
    pub fn renewing(value: Value) -> Self {
        let factory = Self::default();
        *factory.state.renewed.lock().unwrap() = Some(fields(value));
        factory
    }

    /// Refresh resolves to nothing.
    pub fn exhausted() -> Self {
        Self::default()
    }

    /// Refresh raises.
    pub fn failing() -> Self {
        let factory = Self::default();
        factory.state.fail.store(true, Ordering::SeqCst);
        factory
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Refresh waits until `gate` is notified.
    pub fn with_gate(self, gate: Arc<Notify>) -> Self {
        *self.state.gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn refreshes(&self) -> usize {
        self.state.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenFactory for MockTokenFactory {
    async fn create_from_cli(&self) -> anyhow::Result<TokenFields> {
        Ok(fields(json!({"secret": "from-cli"})))
    }

    fn has_expired(&self, token: &Token) -> bool {
        token.get("stale") == Some(&Value::Bool(true))
    }

    async fn refresh_token(&self, _token: &Token) -> anyhow::Result<Option<TokenFields>> {
        self.state.refreshes.fetch_add(1, Ordering::SeqCst);
        let gate = self.state.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = self.state.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("upstream rejected the refresh"));
        }
        Ok(self.state.renewed.lock().unwrap().clone())
    }
}

/// Widget factory with fixed declarations.
#[derive(Clone, Default)]
pub struct StaticWidgetFactory {
    pub endpoints: Vec<String>,
    pub tokens: Vec<String>,
}

#[async_trait]
impl WidgetFactory for StaticWidgetFactory {
    async fn create_from_cli(&self) -> anyhow::Result<WidgetFields> {
        Ok(fields(json!({"timezone": "UTC"})))
    }

    fn required_endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    fn required_tokens(&self) -> Vec<String> {
        self.tokens.clone()
    }
}
