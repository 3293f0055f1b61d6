use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use serde_json::{json, Value};

use dashboard_agent::cli::{self, Cli};
use dashboard_agent::helpers::time::{expires_in, is_expired};
use dashboard_agent::{
    Dashboard, Endpoint, EndpointContext, Token, TokenFactory, TokenFields, WidgetFactory,
    WidgetFields,
};

static DEMO_TOKEN: &str = "demo";
static EXPIRES_AT: &str = "expires_at";
const DEMO_TOKEN_TTL_SECONDS: i64 = 3600;
const DEMO_TOKEN_MARGIN_SECONDS: i64 = 60;

/// Self-issued credential that is renewed an hour at a time.
struct DemoToken;

#[async_trait]
impl TokenFactory for DemoToken {
    async fn create_from_cli(&self) -> Result<TokenFields> {
        let secret = std::env::var("DEMO_SECRET").unwrap_or_else(|_| "demo-secret".to_owned());
        Ok(fields(json!({ "secret": secret, "expires_at": expires_in(DEMO_TOKEN_TTL_SECONDS) })))
    }

    fn has_expired(&self, token: &Token) -> bool {
        token
            .get_i64(EXPIRES_AT)
            .map_or(true, |expires_at| is_expired(expires_at, DEMO_TOKEN_MARGIN_SECONDS))
    }

    async fn refresh_token(&self, token: &Token) -> Result<Option<TokenFields>> {
        let mut renewed = token.fields.clone();
        renewed.insert(EXPIRES_AT.to_owned(), json!(expires_in(DEMO_TOKEN_TTL_SECONDS)));
        Ok(Some(renewed))
    }
}

struct ClockWidget;

#[async_trait]
impl WidgetFactory for ClockWidget {
    async fn create_from_cli(&self) -> Result<WidgetFields> {
        Ok(fields(json!({ "timezone": "UTC" })))
    }

    fn required_endpoints(&self) -> Vec<String> {
        vec!["clock".to_owned()]
    }
}

fn fields(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Parse arguments
    // -------------------------------

    let args = Cli::parse();

    // -------------------------------
    // 2. Register factories and endpoints
    // -------------------------------

    let builder = Dashboard::builder()
        .token_factory(DEMO_TOKEN, DemoToken)
        .widget_factory("clock", ClockWidget)
        .endpoint(Endpoint::new("test/endpoint", "10s", |_ctx: EndpointContext| async {
            Ok(json!({ "msg": "Hello, World!" }))
        }))
        .endpoint(Endpoint::new("clock", "1s", |_ctx: EndpointContext| async {
            Ok(json!({ "now": Utc::now().to_rfc3339() }))
        }))
        .endpoint(
            Endpoint::new("demo/session", "1m", |ctx: EndpointContext| async move {
                let token = ctx.token(DEMO_TOKEN)?;
                Ok::<Value, anyhow::Error>(json!({ "expires_at": token.get_i64(EXPIRES_AT) }))
            })
            .with_required_tokens([DEMO_TOKEN]),
        );

    // -------------------------------
    // 3. Run the command
    // -------------------------------

    cli::run(builder, args, &mut std::io::stdout()).await
}
