//! Endpoint definitions: a named handler run on an interval, and the typed
//! result of one run.

pub mod executor;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::tokens::{Token, TokenError};
use crate::utils::constants::RESERVED_ROUTES;
use crate::validation::{parse_interval, Checker, ValidationError};
use crate::widgets::Zone;

pub use executor::{perform_endpoint, EndpointExecutor, MAX_REAUTH_RETRIES};

/// Snapshot of the configuration a handler runs against.
#[derive(Debug, Clone, Default)]
pub struct EndpointContext {
    pub zones: Vec<Zone>,
    pub tokens: BTreeMap<String, Token>,
}

impl EndpointContext {
    pub fn token(&self, token_type: &str) -> Result<&Token, TokenError> {
        self.tokens
            .get(token_type)
            .ok_or_else(|| TokenError::Missing(token_type.to_owned()))
    }
}

/// Data-fetch logic of an endpoint.
///
/// Returning `TokenError::ReauthRequired` asks the engine to force-refresh
/// that token and run the handler once more.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn handle(&self, ctx: EndpointContext) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> EndpointHandler for F
where
    F: Fn(EndpointContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, ctx: EndpointContext) -> anyhow::Result<Value> {
        (self)(ctx).await
    }
}

/// A named, interval-scheduled handler. Immutable once built.
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    interval: String,
    handler: Arc<dyn EndpointHandler>,
    required_tokens: Vec<String>,
}

impl Endpoint {
    /// Endpoint backed by an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, interval: impl Into<String>, handler: F) -> Self
    where
        F: Fn(EndpointContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::with_handler(name, interval, handler)
    }

    pub fn with_handler<H>(name: impl Into<String>, interval: impl Into<String>, handler: H) -> Self
    where
        H: EndpointHandler + 'static,
    {
        Self {
            name: name.into(),
            interval: interval.into(),
            handler: Arc::new(handler),
            required_tokens: Vec::new(),
        }
    }

    pub fn with_required_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    /// Parsed interval, `None` when it is not a positive duration.
    pub fn period(&self) -> Option<Duration> {
        parse_interval(&self.interval)
    }

    pub fn required_tokens(&self) -> &[String] {
        &self.required_tokens
    }

    pub fn handler(&self) -> &Arc<dyn EndpointHandler> {
        &self.handler
    }

    pub fn route(&self) -> String {
        sanitize_route(&self.name)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("required_tokens", &self.required_tokens)
            .finish_non_exhaustive()
    }
}

/// `"/weather/today/"` and `" weather/today"` both serve at `/weather/today`.
pub fn sanitize_route(name: &str) -> String {
    let trimmed = name.strip_prefix('/').unwrap_or(name);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    format!("/{}", compact)
}

pub fn validate_endpoint(endpoint: &Endpoint) -> Result<(), ValidationError> {
    let label = if endpoint.name.trim().is_empty() {
        "endpoint"
    } else {
        endpoint.name.as_str()
    };
    let mut checker = Checker::new(Some(label));
    checker.string("name", &endpoint.name);
    checker.interval("interval", &endpoint.interval);
    checker.strings("requiredTokens", &endpoint.required_tokens);
    checker.finish()
}

/// Checks each endpoint, then that names and routes are unique and no route
/// shadows one of the built-in routes.
pub fn validate_endpoints(endpoints: &[Endpoint]) -> Result<(), ValidationError> {
    let mut checker = Checker::new(None);
    let mut names: HashMap<&str, usize> = HashMap::new();
    let mut routes: HashMap<String, &str> = HashMap::new();

    for (i, endpoint) in endpoints.iter().enumerate() {
        checker.merge(validate_endpoint(endpoint));

        if names.insert(endpoint.name(), i).is_some() {
            checker.push(
                &format!("endpoints[{}].name", i),
                "unique endpoint name",
                format!("duplicate '{}'", endpoint.name()),
            );
            continue;
        }

        let route = endpoint.route();
        if route.contains(['{', '}', '*']) {
            checker.push(
                &format!("endpoints[{}].name", i),
                "a route without '{', '}' or '*'",
                format!("'{}'", route),
            );
        } else if RESERVED_ROUTES.contains(&route.as_str()) {
            checker.push(
                &format!("endpoints[{}].name", i),
                "a route not used by the server",
                format!("'{}'", route),
            );
        } else if let Some(other) = routes.insert(route.clone(), endpoint.name()) {
            checker.push(
                &format!("endpoints[{}].name", i),
                "unique route",
                format!("'{}' shared with '{}'", route, other),
            );
        }
    }
    checker.finish()
}

/// Status of one endpoint run, serialized as its HTTP code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointStatus {
    Ok,
    NotAuthenticated,
    NotFound,
}

impl EndpointStatus {
    pub fn code(self) -> u16 {
        match self {
            EndpointStatus::Ok => 200,
            EndpointStatus::NotAuthenticated => 401,
            EndpointStatus::NotFound => 404,
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            EndpointStatus::Ok => "200",
            EndpointStatus::NotAuthenticated => "401",
            EndpointStatus::NotFound => "404",
        }
    }
}

impl Serialize for EndpointStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl From<EndpointStatus> for http::StatusCode {
    fn from(status: EndpointStatus) -> Self {
        match status {
            EndpointStatus::Ok => http::StatusCode::OK,
            EndpointStatus::NotAuthenticated => http::StatusCode::UNAUTHORIZED,
            EndpointStatus::NotFound => http::StatusCode::NOT_FOUND,
        }
    }
}

/// Outcome of one run. Replaced wholesale by the next run.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResult {
    pub data: Option<Value>,
    pub status: EndpointStatus,
}

impl EndpointResult {
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            status: EndpointStatus::Ok,
        }
    }

    pub fn not_authenticated() -> Self {
        Self {
            data: None,
            status: EndpointStatus::NotAuthenticated,
        }
    }

    pub fn not_found() -> Self {
        Self {
            data: None,
            status: EndpointStatus::NotFound,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == EndpointStatus::Ok
    }

    /// Wire form pushed to subscribers and served over HTTP.
    pub fn to_message<'a>(&'a self, name: &'a str) -> EndpointMessage<'a> {
        EndpointMessage {
            endpoint: name,
            status: self.status,
            data: self.data.as_ref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EndpointMessage<'a> {
    #[serde(rename = "type")]
    pub endpoint: &'a str,
    pub status: EndpointStatus,
    pub data: Option<&'a Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hello() -> Endpoint {
        Endpoint::new("test/endpoint", "10m", |_ctx: EndpointContext| async {
            Ok(json!("hello_world"))
        })
    }

    #[test]
    fn routes_are_sanitized() {
        assert_eq!(sanitize_route("test/endpoint"), "/test/endpoint");
        assert_eq!(sanitize_route("/weather/today/"), "/weather/today");
        assert_eq!(sanitize_route("my endpoint"), "/myendpoint");
        assert_eq!(sanitize_route("//double//"), "//double/");
    }

    #[test]
    fn message_shape() {
        let result = EndpointResult::with_data(json!({"msg": "hi"}));
        let value = serde_json::to_value(result.to_message("clock")).unwrap();
        assert_eq!(value, json!({"type": "clock", "status": 200, "data": {"msg": "hi"}}));

        let value = serde_json::to_value(EndpointResult::not_authenticated().to_message("clock")).unwrap();
        assert_eq!(value, json!({"type": "clock", "status": 401, "data": null}));
    }

    #[test]
    fn endpoint_shape_is_validated() {
        assert!(validate_endpoint(&hello()).is_ok());
        assert_eq!(hello().period(), Some(Duration::from_secs(600)));

        let bad = Endpoint::new("weather", "soon", |_ctx: EndpointContext| async { Ok(Value::Null) })
            .with_required_tokens(["github", ""]);
        let err = validate_endpoint(&bad).unwrap_err();
        let paths: Vec<&str> = err.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["weather.interval", "weather.requiredTokens"]);
    }

    #[test]
    fn names_and_routes_are_unique() {
        let same_route = Endpoint::new("/test/endpoint/", "5s", |_ctx: EndpointContext| async {
            Ok(Value::Null)
        });
        let err = validate_endpoints(&[hello(), hello(), same_route]).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert!(err.errors[0].got.contains("duplicate 'test/endpoint'"));
        assert!(err.errors[1].got.contains("shared with 'test/endpoint'"));
    }

    #[test]
    fn builtin_routes_are_reserved() {
        let zones = Endpoint::new("zones", "5s", |_ctx: EndpointContext| async { Ok(Value::Null) });
        assert!(validate_endpoints(&[zones]).is_err());
    }

    #[test]
    fn route_patterns_are_rejected() {
        let wildcard = Endpoint::new("files/{name}", "5s", |_ctx: EndpointContext| async { Ok(Value::Null) });
        assert!(validate_endpoints(&[wildcard]).is_err());
    }

    #[test]
    fn context_reports_missing_tokens() {
        let ctx = EndpointContext::default();
        assert_eq!(ctx.token("github").unwrap_err(), TokenError::Missing("github".into()));
    }
}
