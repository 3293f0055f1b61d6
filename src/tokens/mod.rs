//! Stored credentials and the factories that know how to mint and renew them.

pub mod refresh;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::validation::{Checker, ValidationError};

/// Credential-specific payload, opaque to the runtime.
pub type TokenFields = Map<String, Value>;

/// Key of the stable type field inside a persisted token record.
pub const TYPE_FIELD: &str = "type";

/// A stored credential. `token_type` is the key it is stored and looked up under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(flatten)]
    pub fields: TokenFields,
}

impl Token {
    /// Compose a token from a fresh payload, the type always wins over any
    /// `type` key inside the payload.
    pub fn new(token_type: impl Into<String>, mut fields: TokenFields) -> Self {
        fields.remove(TYPE_FIELD);
        Self {
            token_type: token_type.into(),
            fields,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }
}

/// Capability bound to one token type, supplied by the host at startup.
#[async_trait]
pub trait TokenFactory: Send + Sync {
    /// Mint a brand new credential, typically by prompting the operator.
    async fn create_from_cli(&self) -> anyhow::Result<TokenFields>;

    fn has_expired(&self, token: &Token) -> bool;

    /// Renew `token`. `Ok(None)` means the credential can no longer be renewed.
    async fn refresh_token(&self, token: &Token) -> anyhow::Result<Option<TokenFields>>;
}

/// Credential failures. Each variant names the token type it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Raised by a handler whose credentials were rejected upstream.
    #[error("reauthentication required: '{0}'")]
    ReauthRequired(String),
    /// A refresh was attempted and failed for good.
    #[error("{0} token has expired")]
    Expired(String),
    #[error("missing token: '{0}'")]
    Missing(String),
    #[error("missing token factory: '{0}'")]
    MissingFactory(String),
}

impl TokenError {
    pub fn token_type(&self) -> &str {
        match self {
            TokenError::ReauthRequired(t)
            | TokenError::Expired(t)
            | TokenError::Missing(t)
            | TokenError::MissingFactory(t) => t,
        }
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TokenError::ReauthRequired(_) => "reauth_required",
            TokenError::Expired(_) => "expired",
            TokenError::Missing(_) => "missing_token",
            TokenError::MissingFactory(_) => "missing_factory",
        }
    }
}

/// Registration-time check of a token factory entry.
pub fn validate_token_factory(name: &str) -> Result<(), ValidationError> {
    let mut checker = Checker::new(None);
    checker.string("tokens", name);
    if name.chars().any(char::is_whitespace) {
        checker.push("tokens", "token type without whitespace", format!("'{}'", name));
    }
    checker.finish()
}
