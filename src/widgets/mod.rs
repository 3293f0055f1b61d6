//! Configured widget instances, the zones that order them, and widget factories.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::{Checker, ValidationError};

pub type WidgetFields = Map<String, Value>;

/// A configured unit of dashboard content. `id` is unique within its zone only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: WidgetFields,
}

impl Widget {
    pub fn new(widget_type: impl Into<String>, id: impl Into<String>, mut fields: WidgetFields) -> Self {
        fields.remove("type");
        fields.remove("id");
        Self {
            widget_type: widget_type.into(),
            id: Some(id.into()),
            fields,
        }
    }

    /// `type:id` label used in listings.
    pub fn label(&self) -> String {
        format!("{}:{}", self.widget_type, self.id.as_deref().unwrap_or("-"))
    }
}

/// A named, ordered sequence of widgets. Order is display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub name: String,
    pub widgets: Vec<Widget>,
}

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            widgets: Vec::new(),
        }
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.widgets.iter().any(|w| w.id.as_deref() == Some(id))
    }
}

/// Capability bound to one widget type.
///
/// The declared requirements only feed the pre-flight report, nothing
/// enforces them while endpoints run.
#[async_trait]
pub trait WidgetFactory: Send + Sync {
    async fn create_from_cli(&self) -> anyhow::Result<WidgetFields>;

    fn required_endpoints(&self) -> Vec<String> {
        Vec::new()
    }

    fn required_tokens(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Registration-time check of a widget factory's declarations.
pub fn validate_widget_factory(name: &str, factory: &dyn WidgetFactory) -> Result<(), ValidationError> {
    let mut checker = Checker::new(Some(name));
    checker.string("", name);
    checker.strings("requiredEndpoints", &factory.required_endpoints());
    checker.strings("requiredTokens", &factory.required_tokens());
    checker.finish()
}
