use std::collections::BTreeMap;
use std::sync::Arc;

use crate::tokens::{validate_token_factory, TokenFactory};
use crate::validation::{Checker, ValidationError};
use crate::widgets::{validate_widget_factory, WidgetFactory};

/// Factories supplied by the host, looked up by type string. Immutable once built.
#[derive(Clone, Default)]
pub struct Factories {
    widgets: BTreeMap<String, Arc<dyn WidgetFactory>>,
    tokens: BTreeMap<String, Arc<dyn TokenFactory>>,
}

impl Factories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_widget(mut self, widget_type: impl Into<String>, factory: Arc<dyn WidgetFactory>) -> Self {
        self.widgets.insert(widget_type.into(), factory);
        self
    }

    pub fn with_token(mut self, token_type: impl Into<String>, factory: Arc<dyn TokenFactory>) -> Self {
        self.tokens.insert(token_type.into(), factory);
        self
    }

    pub fn widget(&self, widget_type: &str) -> Option<Arc<dyn WidgetFactory>> {
        self.widgets.get(widget_type).cloned()
    }

    pub fn token(&self, token_type: &str) -> Option<Arc<dyn TokenFactory>> {
        self.tokens.get(token_type).cloned()
    }

    pub fn widgets(&self) -> impl Iterator<Item = (&String, &Arc<dyn WidgetFactory>)> {
        self.widgets.iter()
    }

    pub fn token_types(&self) -> impl Iterator<Item = &String> {
        self.tokens.keys()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut checker = Checker::new(None);
        for token_type in self.tokens.keys() {
            checker.merge(validate_token_factory(token_type));
        }
        for (widget_type, factory) in &self.widgets {
            checker.merge(validate_widget_factory(widget_type, factory.as_ref()));
        }
        checker.finish()
    }
}
