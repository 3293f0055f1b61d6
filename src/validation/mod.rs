//! Structural checks for the shapes a host application hands to the runtime.
//!
//! Factories and endpoints are plain trait objects, so the compiler already
//! guarantees their method set. What is left to check at registration time
//! is the declared data: names, intervals and the lists of required tokens
//! and endpoints. Every problem is collected, never just the first one.

pub mod interval;

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

pub use interval::parse_interval;

/// One failed expectation at a dotted path such as `my/endpoint.interval`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub path: String,
    pub expected: String,
    pub got: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Expected '{}' to be {} but got {}",
            self.path, self.expected, self.got
        )
    }
}

/// Aggregated validation failure. Fatal at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Validation error: \n- {}", render(.errors))]
pub struct ValidationError {
    pub errors: Vec<SchemaError>,
}

fn render(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n- ")
}

/// Collects schema errors under an optional name prefix.
#[derive(Debug, Default)]
pub struct Checker {
    prefix: Option<String>,
    errors: Vec<SchemaError>,
}

impl Checker {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            prefix: name.map(str::to_owned),
            errors: Vec::new(),
        }
    }

    fn path(&self, field: &str) -> String {
        match &self.prefix {
            Some(prefix) if field.is_empty() => prefix.clone(),
            Some(prefix) => format!("{}.{}", prefix, field),
            None => field.to_owned(),
        }
    }

    pub fn push(&mut self, field: &str, expected: impl Into<String>, got: impl Into<String>) {
        let path = self.path(field);
        self.errors.push(SchemaError {
            path,
            expected: expected.into(),
            got: got.into(),
        });
    }

    /// Non-empty string.
    pub fn string(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, "string", "empty string");
        }
    }

    /// Positive duration in the `5s` / `10m` notation.
    pub fn interval(&mut self, field: &str, value: &str) {
        if parse_interval(value).is_none() {
            self.push(field, "string (ms formatted)", format!("'{}'", value));
        }
    }

    /// Every entry non-empty and listed once.
    pub fn strings(&mut self, field: &str, values: &[String]) {
        if values.iter().any(|v| v.trim().is_empty()) {
            self.push(field, "string[]", "any[]");
        }
        let mut seen = HashSet::new();
        for value in values {
            if !seen.insert(value.as_str()) {
                self.push(field, "unique string[]", format!("duplicate '{}'", value));
            }
        }
    }

    pub fn merge(&mut self, other: Result<(), ValidationError>) {
        if let Err(err) = other {
            self.errors.extend(err.errors);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors: self.errors })
        }
    }
}
