//! # Dashboard Agent Library
//!
//! Runtime for pluggable dashboards: host applications register widget and
//! token factories plus interval-scheduled endpoints, the runtime keeps
//! credentials fresh, caches endpoint results and streams them to
//! subscribed clients.
//!
//! Modules:
//! - `endpoints`: endpoint definitions and the execution engine
//! - `tokens`: credentials, token factories and the refresh protocol
//! - `widgets`: widgets, zones and widget factories
//! - `store`: the persisted zones and tokens documents
//! - `runtime`: scheduling, result cache and subscriptions
//! - `server`: HTTP and WebSocket transport
//! - `config`: service settings

pub mod cli;
pub mod config;
pub mod endpoints;
pub mod helpers;
pub mod observability;
pub mod resilience;
pub mod runtime;
pub mod server;
pub mod store;
pub mod tokens;
pub mod utils;
pub mod validation;
pub mod widgets;

#[cfg(test)]
mod tests;

pub use crate::config::ServiceConfig;
pub use crate::endpoints::{Endpoint, EndpointContext, EndpointResult, EndpointStatus};
pub use crate::runtime::{Dashboard, DashboardBuilder, DashboardOptions};
pub use crate::tokens::{Token, TokenError, TokenFactory, TokenFields};
pub use crate::widgets::{Widget, WidgetFactory, WidgetFields, Zone};
