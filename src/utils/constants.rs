//! Shared constants and defaults

pub const DEFAULT_CONFIG_FILE: &str = "dashboard-agent.yaml";
pub const DEFAULT_CONFIG_FOLDER: &str = ".dashboard";
pub const DEFAULT_PERSIST_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_REFRESH_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: &str = "3000";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Routes owned by the runtime, endpoint routes must not shadow them.
pub const ROUTE_ZONES: &str = "/zones";
pub const ROUTE_ENDPOINTS: &str = "/endpoints";
pub const ROUTE_SUBSCRIPTIONS: &str = "/subs";
pub const ROUTE_SOCKET: &str = "/ws";
pub const RESERVED_ROUTES: [&str; 4] = [ROUTE_ZONES, ROUTE_ENDPOINTS, ROUTE_SUBSCRIPTIONS, ROUTE_SOCKET];
