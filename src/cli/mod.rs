//! Command line front end shared by host binaries.

pub mod commands;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, info_span, Span};

use crate::observability::metrics::Metrics;
use crate::runtime::{Dashboard, DashboardBuilder};
use crate::server;
use crate::utils::config_loader;
use crate::utils::constants::DEFAULT_CONFIG_FILE;
use crate::utils::logging::{self, LogLevel};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, env = "CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,
    /// Directory holding the config folder, overrides `settings.persistence.path`.
    #[arg(long, env = "DASHBOARD_PATH")]
    pub path: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the endpoints and serve results over HTTP and WebSocket
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print tokens and zones
    Get,
    /// Report token state, optionally refreshing expired tokens
    Check {
        #[arg(long)]
        refresh: bool,
    },
    /// Add a zone, widget or token
    #[command(subcommand)]
    Create(CreateCommand),
}

#[derive(Debug, Subcommand)]
pub enum CreateCommand {
    Zone {
        name: String,
    },
    Widget {
        widget_type: String,
        zone: String,
        id: String,
    },
    Token {
        token_type: String,
    },
}

/// Load settings, set up logging, build the dashboard and run one command.
pub async fn run(builder: DashboardBuilder, cli: Cli, out: &mut (dyn Write + Send)) -> Result<()> {
    let mut service_config = config_loader::run(&cli.config).await?;
    logging::run(&service_config, cli.log_level)?;

    let mut options = service_config.settings.dashboard_options();
    if let Some(path) = &cli.path {
        options.path = path.clone();
    }

    let metrics = Metrics::new().context("failed to register metrics")?;
    let dashboard = builder
        .options(options)
        .metrics(metrics)
        .span(dashboard_span())
        .build()?;
    dashboard
        .load_config()
        .await
        .context("failed to load configuration")?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                service_config.settings.server.port = port.to_string();
            }
            serve(&dashboard, &service_config.settings).await
        }
        Command::Get => commands::print_config(&dashboard, out).await,
        Command::Check { refresh } => commands::check_tokens(&dashboard, refresh, out).await,
        Command::Create(CreateCommand::Zone { name }) => commands::create_zone(&dashboard, &name, out).await,
        Command::Create(CreateCommand::Widget { widget_type, zone, id }) => {
            commands::create_widget(&dashboard, &widget_type, &zone, &id, out).await
        }
        Command::Create(CreateCommand::Token { token_type }) => {
            commands::create_token(&dashboard, &token_type, out).await
        }
    }
}

/// Parent span of the runtime's events. Built only after the subscriber is installed.
fn dashboard_span() -> Span {
    info_span!("dashboard")
}

async fn serve(dashboard: &Dashboard, settings: &crate::config::settings::SettingsConfig) -> Result<()> {
    dashboard.preflight().await;
    dashboard.start().await;

    let served = server::server::start(dashboard.clone(), settings).await;
    info!("stopping dashboard");
    dashboard.shutdown().await?;
    served
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_widget() {
        let cli = Cli::try_parse_from(["dashboard-agent", "create", "widget", "clock", "main", "utc"]).unwrap();
        assert_eq!(cli.config, DEFAULT_CONFIG_FILE);
        match cli.command {
            Command::Create(CreateCommand::Widget { widget_type, zone, id }) => {
                assert_eq!((widget_type.as_str(), zone.as_str(), id.as_str()), ("clock", "main", "utc"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_global_flags() {
        let cli = Cli::try_parse_from([
            "dashboard-agent",
            "--log-level",
            "debug",
            "--path",
            "/tmp/dash",
            "serve",
            "--port",
            "8080",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::DEBUG));
        assert_eq!(cli.path, Some(PathBuf::from("/tmp/dash")));
        assert!(matches!(cli.command, Command::Serve { port: Some(8080) }));
    }

    #[test]
    fn dashboard_span_is_live_once_logging_runs() {
        logging::run(&crate::config::ServiceConfig::default(), Some(LogLevel::INFO)).unwrap();
        assert!(!dashboard_span().is_disabled());
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(Cli::try_parse_from(["dashboard-agent", "destroy"]).is_err());
    }
}
