//! Settings validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Checks server address, persistence, timeouts, CORS origins, metrics and logging

use http::HeaderValue;
use tracing::{error, info};

use crate::config::settings::{ServiceConfig, SettingsConfig};

static LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.server.host.trim().is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!(
            "settings.server.port '{}' must be an integer in range 0-65535",
            settings.server.port
        ));
    }

    // persistence
    let persistence = &settings.persistence;
    if persistence.path.trim().is_empty() {
        errors.push("settings.persistence.path must not be empty".to_string());
    }
    if persistence.folder.trim().is_empty() {
        errors.push("settings.persistence.folder must not be empty".to_string());
    } else if persistence.folder.contains('/') || persistence.folder.contains('\\') {
        errors.push(format!(
            "settings.persistence.folder '{}' must be a single directory name",
            persistence.folder
        ));
    }
    if persistence.interval_ms == 0 {
        errors.push("settings.persistence.interval_ms must be > 0".to_string());
    }

    // timeouts
    if settings.timeouts.handler_ms == Some(0) {
        errors.push("settings.timeouts.handler_ms must be > 0 or omitted".to_string());
    }
    if settings.timeouts.refresh_ms == Some(0) {
        errors.push("settings.timeouts.refresh_ms must be > 0 or omitted".to_string());
    }

    // cors origins end up in a response header
    for (i, host) in settings.cors_hosts.iter().enumerate() {
        if host.trim().is_empty() || HeaderValue::from_str(host).is_err() {
            errors.push(format!(
                "settings.cors_hosts[{}] '{}' is not a valid origin",
                i, host
            ));
        }
    }

    // metrics endpoint start with '/'
    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    // logging level
    if let Some(logging) = &settings.logging {
        if !LOG_LEVELS.contains(&logging.level.to_lowercase().as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' invalid; allowed: {:?}",
                logging.level, LOG_LEVELS
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LoggingConfig;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_service_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn every_problem_is_reported() {
        let mut cfg = ServiceConfig::default();
        cfg.settings.server.port = "http".into();
        cfg.settings.persistence.interval_ms = 0;
        cfg.settings.timeouts.refresh_ms = Some(0);
        cfg.settings.metrics.path = "metrics".into();
        cfg.settings.cors_hosts = vec!["http://localhost:5173".into(), "bad\norigin".into()];
        cfg.settings.logging = Some(LoggingConfig {
            level: "loud".into(),
            ..LoggingConfig::default()
        });

        let errors = validate_service_config(&cfg).unwrap_err();
        assert_eq!(errors.len(), 6, "{:#?}", errors);
        assert!(errors.iter().any(|e| e.contains("settings.cors_hosts[1]")));
    }
}
