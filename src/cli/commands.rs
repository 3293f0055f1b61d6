use std::io::Write;

use anyhow::{anyhow, bail, Result};

use crate::runtime::Dashboard;
use crate::store::ConfigError;
use crate::tokens::refresh::RefreshToken;
use crate::tokens::Token;
use crate::widgets::Widget;

static OK_MSG: &str = "ok";
static EXPIRED_MSG: &str = "expired";
static NO_FACTORY_MSG: &str = "no token factory";

/// Tokens by type, then zones with their widgets as `type:id`.
pub async fn print_config(dashboard: &Dashboard, out: &mut (dyn Write + Send)) -> Result<()> {
    let store = dashboard.store();

    writeln!(out, "Tokens:")?;
    for token_type in store.tokens().await.keys() {
        writeln!(out, "  - {}", token_type)?;
    }

    writeln!(out, "Zones:")?;
    for zone in store.zones().await {
        let widgets: Vec<String> = zone.widgets.iter().map(Widget::label).collect();
        writeln!(out, "  - {}: [{}]", zone.name, widgets.join(", "))?;
    }
    Ok(())
}

/// One line per token. With `refresh`, expired tokens are renewed and saved.
pub async fn check_tokens(dashboard: &Dashboard, refresh: bool, out: &mut (dyn Write + Send)) -> Result<()> {
    let store = dashboard.store();
    let mut failed = Vec::new();

    for (token_type, token) in store.tokens().await {
        let Some(factory) = store.token_factory(&token_type) else {
            writeln!(out, "{}: {}", token_type, NO_FACTORY_MSG)?;
            continue;
        };
        if !factory.has_expired(&token) {
            writeln!(out, "{}: {}", token_type, OK_MSG)?;
            continue;
        }
        if !refresh {
            writeln!(out, "{}: {}", token_type, EXPIRED_MSG)?;
            continue;
        }

        match dashboard.refresher().refresh(&token, factory, store, true).await {
            Ok(()) => writeln!(out, "{}: refreshed", token_type)?,
            Err(err) => {
                writeln!(out, "{}: {}", token_type, err)?;
                failed.push(token_type);
            }
        }
    }

    dashboard.persist().await?;
    if !failed.is_empty() {
        bail!("could not refresh: {}", failed.join(", "));
    }
    Ok(())
}

pub async fn create_zone(dashboard: &Dashboard, name: &str, out: &mut (dyn Write + Send)) -> Result<()> {
    dashboard.store().add_zone(name).await?;
    dashboard.persist().await?;
    writeln!(out, "zone '{}' created", name)?;
    Ok(())
}

pub async fn create_widget(
    dashboard: &Dashboard,
    widget_type: &str,
    zone: &str,
    id: &str,
    out: &mut (dyn Write + Send),
) -> Result<()> {
    let store = dashboard.store();
    let factory = store
        .widget_factory(widget_type)
        .ok_or_else(|| anyhow!("no widget factory for '{}'", widget_type))?;

    // fail before prompting when the widget could never be added
    match store.zones().await.iter().find(|z| z.name == zone) {
        None => return Err(ConfigError::UnknownZone(zone.to_owned()).into()),
        Some(existing) if existing.contains_id(id) => {
            return Err(ConfigError::DuplicateWidget {
                zone: zone.to_owned(),
                id: id.to_owned(),
            }
            .into())
        }
        Some(_) => {}
    }

    let fields = factory.create_from_cli().await?;
    store.add_widget(zone, Widget::new(widget_type, id, fields)).await?;
    dashboard.persist().await?;
    writeln!(out, "widget '{}:{}' added to zone '{}'", widget_type, id, zone)?;
    Ok(())
}

pub async fn create_token(dashboard: &Dashboard, token_type: &str, out: &mut (dyn Write + Send)) -> Result<()> {
    let store = dashboard.store();
    let factory = store
        .token_factory(token_type)
        .ok_or_else(|| anyhow!("no token factory for '{}'", token_type))?;

    let fields = factory.create_from_cli().await?;
    store.set_token(Token::new(token_type, fields)).await;
    dashboard.persist().await?;
    writeln!(out, "token '{}' saved", token_type)?;
    Ok(())
}
