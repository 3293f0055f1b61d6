//! Byte-level contract of the two persisted documents.
//!
//! - `widgets.yml`: YAML mapping `zone -> [widget, ...]`, mapping order is zone order.
//! - `tokens.json`: JSON object `type -> token record`, records include `type`.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::{Mapping, Value as YamlValue};
use serde_json::Value as JsonValue;
use tokio::fs;

use crate::store::ConfigError;
use crate::tokens::Token;
use crate::widgets::{Widget, Zone};

pub const ZONES_FILE: &str = "widgets.yml";
pub const TOKENS_FILE: &str = "tokens.json";

pub fn parse_zones(content: &str) -> Result<Vec<Zone>, ConfigError> {
    let mapping = match serde_yaml::from_str::<YamlValue>(content)? {
        YamlValue::Null => return Ok(Vec::new()),
        YamlValue::Mapping(mapping) => mapping,
        _ => {
            return Err(ConfigError::Invalid(
                "zones document must be a mapping of zone names".to_owned(),
            ))
        }
    };

    let mut zones = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = match key {
            YamlValue::String(name) => name,
            other => serde_yaml::to_string(&other)?.trim().to_owned(),
        };
        let YamlValue::Sequence(items) = value else {
            return Err(ConfigError::Invalid(format!("{} is not an array", name)));
        };

        let mut widgets = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            if !item.is_mapping() {
                return Err(ConfigError::Invalid(format!(
                    "{}.widgets[{}] is not an object",
                    name, i
                )));
            }
            widgets.push(serde_yaml::from_value::<Widget>(item)?);
        }
        zones.push(Zone { name, widgets });
    }
    Ok(zones)
}

pub fn serialize_zones(zones: &[Zone]) -> Result<String, ConfigError> {
    let mut mapping = Mapping::new();
    for zone in zones {
        mapping.insert(
            YamlValue::String(zone.name.clone()),
            serde_yaml::to_value(&zone.widgets)?,
        );
    }
    Ok(serde_yaml::to_string(&YamlValue::Mapping(mapping))?)
}

/// The document key is the token type, a `type` inside the record is ignored.
pub fn parse_tokens(content: &str) -> Result<BTreeMap<String, Token>, ConfigError> {
    let document: serde_json::Map<String, JsonValue> = serde_json::from_str(content)?;
    let mut tokens = BTreeMap::new();
    for (token_type, record) in document {
        let JsonValue::Object(fields) = record else {
            return Err(ConfigError::Invalid(format!("{} is not an object", token_type)));
        };
        tokens.insert(token_type.clone(), Token::new(token_type, fields));
    }
    Ok(tokens)
}

pub fn serialize_tokens(tokens: &BTreeMap<String, Token>) -> Result<String, ConfigError> {
    Ok(serde_json::to_string_pretty(tokens)?)
}

/// Write through a `*.tmp` sibling and rename, so readers never see a torn file.
pub async fn write_atomic(path: &Path, content: &[u8], private: bool) -> Result<(), ConfigError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)
        .await
        .map_err(|source| ConfigError::io(&tmp, source))?;

    if private {
        restrict_to_owner(&tmp)
            .await
            .map_err(|source| ConfigError::io(&tmp, source))?;
    }

    fs::rename(&tmp, path)
        .await
        .map_err(|source| ConfigError::io(path, source))
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Read a document, `None` when the file does not exist.
pub async fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::io(path, source)),
    }
}
