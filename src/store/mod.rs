//! Configuration store: zones, tokens, the dirty flag and in-flight refreshes.
//!
//! Endpoint runs, socket events and the persistence timer all touch the same
//! store concurrently, so the documents sit behind async locks and the dirty
//! flag is atomic. Readers always get snapshots.

pub mod documents;
pub mod factories;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::tokens::refresh::RefreshRegistry;
use crate::tokens::{Token, TokenFactory};
use crate::utils::constants::DEFAULT_CONFIG_FOLDER;
use crate::widgets::{Widget, WidgetFactory, Zone};

pub use documents::{TOKENS_FILE, ZONES_FILE};
pub use factories::Factories;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid zones document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid tokens document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
    #[error("zone '{0}' already exists")]
    DuplicateZone(String),
    #[error("unknown zone '{0}'")]
    UnknownZone(String),
    #[error("widget '{id}' already exists in zone '{zone}'")]
    DuplicateWidget { zone: String, id: String },
}

impl ConfigError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write handle to the tokens document that outlives any borrow of the store.
#[derive(Clone)]
pub struct TokenWriter {
    tokens: Arc<RwLock<BTreeMap<String, Token>>>,
    dirty: Arc<AtomicBool>,
}

impl TokenWriter {
    /// Store `token` as the current credential of its type and mark the store dirty.
    pub async fn set_token(&self, token: Token) {
        self.tokens
            .write()
            .await
            .insert(token.token_type.clone(), token);
        self.dirty.store(true, Ordering::SeqCst);
    }
}

pub struct ConfigStore {
    folder: String,
    zones: RwLock<Vec<Zone>>,
    tokens: Arc<RwLock<BTreeMap<String, Token>>>,
    dirty: Arc<AtomicBool>,
    refreshes: RefreshRegistry,
    factories: Arc<Factories>,
}

impl ConfigStore {
    pub fn new(factories: Arc<Factories>) -> Self {
        Self::with_documents(DEFAULT_CONFIG_FOLDER, factories, Vec::new(), BTreeMap::new())
    }

    pub fn with_documents(
        folder: impl Into<String>,
        factories: Arc<Factories>,
        zones: Vec<Zone>,
        tokens: BTreeMap<String, Token>,
    ) -> Self {
        Self {
            folder: folder.into(),
            zones: RwLock::new(zones),
            tokens: Arc::new(RwLock::new(tokens)),
            dirty: Arc::new(AtomicBool::new(false)),
            refreshes: RefreshRegistry::default(),
            factories,
        }
    }

    /// Load `<dir>/<folder>/`. A missing folder or file is an empty document.
    pub async fn load(dir: &Path, folder: &str, factories: Arc<Factories>) -> Result<Self, ConfigError> {
        let (zones, tokens) = read_documents(&dir.join(folder)).await?;
        Ok(Self::with_documents(folder, factories, zones, tokens))
    }

    /// Replace both documents with what is on disk and clear the dirty flag.
    pub async fn reload(&self, dir: &Path) -> Result<(), ConfigError> {
        let (zones, tokens) = read_documents(&self.config_dir(dir)).await?;
        *self.zones.write().await = zones;
        *self.tokens.write().await = tokens;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn config_dir(&self, dir: &Path) -> PathBuf {
        dir.join(&self.folder)
    }

    /// Write both documents under `<dir>/<folder>/`, creating the folder if needed.
    pub async fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let config_dir = self.config_dir(dir);
        fs::create_dir_all(&config_dir)
            .await
            .map_err(|source| ConfigError::io(&config_dir, source))?;

        let zones = documents::serialize_zones(&self.zones().await)?;
        let tokens = documents::serialize_tokens(&self.tokens().await)?;

        documents::write_atomic(&config_dir.join(ZONES_FILE), zones.as_bytes(), false).await?;
        documents::write_atomic(&config_dir.join(TOKENS_FILE), tokens.as_bytes(), true).await?;

        info!(path = %config_dir.display(), "configuration saved");
        Ok(())
    }

    /// Save when dirty. The flag is cleared before writing and restored on
    /// failure, so a mutation racing the write is never lost.
    pub async fn persist_if_dirty(&self, dir: &Path) -> Result<bool, ConfigError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        match self.save(dir).await {
            Ok(()) => Ok(true),
            Err(err) => {
                self.dirty.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub async fn zones(&self) -> Vec<Zone> {
        self.zones.read().await.clone()
    }

    pub async fn tokens(&self) -> BTreeMap<String, Token> {
        self.tokens.read().await.clone()
    }

    pub async fn token(&self, token_type: &str) -> Option<Token> {
        self.tokens.read().await.get(token_type).cloned()
    }

    /// Store `token` as the current credential of its type and mark the store dirty.
    pub async fn set_token(&self, token: Token) {
        self.token_writer().set_token(token).await;
    }

    pub fn token_writer(&self) -> TokenWriter {
        TokenWriter {
            tokens: self.tokens.clone(),
            dirty: self.dirty.clone(),
        }
    }

    pub async fn add_zone(&self, name: &str) -> Result<(), ConfigError> {
        let mut zones = self.zones.write().await;
        if zones.iter().any(|zone| zone.name == name) {
            return Err(ConfigError::DuplicateZone(name.to_owned()));
        }
        zones.push(Zone::new(name));
        drop(zones);
        self.mark_dirty();
        Ok(())
    }

    pub async fn add_widget(&self, zone_name: &str, widget: Widget) -> Result<(), ConfigError> {
        let mut zones = self.zones.write().await;
        let zone = zones
            .iter_mut()
            .find(|zone| zone.name == zone_name)
            .ok_or_else(|| ConfigError::UnknownZone(zone_name.to_owned()))?;

        if let Some(id) = widget.id.as_deref() {
            if zone.contains_id(id) {
                return Err(ConfigError::DuplicateWidget {
                    zone: zone_name.to_owned(),
                    id: id.to_owned(),
                });
            }
        }
        zone.widgets.push(widget);
        drop(zones);
        self.mark_dirty();
        Ok(())
    }

    pub fn refreshes(&self) -> &RefreshRegistry {
        &self.refreshes
    }

    pub fn factories(&self) -> &Factories {
        &self.factories
    }

    pub fn token_factory(&self, token_type: &str) -> Option<Arc<dyn TokenFactory>> {
        self.factories.token(token_type)
    }

    pub fn widget_factory(&self, widget_type: &str) -> Option<Arc<dyn WidgetFactory>> {
        self.factories.widget(widget_type)
    }
}

async fn read_documents(config_dir: &Path) -> Result<(Vec<Zone>, BTreeMap<String, Token>), ConfigError> {
    let zones = match documents::read_optional(&config_dir.join(ZONES_FILE)).await? {
        Some(content) => documents::parse_zones(&content)?,
        None => Vec::new(),
    };
    let tokens = match documents::read_optional(&config_dir.join(TOKENS_FILE)).await? {
        Some(content) => documents::parse_tokens(&content)?,
        None => BTreeMap::new(),
    };

    debug!(
        path = %config_dir.display(),
        zones = zones.len(),
        tokens = tokens.len(),
        "configuration loaded"
    );
    Ok((zones, tokens))
}
