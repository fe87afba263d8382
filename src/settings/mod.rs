//! File-backed store for connected Cloudflare zones.
pub mod document;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

pub use document::{SettingsDocument, ZoneRecord, ZoneSet};

pub const DEFAULT_SETTINGS_PATH: &str = "content/addons/cloudburst.yaml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write settings file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to create settings directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to remove settings file {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Result of [`SettingsStore::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Removed,
    NothingToClear,
}

/// Reads and writes the YAML settings file through `tokio::fs`.
///
/// Saves are read-merge-write without locking; two concurrent writers can
/// lose each other's updates.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the normalized document. A missing or blank file has no zones.
    pub async fn load(&self) -> Result<SettingsDocument, SettingsError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(SettingsDocument::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if raw.trim().is_empty() {
            return Ok(SettingsDocument::default());
        }

        serde_yaml::from_str(&raw)
            .and_then(SettingsDocument::from_yaml)
            .map_err(|source| SettingsError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// Merge `partial` into the stored document and write the result back.
    /// Returns the document as written.
    pub async fn save(&self, partial: SettingsDocument) -> Result<SettingsDocument, SettingsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| SettingsError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut current = self.load().await?;
        current.merge(partial);

        let yaml = current
            .to_yaml()
            .and_then(|value| serde_yaml::to_string(&value))
            .map_err(SettingsError::Serialize)?;

        fs::write(&self.path, yaml)
            .await
            .map_err(|source| SettingsError::Write {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %self.path.display(), zones = current.zones.len(), "settings saved");
        Ok(current)
    }

    /// Delete the settings file. A missing file is not an error.
    pub async fn clear(&self) -> Result<ClearOutcome, SettingsError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "settings cleared");
                Ok(ClearOutcome::Removed)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ClearOutcome::NothingToClear),
            Err(source) => Err(SettingsError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(DEFAULT_SETTINGS_PATH)
    }
}
