// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and filesystem store for the `gang` CLI.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use gang_core::MatchConfig;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Key of the CLI's config blob.
pub const CONFIG_KEY: &str = "gang";

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in store.
    #[error("not found")]
    NotFound,
    /// I/O error while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all error variant.
    #[error("other: {0}")]
    Other(String),
}

/// Serializes config values and delegates storage to a `ConfigStore`.
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Wraps `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store, e.g. to report where configs live.
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> ConfigService<S>
where
    S: ConfigStore,
{
    /// Load and deserialize the value for `key`. Returns `Ok(None)` if missing.
    pub fn load<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: DeserializeOwned,
    {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist `value` under `key`.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), ConfigError>
    where
        T: Serialize,
    {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

/// Stores configs as JSON files in one directory.
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Store rooted at the user config directory (e.g. `~/.config/gang`).
    /// The directory is created on first save.
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "Gang")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        Ok(Self {
            base: proj.config_dir().to_path_buf(),
        })
    }

    /// Store rooted at `base`.
    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Directory holding the `<key>.json` files.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }
}

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

/// Persisted CLI settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Default `tracing` directive; `RUST_LOG` adds to it.
    pub log_filter: String,
    /// Output used when `--json` is not given.
    pub output: OutputFormat,
    /// Engine limits.
    pub engine: MatchConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_filter: "warn".to_owned(),
            output: OutputFormat::Table,
            engine: MatchConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct MemStore(std::cell::RefCell<Option<Vec<u8>>>);

    impl ConfigStore for MemStore {
        fn load_raw(&self, _key: &str) -> Result<Vec<u8>, ConfigError> {
            self.0.borrow().clone().ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, _key: &str, data: &[u8]) -> Result<(), ConfigError> {
            *self.0.borrow_mut() = Some(data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn missing_blob_loads_as_none() {
        let svc = ConfigService::new(MemStore(std::cell::RefCell::new(None)));
        assert!(svc.load::<CliConfig>(CONFIG_KEY).unwrap().is_none());
    }

    #[test]
    fn saved_config_round_trips_with_partial_fields() {
        let svc = ConfigService::new(MemStore(std::cell::RefCell::new(None)));
        let cfg = CliConfig {
            output: OutputFormat::Json,
            ..CliConfig::default()
        };
        svc.save(CONFIG_KEY, &cfg).unwrap();
        assert_eq!(svc.load::<CliConfig>(CONFIG_KEY).unwrap(), Some(cfg));

        svc.store()
            .save_raw(CONFIG_KEY, br#"{"engine":{"max_saturation_passes":4}}"#)
            .unwrap();
        let partial: CliConfig = svc.load(CONFIG_KEY).unwrap().unwrap();
        assert_eq!(partial.log_filter, "warn");
        assert_eq!(partial.engine.max_saturation_passes, Some(4));
    }
}
