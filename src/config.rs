//! JSON settings persistence.
//!
//! Settings live in a flat JSON document. Defaults are merged under whatever
//! the file contains, values change only through `set`/`update`, and nothing
//! is written back until `save` is called. Keys this version does not know
//! about are carried through untouched.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Volume change per hotkey press, in percent.
pub const DEFAULT_VOLUME_STEP: u32 = 2;

/// How long the overlay stays up after the last change, in milliseconds.
pub const DEFAULT_NOTIFICATION_DURATION_MS: u64 = 700;

const APP_DIR_NAME: &str = "SoundMaster";
const CONFIG_FILE_NAME: &str = "settings.json";

/// Persisted application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Percent added or removed per hotkey press (always >= 1).
    #[serde(default = "default_volume_step")]
    pub volume_step: u32,

    /// Overlay idle timeout in milliseconds.
    #[serde(default = "default_notification_duration")]
    pub notification_duration: u64,

    /// Playback device chosen from the tray menu; `None` follows the system default.
    #[serde(default)]
    pub selected_device_id: Option<String>,

    /// Keys written by other versions.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_volume_step() -> u32 {
    DEFAULT_VOLUME_STEP
}

fn default_notification_duration() -> u64 {
    DEFAULT_NOTIFICATION_DURATION_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volume_step: default_volume_step(),
            notification_duration: default_notification_duration(),
            selected_device_id: None,
            extra: Map::new(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.volume_step == 0 {
            return Err(ConfigError::InvalidValue {
                key: "volume_step".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn to_map(&self) -> Result<Map<String, Value>, ConfigError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(ConfigError::InvalidValue {
                key: "<root>".to_string(),
                reason: format!("expected an object, got {other}"),
            }),
        }
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }
}

/// Settings store errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Settings held in memory and backed by a JSON file.
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<Config>,
}

impl ConfigStore {
    /// Load settings from `path`.
    ///
    /// Never fails: a missing, unreadable or malformed file leaves the
    /// defaults in place for this session.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match load_config(&path) {
            Ok(Some(config)) => {
                info!(path = %path.display(), "loaded settings");
                config
            }
            Ok(None) => {
                info!(path = %path.display(), "no settings file, using defaults");
                Config::default()
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to load settings, using defaults");
                Config::default()
            }
        };

        Self {
            path,
            config: RwLock::new(config),
        }
    }

    /// Location the store reads from and saves to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up a single key, including unknown keys carried from the file.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.snapshot().to_map().ok()?.remove(key)
    }

    /// Set a single key. The value must fit the key's type.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.update([(key.to_string(), value)])
    }

    /// Set several keys at once. Either all of them apply or none do.
    pub fn update<I, K>(&self, updates: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let mut map = guard.to_map()?;
        let mut keys = Vec::new();
        for (key, value) in updates {
            let key = key.into();
            map.insert(key.clone(), value);
            keys.push(key);
        }

        let updated = Config::from_map(map).map_err(|err| ConfigError::InvalidValue {
            key: keys.join(", "),
            reason: err.to_string(),
        })?;
        updated.validate()?;

        debug!(keys = ?keys, "settings updated");
        *guard = updated;
        Ok(())
    }

    /// Write the current settings to disk as pretty JSON.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config = self.snapshot();
        let json = serde_json::to_string_pretty(&config)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, json)?;
        info!(path = %self.path.display(), "saved settings");
        Ok(())
    }

    /// Percent per hotkey press.
    pub fn volume_step(&self) -> u32 {
        self.snapshot().volume_step.max(1)
    }

    /// Overlay idle timeout.
    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.snapshot().notification_duration)
    }

    /// Device chosen by the user, if any.
    pub fn selected_device_id(&self) -> Option<String> {
        self.snapshot().selected_device_id
    }
}

/// Read settings from disk. `Ok(None)` when the file does not exist.
fn load_config(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&data)?;
    config.validate()?;
    Ok(Some(config))
}

/// Returns the default settings path.
///
/// `%APPDATA%\SoundMaster\settings.json` on Windows, the XDG config directory
/// elsewhere, and `settings.json` in the working directory as a last resort.
pub fn default_config_path() -> PathBuf {
    config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    }
}
