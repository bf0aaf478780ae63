use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::telemetry;
use crate::utils;

pub const USER_ID_ENV: &str = "EVENTDECK_USER_ID";
pub const LOG_FILTER_ENV: &str = "EVENTDECK_LOG";

const DEFAULT_RADIUS_KM: f64 = 25.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub current_user_id: Option<String>,
    pub default_radius_km: f64,
    pub seed_cache_on_empty: bool,
    pub log_filter: String,
    pub database_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            current_user_id: None,
            default_radius_km: DEFAULT_RADIUS_KM,
            seed_cache_on_empty: true,
            log_filter: telemetry::DEFAULT_FILTER.to_string(),
            database_path: None,
        }
    }
}

impl AppConfig {
    /// Environment variables win over whatever was stored on disk.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `EVENTDECK_*` values from `lookup`; blank values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user_id) = lookup(USER_ID_ENV).filter(|v| !utils::is_blank(v)) {
            self.current_user_id = Some(user_id.trim().to_string());
        }
        if let Some(filter) = lookup(LOG_FILTER_ENV).filter(|v| !utils::is_blank(v)) {
            self.log_filter = filter.trim().to_string();
        }
        self
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: Mutex<AppConfig>,
    env_overrides: bool,
}

impl ConfigStore {
    /// Loads the config from the data dir. `read` and `update` hand back the
    /// stored values with environment overrides applied; the file itself only
    /// ever holds what `update` wrote.
    pub fn load() -> Self {
        Self::load_from(utils::config_path()).with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.env_overrides = true;
        self
    }

    /// A missing or unreadable file yields defaults; the next `update` rewrites it.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = ?path, "falling back to default config: {err}");
                AppConfig::default()
            }
        };
        Self {
            path,
            data: Mutex::new(data),
            env_overrides: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> AppConfig {
        let stored = match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        self.effective(stored)
    }

    pub fn update<F>(&self, transform: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut guard = self.data.lock().map_err(|_| ConfigError::Poisoned)?;
        transform(&mut guard);
        write_config(&self.path, &guard)?;
        Ok(self.effective(guard.clone()))
    }

    fn effective(&self, stored: AppConfig) -> AppConfig {
        if self.env_overrides {
            stored.with_env_overrides()
        } else {
            stored
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;
    Ok(())
}
