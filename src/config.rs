//! Application configuration loaded from YAML.
//!
//! Every field carries a default, so a partial file only overrides what it
//! names. Resolution order is an explicit path, then the
//! `OMNI_INSIGHTS_CONFIG` environment variable, then the built-in defaults.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub use serde_yaml::Value as YamlValue;

pub const CONFIG_ENV_VAR: &str = "OMNI_INSIGHTS_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app_name: String,
    pub version: String,
    pub theme: ThemeConfig,
    pub limits: LimitsConfig,
    pub report: ReportConfig,
    pub cache: CacheConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "OmniInsights".to_string(),
            version: "1.0".to_string(),
            theme: ThemeConfig::default(),
            limits: LimitsConfig::default(),
            report: ReportConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub primary_color: String,
    pub secondary_color: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary_color: "#2563eb".to_string(),
            secondary_color: "#64748b".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_rows: usize,
    pub max_file_size_mb: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_rows: 500_000,
            max_file_size_mb: 50,
        }
    }
}

impl LimitsConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Rows kept per table in the HTML report.
    pub max_table_rows: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { max_table_rows: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

impl AppConfig {
    /// Resolves the configuration source and loads it, falling back to the
    /// defaults when the file is missing or unusable.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        match path {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        }
    }

    pub fn load_or_default(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("Config file {path:?} not found; using defaults");
                return Self::default();
            }
            Err(err) => {
                warn!("Unable to read config file {path:?}: {err}; using defaults");
                return Self::default();
            }
        };
        match Self::from_yaml_str(&raw) {
            Ok(config) => {
                debug!("Loaded config from {path:?}");
                config
            }
            Err(err) => {
                warn!("Ignoring config file {path:?}: {err:#}");
                Self::default()
            }
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: YamlValue = serde_yaml::from_str(raw).context("Parsing config YAML")?;
        match value {
            YamlValue::Null => Ok(Self::default()),
            YamlValue::Mapping(_) => {
                serde_yaml::from_value(value).context("Config YAML has unexpected field types")
            }
            _ => anyhow::bail!("Config YAML must be a mapping"),
        }
    }
}

pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Parsing YAML file {path:?}"))
}

pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}
