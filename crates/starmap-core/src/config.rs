use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::{cache_dir, config_dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "starmap";
const CONFIG_FILE_NAME: &str = "config.toml";
const CURRENT_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MODELS_DEV_URL: &str = "https://models.dev/api.json";
pub const DEFAULT_MODELS_DEV_LOGO_URL: &str = "https://models.dev/logos";

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No persisted configuration was found or usable; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    Ser(#[from] toml::ser::Error),
    #[error("invalid value for {var}: {message}")]
    Invalid { var: String, message: String },
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub sync: SyncPreferences,
    #[serde(default)]
    pub models_dev: ModelsDevPreferences,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            sync: SyncPreferences::default(),
            models_dev: ModelsDevPreferences::default(),
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }

    /// Applies `STARMAP_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = non_empty(lookup("STARMAP_OUTPUT_DIR")) {
            self.sync.output_dir = Some(dir);
        }
        self.sync.concurrency = parse_env(
            &lookup,
            "STARMAP_CONCURRENCY",
            self.sync.concurrency,
            |raw| match raw.parse::<usize>() {
                Ok(0) => Err("must be at least 1".to_string()),
                Ok(value) => Ok(value),
                Err(err) => Err(err.to_string()),
            },
        )?;
        self.sync.fetch_timeout_secs = parse_env(
            &lookup,
            "STARMAP_FETCH_TIMEOUT_SECS",
            self.sync.fetch_timeout_secs,
            |raw| match raw.parse::<u64>() {
                Ok(0) => Err("must be at least 1".to_string()),
                Ok(value) => Ok(value),
                Err(err) => Err(err.to_string()),
            },
        )?;
        if let Some(url) = non_empty(lookup("STARMAP_MODELS_DEV_URL")) {
            self.models_dev.api_url = url;
        }
        if let Some(dir) = non_empty(lookup("STARMAP_MODELS_DEV_CACHE")) {
            self.models_dev.cache_dir = Some(dir);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPreferences {
    /// Catalog directory. Defaults to `<config dir>/starmap/catalog`.
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default = "SyncPreferences::default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "SyncPreferences::default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "SyncPreferences::default_user_agent")]
    pub user_agent: String,
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            output_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: Self::default_user_agent(),
        }
    }
}

impl SyncPreferences {
    const fn default_concurrency() -> usize {
        DEFAULT_CONCURRENCY
    }

    const fn default_fetch_timeout_secs() -> u64 {
        DEFAULT_FETCH_TIMEOUT_SECS
    }

    fn default_user_agent() -> String {
        format!("starmap/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| config_directory().join("catalog"))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsDevPreferences {
    #[serde(default = "ModelsDevPreferences::default_enabled")]
    pub enabled: bool,
    #[serde(default = "ModelsDevPreferences::default_api_url")]
    pub api_url: String,
    #[serde(default = "ModelsDevPreferences::default_logo_base_url")]
    pub logo_base_url: String,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default = "ModelsDevPreferences::default_refresh_after_secs")]
    pub refresh_after_secs: u64,
    #[serde(default = "ModelsDevPreferences::default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for ModelsDevPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: Self::default_api_url(),
            logo_base_url: Self::default_logo_base_url(),
            cache_dir: None,
            refresh_after_secs: Self::default_refresh_after_secs(),
            download_timeout_secs: Self::default_download_timeout_secs(),
        }
    }
}

impl ModelsDevPreferences {
    const fn default_enabled() -> bool {
        true
    }

    fn default_api_url() -> String {
        DEFAULT_MODELS_DEV_URL.to_string()
    }

    fn default_logo_base_url() -> String {
        DEFAULT_MODELS_DEV_LOGO_URL.to_string()
    }

    const fn default_refresh_after_secs() -> u64 {
        86_400
    }

    const fn default_download_timeout_secs() -> u64 {
        60
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| {
                cache_dir()
                    .unwrap_or_else(|| config_directory().join("cache"))
                    .join(CONFIG_DIR_NAME)
                    .join("models.dev")
            })
    }

    pub fn refresh_after(&self) -> Duration {
        Duration::from_secs(self.refresh_after_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Root directory for configuration, logs and the default catalog.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Expands `~` and `$VAR` references. Unknown variables leave the path untouched.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// Load the configuration from the default location, falling back to defaults.
pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

/// Load the configuration from `path`. Never fails: problems become warnings.
pub fn load_config_from(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => {
                    warnings.push(format!(
                        "Failed to parse {} as TOML: {}. Falling back to defaults.",
                        path.display(),
                        err
                    ));
                }
            },
            Err(err) => {
                warnings.push(format!(
                    "Failed to read {}: {}. Falling back to defaults.",
                    path.display(),
                    err
                ));
            }
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

pub fn save_config(config: &FileConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown config schema version {}. Resetting to {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        return (FileConfig::default(), warnings);
    }

    if config.sync.concurrency == 0 {
        warnings.push(format!(
            "sync.concurrency must be at least 1. Using {DEFAULT_CONCURRENCY}."
        ));
        config.sync.concurrency = DEFAULT_CONCURRENCY;
    }

    if config.sync.fetch_timeout_secs == 0 {
        warnings.push(format!(
            "sync.fetch_timeout_secs must be positive. Using {DEFAULT_FETCH_TIMEOUT_SECS}."
        ));
        config.sync.fetch_timeout_secs = DEFAULT_FETCH_TIMEOUT_SECS;
    }

    if config.models_dev.api_url.trim().is_empty() {
        warnings.push("models_dev.api_url is empty. Using the public dataset.".to_string());
        config.models_dev.api_url = DEFAULT_MODELS_DEV_URL.to_string();
    }

    (config, warnings)
}

fn parse_env<L, T, F>(lookup: &L, var: &str, default: T, parser: F) -> Result<T, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    F: FnOnce(&str) -> Result<T, String>,
{
    match non_empty(lookup(var)) {
        Some(value) => parser(value.trim()).map_err(|message| ConfigError::Invalid {
            var: var.to_string(),
            message,
        }),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let result = load_config_from(&dir.path().join("config.toml"));
        assert_eq!(result.source, ConfigSource::Default);
        assert!(result.warnings.is_empty());
        assert_eq!(result.config.sync.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(result.config.models_dev.api_url, DEFAULT_MODELS_DEV_URL);
    }

    #[test]
    fn invalid_toml_falls_back_with_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sync\nconcurrency = ").unwrap();

        let result = load_config_from(&path);
        assert_eq!(result.source, ConfigSource::Default);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Failed to parse"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sync]\nconcurrency = 0\nfetch_timeout_secs = 10\n").unwrap();

        let result = load_config_from(&path);
        assert_eq!(result.source, ConfigSource::File);
        assert_eq!(result.config.sync.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(result.config.sync.fetch_timeout(), Duration::from_secs(10));
        assert!(result.config.models_dev.enabled);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = FileConfig::default();
        config.sync.output_dir = Some("/srv/catalog".to_string());
        config.models_dev.enabled = false;

        save_config(&config, &path).unwrap();
        let loaded = load_config_from(&path);
        assert_eq!(loaded.config, config);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = FileConfig::default();
        config
            .apply_env_overrides(lookup_from(&[
                ("STARMAP_OUTPUT_DIR", "/tmp/out"),
                ("STARMAP_CONCURRENCY", "8"),
                ("STARMAP_FETCH_TIMEOUT_SECS", " 12 "),
                ("STARMAP_MODELS_DEV_URL", "http://localhost:9/api.json"),
            ]))
            .unwrap();

        assert_eq!(config.sync.output_dir(), PathBuf::from("/tmp/out"));
        assert_eq!(config.sync.concurrency, 8);
        assert_eq!(config.sync.fetch_timeout_secs, 12);
        assert_eq!(config.models_dev.api_url, "http://localhost:9/api.json");
    }

    #[test]
    fn invalid_numeric_override_is_an_error() {
        let mut config = FileConfig::default();
        let err = config
            .apply_env_overrides(lookup_from(&[("STARMAP_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref var, .. } if var == "STARMAP_CONCURRENCY")
        );

        let err = config
            .apply_env_overrides(lookup_from(&[("STARMAP_FETCH_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("STARMAP_FETCH_TIMEOUT_SECS"));

        let err = config
            .apply_env_overrides(lookup_from(&[("STARMAP_FETCH_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { ref var, .. } if var == "STARMAP_FETCH_TIMEOUT_SECS"
        ));
        assert_eq!(config.sync.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
    }
}
