//! Configuration loading and merge precedence for wikivault (spec §6.4).
//!
//! Values can come from three sources: a TOML file, command-line arguments,
//! and built-in defaults, in that precedence order (CLI wins, then file,
//! then defaults). Each source is parsed into a [`PartialConfig`] — every
//! field `Option`, so "not set by this source" is representable — and the
//! sources are merged left-to-right before [`PartialConfig::finalize`]
//! applies defaults and validates. Validation only runs after the merge is
//! complete, so an invalid file value can still be overridden by a valid
//! command-line one (spec §6.4, §7).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wikivault_types::ConfigError;

pub const CONFIG_FILE: &str = ".wikivault.toml";

/// `level` ∈ {DEBUG, INFO, WARNING, ERROR, CRITICAL} (spec §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// API client configuration (spec §6.4 "API").
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub rate_limit_per_second: f64,
}

/// Storage configuration (spec §6.4 "Storage").
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub data_dir: PathBuf,
    pub checkpoint_path: PathBuf,
}

/// Run configuration (spec §6.4 "Run").
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub namespaces: Vec<i32>,
    pub force: bool,
    pub dry_run: bool,
    pub since: Option<DateTime<Utc>>,
    pub failure_threshold_fraction: f64,
}

/// Logging configuration (spec §6.4 "Logging").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub quiet: bool,
}

/// The fully merged and validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub run: RunConfig,
    pub logging: LoggingConfig,
}

fn default_base_url() -> String {
    String::new()
}
fn default_user_agent() -> String {
    format!(
        "wikivault/{} (https://github.com/wikivault/wikivault)",
        env!("CARGO_PKG_VERSION")
    )
}
fn default_timeout_seconds() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_rate_limit() -> f64 {
    2.0
}
fn default_database_path() -> PathBuf {
    PathBuf::from("wikivault.sqlite3")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("./checkpoint.json")
}
fn default_failure_threshold() -> f64 {
    0.10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            rate_limit_per_second: default_rate_limit(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            data_dir: default_data_dir(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![0],
            force: false,
            dry_run: false,
            since: None,
            failure_threshold_fraction: default_failure_threshold(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            quiet: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            run: RunConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Every field optional, so a single source (file, CLI args, defaults) need
/// only set the fields it actually provides. `merge` composes sources with
/// `other` taking precedence over `self` field by field — no sentinel
/// comparisons against defaults, unlike a magic-number merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub api: PartialApiConfig,
    #[serde(default)]
    pub storage: PartialStorageConfig,
    #[serde(default)]
    pub run: PartialRunConfig,
    #[serde(default)]
    pub logging: PartialLoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialApiConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub rate_limit_per_second: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialStorageConfig {
    pub database_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub checkpoint_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialRunConfig {
    pub namespaces: Option<Vec<i32>>,
    pub force: Option<bool>,
    pub dry_run: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub failure_threshold_fraction: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<LogLevel>,
    pub quiet: Option<bool>,
}

macro_rules! take_precedence {
    ($self:expr, $other:expr, $field:ident) => {
        $other.$field.clone().or_else(|| $self.$field.clone())
    };
}

impl PartialConfig {
    /// Merge `self` with `other`, where `other`'s set fields win. Call with
    /// `defaults.merge(&file).merge(&cli_args)` to get CLI > file > defaults
    /// precedence (spec §6.4).
    pub fn merge(&self, other: &PartialConfig) -> PartialConfig {
        PartialConfig {
            api: PartialApiConfig {
                base_url: take_precedence!(self.api, other.api, base_url),
                user_agent: take_precedence!(self.api, other.api, user_agent),
                timeout_seconds: take_precedence!(self.api, other.api, timeout_seconds),
                max_retries: take_precedence!(self.api, other.api, max_retries),
                rate_limit_per_second: take_precedence!(
                    self.api,
                    other.api,
                    rate_limit_per_second
                ),
            },
            storage: PartialStorageConfig {
                database_path: take_precedence!(self.storage, other.storage, database_path),
                data_dir: take_precedence!(self.storage, other.storage, data_dir),
                checkpoint_path: take_precedence!(self.storage, other.storage, checkpoint_path),
            },
            run: PartialRunConfig {
                namespaces: take_precedence!(self.run, other.run, namespaces),
                force: take_precedence!(self.run, other.run, force),
                dry_run: take_precedence!(self.run, other.run, dry_run),
                since: take_precedence!(self.run, other.run, since),
                failure_threshold_fraction: take_precedence!(
                    self.run,
                    other.run,
                    failure_threshold_fraction
                ),
            },
            logging: PartialLoggingConfig {
                level: take_precedence!(self.logging, other.logging, level),
                quiet: take_precedence!(self.logging, other.logging, quiet),
            },
        }
    }

    /// Apply defaults for unset fields and validate. Validation runs only
    /// here, after every source has had a chance to override a bad file
    /// value (spec §6.4, §7).
    pub fn finalize(&self) -> Result<Config, ConfigError> {
        let defaults = Config::default();
        let config = Config {
            api: ApiConfig {
                base_url: self
                    .api
                    .base_url
                    .clone()
                    .unwrap_or(defaults.api.base_url),
                user_agent: self
                    .api
                    .user_agent
                    .clone()
                    .unwrap_or(defaults.api.user_agent),
                timeout_seconds: self.api.timeout_seconds.unwrap_or(defaults.api.timeout_seconds),
                max_retries: self.api.max_retries.unwrap_or(defaults.api.max_retries),
                rate_limit_per_second: self
                    .api
                    .rate_limit_per_second
                    .unwrap_or(defaults.api.rate_limit_per_second),
            },
            storage: StorageConfig {
                database_path: self
                    .storage
                    .database_path
                    .clone()
                    .unwrap_or(defaults.storage.database_path),
                data_dir: self
                    .storage
                    .data_dir
                    .clone()
                    .unwrap_or(defaults.storage.data_dir),
                checkpoint_path: self
                    .storage
                    .checkpoint_path
                    .clone()
                    .unwrap_or(defaults.storage.checkpoint_path),
            },
            run: RunConfig {
                namespaces: self
                    .run
                    .namespaces
                    .clone()
                    .unwrap_or(defaults.run.namespaces),
                force: self.run.force.unwrap_or(defaults.run.force),
                dry_run: self.run.dry_run.unwrap_or(defaults.run.dry_run),
                since: self.run.since.or(defaults.run.since),
                failure_threshold_fraction: self
                    .run
                    .failure_threshold_fraction
                    .unwrap_or(defaults.run.failure_threshold_fraction),
            },
            logging: LoggingConfig {
                level: self.logging.level.unwrap_or(defaults.logging.level),
                quiet: self.logging.quiet.unwrap_or(defaults.logging.quiet),
            },
        };

        validate(&config)?;
        Ok(config)
    }
}

/// Rejects values that can never be acted on correctly, per spec §6.4/§A.7.
fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.api.base_url.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: "api.base_url".to_string(),
        });
    }
    if config.api.timeout_seconds == 0 {
        return Err(ConfigError::Invalid {
            field: "api.timeout_seconds".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if config.api.rate_limit_per_second <= 0.0 {
        return Err(ConfigError::Invalid {
            field: "api.rate_limit_per_second".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    for ns in &config.run.namespaces {
        if *ns < 0 {
            return Err(ConfigError::Invalid {
                field: "run.namespaces".to_string(),
                message: format!("namespace ids must be non-negative, got {ns}"),
            });
        }
    }
    if !(0.0..=1.0).contains(&config.run.failure_threshold_fraction) {
        return Err(ConfigError::Invalid {
            field: "run.failure_threshold_fraction".to_string(),
            message: "must be between 0.0 and 1.0".to_string(),
        });
    }
    Ok(())
}

/// Load a [`PartialConfig`] from a TOML file. Returns the empty default when
/// `path` does not exist, so callers can always merge the result in without
/// branching on presence.
pub fn load_config_from_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    if !path.exists() {
        return Ok(PartialConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load a [`PartialConfig`] from `dir`/`.wikivault.toml`.
pub fn load_config(dir: &Path) -> Result<PartialConfig, ConfigError> {
    load_config_from_file(&config_path(dir))
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Write `config` to `dir`/`.wikivault.toml`.
pub fn save_config(dir: &Path, config: &PartialConfig) -> Result<(), ConfigError> {
    let path = config_path(dir);
    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(&path, content)?;
    Ok(())
}

/// Walk up from `start_dir` looking for `.wikivault.toml`.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn with_base_url() -> PartialConfig {
        PartialConfig {
            api: PartialApiConfig {
                base_url: Some("https://en.wikipedia.org/w/api.php".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn finalize_fails_without_base_url() {
        let err = PartialConfig::default().finalize().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn finalize_applies_defaults_for_unset_fields() {
        let config = with_base_url().finalize().unwrap();
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.run.namespaces, vec![0]);
        assert_eq!(config.run.failure_threshold_fraction, 0.10);
    }

    #[test]
    fn cli_overrides_file_overrides_defaults() {
        let defaults = PartialConfig::default();
        let file = PartialConfig {
            api: PartialApiConfig {
                base_url: Some("https://file.example/api.php".to_string()),
                max_retries: Some(5),
                ..Default::default()
            },
            ..Default::default()
        };
        let cli = PartialConfig {
            api: PartialApiConfig {
                max_retries: Some(9),
                ..Default::default()
            },
            ..Default::default()
        };

        let merged = defaults.merge(&file).merge(&cli);
        let config = merged.finalize().unwrap();
        assert_eq!(config.api.base_url, "https://file.example/api.php");
        assert_eq!(config.api.max_retries, 9);
    }

    #[test]
    fn validate_rejects_negative_namespace() {
        let partial = PartialConfig {
            run: PartialRunConfig {
                namespaces: Some(vec![0, -1]),
                ..Default::default()
            },
            ..with_base_url()
        };
        let err = partial.finalize().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "run.namespaces"));
    }

    #[test]
    fn validate_rejects_out_of_range_failure_threshold() {
        let partial = PartialConfig {
            run: PartialRunConfig {
                failure_threshold_fraction: Some(1.5),
                ..Default::default()
            },
            ..with_base_url()
        };
        assert!(partial.finalize().is_err());
    }

    #[test]
    fn load_missing_file_returns_empty_partial() {
        let dir = tempdir().unwrap();
        let partial = load_config(dir.path()).unwrap();
        assert_eq!(partial, PartialConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        save_config(dir.path(), &with_base_url()).unwrap();
        let loaded = load_config(dir.path()).unwrap();
        assert_eq!(
            loaded.api.base_url.as_deref(),
            Some("https://en.wikipedia.org/w/api.php")
        );
    }

    #[test]
    fn find_config_walks_up_directory_tree() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        save_config(dir.path(), &with_base_url()).unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, config_path(dir.path()));
    }

    #[test]
    fn find_config_returns_none_when_absent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(find_config(&nested).is_none());
    }
}
