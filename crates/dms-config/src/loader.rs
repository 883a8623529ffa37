//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use dms_common::{DatabaseKind, OutputFormat};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "dms-rbac.toml",
    "config.toml",
    "./config/dms-rbac.toml",
    "/etc/dms-rbac/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file()? {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        self.apply_env_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use.
    ///
    /// An explicitly requested file that does not exist is an error; the
    /// standard search paths are optional.
    fn find_config_file(&self) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::ValidationError(format!(
                "config file {} does not exist",
                path.display()
            )));
        }

        if let Ok(path) = env::var("DMS_RBAC_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
            warn!(?path, "DMS_RBAC_CONFIG points to a missing file, ignoring");
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) {
        // Database
        if let Ok(val) = env::var("DMS_RBAC_DATABASE_TYPE") {
            match DatabaseKind::parse(&val) {
                Some(kind) => config.database.kind = kind,
                None => warn!(value = %val, "Ignoring unknown DMS_RBAC_DATABASE_TYPE"),
            }
        }
        if let Ok(val) = env::var("DMS_RBAC_DATABASE_URL") {
            config.database.url = val;
        }
        if let Ok(val) = env::var("DMS_RBAC_DATABASE_MAX_CONNECTIONS") {
            match val.parse() {
                Ok(max) => config.database.max_connections = max,
                Err(_) => warn!(value = %val, "Ignoring invalid DMS_RBAC_DATABASE_MAX_CONNECTIONS"),
            }
        }
        if let Ok(val) = env::var("DMS_RBAC_DATABASE_ACQUIRE_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => config.database.acquire_timeout_secs = secs,
                Err(_) => warn!(value = %val, "Ignoring invalid DMS_RBAC_DATABASE_ACQUIRE_TIMEOUT_SECS"),
            }
        }

        // Tables
        if let Ok(val) = env::var("DMS_RBAC_TABLE_USER_ROLES") {
            config.tables.user_roles = val;
        }
        if let Ok(val) = env::var("DMS_RBAC_TABLE_ROLES") {
            config.tables.roles = val;
        }
        if let Ok(val) = env::var("DMS_RBAC_ROLE_KEY_COLUMN") {
            config.tables.role_key_column = val;
        }
        if let Ok(val) = env::var("DMS_RBAC_ROLE_DISPLAY_COLUMN") {
            config.tables.role_display_column = val;
        }

        // Report
        if let Ok(val) = env::var("DMS_RBAC_REPORT_FORMAT") {
            match OutputFormat::parse(&val) {
                Some(format) => config.report.format = format,
                None => warn!(value = %val, "Ignoring unknown DMS_RBAC_REPORT_FORMAT"),
            }
        }
        if let Ok(val) = env::var("DMS_RBAC_REPORT_INCLUDE_INACTIVE") {
            match parse_flag(&val) {
                Some(flag) => config.report.include_inactive = flag,
                None => warn!(value = %val, "Ignoring invalid DMS_RBAC_REPORT_INCLUDE_INACTIVE"),
            }
        }
    }
}

/// Boolean env value: `true/false`, `1/0`, `yes/no` or `on/off`, any case
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
