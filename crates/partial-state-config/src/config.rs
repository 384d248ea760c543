// crates/partial-state-config/src/config.rs
// ============================================================================
// Module: Partial State Configuration
// Description: Configuration loading and validation for Partial State.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: partial-state-core, partial-state-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. The `[store]` table selects
//! the backend; the `[shadow]` table controls how shadow schemas are named and
//! how long drafts live.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use log::debug;
use partial_state_core::ErrorKind;
use partial_state_core::MirrorOptions;
use partial_state_core::core::mirror::DEFAULT_ENTITY_FORMAT;
use partial_state_core::core::mirror::DEFAULT_TABLE_FORMAT;
use partial_state_core::core::mirror::ENTITY_PLACEHOLDER;
use partial_state_core::core::mirror::TABLE_PLACEHOLDER;
use partial_state_store_sqlite::SqliteStoreConfig;
use partial_state_store_sqlite::SqliteStoreMode;
use partial_state_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "partial-state.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PARTIAL_STATE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of read connections.
const DEFAULT_READ_POOL_SIZE: usize = 4;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root configuration for Partial State.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialStateConfig {
    /// Store backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Shadow mirroring configuration.
    #[serde(default)]
    pub shadow: ShadowConfig,
}

impl PartialStateConfig {
    /// Loads configuration from disk using the default resolution rules:
    /// the explicit path, else [`CONFIG_ENV_VAR`], else `partial-state.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config = Self::from_toml_str(content)?;
        debug!("loaded partial state config from {}", resolved.display());
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.shadow.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Store Config
// ============================================================================

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Store configuration.
///
/// # Invariants
/// - `path` is required for `sqlite` and forbidden for `memory`.
/// - `read_pool_size` is greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read connections for the sqlite backend.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.read_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "store read_pool_size must be greater than zero".to_string(),
            ));
        }
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_store_path(path)
            }
        }
    }

    /// Returns the `SQLite` store configuration for a sqlite backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the backend is not sqlite or no
    /// path is configured.
    pub fn sqlite_config(&self) -> Result<SqliteStoreConfig, ConfigError> {
        if self.store_type != StoreType::Sqlite {
            return Err(ConfigError::Invalid("store type is not sqlite".to_string()));
        }
        let path = self
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
        Ok(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            read_pool_size: self.read_pool_size,
        })
    }
}

/// Returns the default store busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

// ============================================================================
// SECTION: Shadow Config
// ============================================================================

/// Shadow mirroring configuration.
///
/// # Invariants
/// - `table_format` contains `{table}`; `entity_format` contains `{entity}`.
/// - `state_lifetime_secs`, when set, is greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShadowConfig {
    /// Shadow table name format.
    #[serde(default = "default_table_format")]
    pub table_format: String,
    /// Shadow entity name format.
    #[serde(default = "default_entity_format")]
    pub entity_format: String,
    /// Draft lifetime in seconds; unset disables expiry.
    #[serde(default)]
    pub state_lifetime_secs: Option<u64>,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            table_format: default_table_format(),
            entity_format: default_entity_format(),
            state_lifetime_secs: None,
        }
    }
}

impl ShadowConfig {
    /// Validates shadow configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.table_format.contains(TABLE_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "shadow table_format must contain {TABLE_PLACEHOLDER}"
            )));
        }
        if !self.entity_format.contains(ENTITY_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "shadow entity_format must contain {ENTITY_PLACEHOLDER}"
            )));
        }
        if let Some(secs) = self.state_lifetime_secs {
            if secs == 0 {
                return Err(ConfigError::Invalid(
                    "shadow state_lifetime_secs must be greater than zero".to_string(),
                ));
            }
            if secs.checked_mul(1_000).is_none() {
                return Err(ConfigError::Invalid(
                    "shadow state_lifetime_secs is out of range".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the mirror options described by this configuration.
    #[must_use]
    pub fn mirror_options(&self) -> MirrorOptions {
        MirrorOptions {
            table_format: self.table_format.clone(),
            entity_format: self.entity_format.clone(),
            extra_fields: Vec::new(),
            state_lifetime_ms: self.state_lifetime_secs.map(|secs| secs.saturating_mul(1_000)),
        }
    }
}

/// Returns the default shadow table format.
fn default_table_format() -> String {
    DEFAULT_TABLE_FORMAT.to_string()
}

/// Returns the default shadow entity format.
fn default_entity_format() -> String {
    DEFAULT_ENTITY_FORMAT.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::StoreIo,
            Self::Parse(_) | Self::Invalid(_) => ErrorKind::InvalidInput,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates the sqlite store path against security limits.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("store path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("store path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("store path component too long".to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::path::Path;

    use super::validate_path;
    use super::validate_store_path;

    #[test]
    fn validate_path_accepts_ordinary_paths() {
        assert!(validate_path(Path::new("config/partial-state.toml")).is_ok());
    }

    #[test]
    fn validate_store_path_rejects_blank_paths() {
        assert!(validate_store_path(Path::new("  ")).is_err());
        assert!(validate_store_path(Path::new("data/partial.db")).is_ok());
    }
}
