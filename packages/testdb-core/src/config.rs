//! Template database configuration.
//!
//! Supports TOML config files, `DB_*` environment variable overrides, and
//! defaults.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TestDbError};
use crate::ident::MAX_IDENT_LEN;

/// Characters appended to the prefix by the longest generated name
/// (`_template_` plus a 32-digit hex UUID).
const GENERATED_SUFFIX_LEN: usize = "_template_".len() + 32;

/// Connection and content settings for a template database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplateDatabaseConfig {
    /// Engine host name
    pub host: String,
    /// Engine port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Login password
    pub password: String,
    /// Prefix of every generated namespace name
    pub namespace_prefix: String,
    /// Directory of per-table fixture files
    pub fixtures_dir: PathBuf,
    /// DDL script applied to the template
    pub schema_path: PathBuf,
    /// Maximum connections in the template's pool
    pub max_connections: u32,
}

impl Default for TemplateDatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            namespace_prefix: "test".to_string(),
            fixtures_dir: PathBuf::from("./testdata/fixtures"),
            schema_path: PathBuf::from("./testdata/schema.sql"),
            max_connections: 5,
        }
    }
}

impl TemplateDatabaseConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TestDbError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| TestDbError::Configuration(format!("Invalid TOML: {}", e)))
    }

    /// Defaults, overridden by the environment, then validated.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides.
    ///
    /// Recognized variables: `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASS`,
    /// `DB_NAME` (namespace prefix), `DB_FIXTURES_DIR`, `DB_SCHEMA_PATH`,
    /// `DB_MAX_CONNECTIONS`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("DB_HOST") {
            self.host = val;
        }
        if let Ok(val) = env::var("DB_PORT") {
            self.port = val
                .parse()
                .map_err(|_| TestDbError::Configuration(format!("Invalid DB_PORT: {}", val)))?;
        }
        if let Ok(val) = env::var("DB_USER") {
            self.user = val;
        }
        if let Ok(val) = env::var("DB_PASS") {
            self.password = val;
        }
        if let Ok(val) = env::var("DB_NAME") {
            self.namespace_prefix = val;
        }
        if let Ok(val) = env::var("DB_FIXTURES_DIR") {
            self.fixtures_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("DB_SCHEMA_PATH") {
            self.schema_path = PathBuf::from(val);
        }
        if let Ok(val) = env::var("DB_MAX_CONNECTIONS") {
            self.max_connections = val.parse().map_err(|_| {
                TestDbError::Configuration(format!("Invalid DB_MAX_CONNECTIONS: {}", val))
            })?;
        }
        Ok(())
    }

    /// Checks that every setting is usable.
    ///
    /// The namespace prefix must be non-empty ASCII alphanumerics or
    /// underscores, short enough for every generated name to fit the
    /// engine's identifier limit.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(TestDbError::Configuration("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(TestDbError::Configuration("port must be non-zero".to_string()));
        }
        if self.user.is_empty() {
            return Err(TestDbError::Configuration("user is empty".to_string()));
        }
        if self.namespace_prefix.is_empty() {
            return Err(TestDbError::Configuration(
                "namespace prefix is empty".to_string(),
            ));
        }
        if let Some(ch) = self
            .namespace_prefix
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(TestDbError::Configuration(format!(
                "namespace prefix '{}' contains invalid character {:?}",
                self.namespace_prefix, ch
            )));
        }
        let max_prefix = MAX_IDENT_LEN - GENERATED_SUFFIX_LEN;
        if self.namespace_prefix.len() > max_prefix {
            return Err(TestDbError::Configuration(format!(
                "namespace prefix '{}' is longer than {} characters",
                self.namespace_prefix, max_prefix
            )));
        }
        if self.max_connections == 0 {
            return Err(TestDbError::Configuration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
