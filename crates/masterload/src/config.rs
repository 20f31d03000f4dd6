//! Configuration for masterload
//!
//! - [`LoadConfig`]: per-target load policy, built once and shared read-only
//!   by every worker
//! - [`FileConfig`]: optional YAML configuration file with `${VAR}` and
//!   `${VAR:-default}` environment expansion

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::options::ConnectionOptions;
use crate::query::DEFAULT_BATCH_SIZE;
use crate::source::DEFAULT_EXTENSIONS;

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// How existing rows are removed before inserting
///
/// On MySQL the `ALTER TABLE .. AUTO_INCREMENT` reset also commits
/// implicitly. With the reset enabled, a failure at or after the reset cannot
/// undo the purge and inserts; only failures before it roll back cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeMode {
    /// `DELETE FROM t`, stays inside the transaction
    #[default]
    Delete,
    /// `TRUNCATE TABLE t`, which MySQL commits implicitly
    Truncate,
}

impl std::str::FromStr for PurgeMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "truncate" => Ok(Self::Truncate),
            other => Err(format!("unknown purge mode '{}'", other)),
        }
    }
}

/// Load policy applied to every target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Maximum rows per INSERT statement
    pub batch_size: usize,
    /// Purge statement flavour
    pub purge_mode: PurgeMode,
    /// Reset the auto-increment counter to the loaded row count
    pub reset_sequence: bool,
    /// Document file extensions picked up from directory sources
    pub extensions: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            purge_mode: PurgeMode::Delete,
            reset_sequence: true,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl LoadConfig {
    /// Set rows per INSERT
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Set purge mode
    pub fn with_purge_mode(mut self, mode: PurgeMode) -> Self {
        self.purge_mode = mode;
        self
    }

    /// Enable/disable auto-increment reset
    pub fn with_reset_sequence(mut self, enabled: bool) -> Self {
        self.reset_sequence = enabled;
        self
    }

    /// Set document extensions
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Validate the policy values
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid_options("batch_size must be at least 1"));
        }
        if self.extensions.is_empty() {
            return Err(Error::invalid_options(
                "at least one document extension is required",
            ));
        }
        Ok(())
    }
}

/// `database` section of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseSection {
    /// Host name
    #[serde(default)]
    pub host: Option<String>,
    /// TCP port
    #[serde(default)]
    pub port: Option<u16>,
    /// Unix socket path
    #[serde(default)]
    pub socket: Option<String>,
    /// Database name
    #[serde(default)]
    pub name: Option<String>,
    /// Login user
    #[serde(default)]
    pub user: Option<String>,
    /// Login password
    #[serde(default)]
    pub password: Option<String>,
    /// Extra driver parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl DatabaseSection {
    /// Convert into connection options
    pub fn into_options(self) -> ConnectionOptions {
        ConnectionOptions {
            host: self.host,
            port: self.port,
            socket: self.socket,
            database: self.name,
            user: self.user,
            password: self.password.map(SecretString::from),
            params: self.params,
        }
    }
}

/// `load` section of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadSection {
    /// Rows per INSERT
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Purge mode
    #[serde(default)]
    pub purge_mode: Option<PurgeMode>,
    /// Auto-increment reset
    #[serde(default)]
    pub reset_sequence: Option<bool>,
    /// Document extensions
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
}

impl LoadSection {
    /// Apply the values present in this section on top of `base`
    pub fn apply(&self, mut base: LoadConfig) -> LoadConfig {
        if let Some(size) = self.batch_size {
            base.batch_size = size;
        }
        if let Some(mode) = self.purge_mode {
            base.purge_mode = mode;
        }
        if let Some(reset) = self.reset_sequence {
            base.reset_sequence = reset;
        }
        if let Some(exts) = &self.extensions {
            base.extensions = exts.clone();
        }
        base
    }
}

/// Root of the YAML configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Connection settings
    #[serde(default)]
    pub database: DatabaseSection,
    /// Load policy
    #[serde(default)]
    pub load: LoadSection,
    /// Exit non-zero when any target fails
    #[serde(default)]
    pub strict: bool,
}

impl FileConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            Error::Decode { message, .. } => Error::decode(path, message),
            other => other,
        })
    }

    /// Parse configuration text, expanding environment references first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&expanded).map_err(|e| Error::decode("<config>", e.to_string()))
    }
}

/// Expand environment variables in the format ${VAR} or ${VAR:-default}
pub fn expand_env_vars(content: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_load_config_defaults() {
        let config = LoadConfig::default();
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.purge_mode, PurgeMode::Delete);
        assert!(config.reset_sequence);
        assert_eq!(config.extensions, vec!["yml", "yaml", "json"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_validation() {
        assert!(LoadConfig::default().with_batch_size(0).validate().is_err());
        assert!(LoadConfig::default()
            .with_extensions(vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn test_purge_mode_from_str() {
        assert_eq!("delete".parse::<PurgeMode>().unwrap(), PurgeMode::Delete);
        assert_eq!("TRUNCATE".parse::<PurgeMode>().unwrap(), PurgeMode::Truncate);
        assert!("drop".parse::<PurgeMode>().is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("MASTERLOAD_TEST_DB", "fixtures");
        let expanded = expand_env_vars("name: ${MASTERLOAD_TEST_DB}");
        assert_eq!(expanded, "name: fixtures");
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::remove_var("MASTERLOAD_MISSING_VAR");
        let expanded = expand_env_vars("port: ${MASTERLOAD_MISSING_VAR:-3307}");
        assert_eq!(expanded, "port: 3307");
    }

    #[test]
    fn test_parse_file_config() {
        let yaml = r#"
database:
  host: db.internal
  port: 3307
  name: master
  user: loader
  password: s3cret
  params:
    prefer_socket: "false"
load:
  batch_size: 500
  purge_mode: truncate
strict: true
"#;
        let config = FileConfig::from_yaml(yaml).unwrap();
        assert!(config.strict);

        let load = config.load.apply(LoadConfig::default());
        assert_eq!(load.batch_size, 500);
        assert_eq!(load.purge_mode, PurgeMode::Truncate);
        assert!(load.reset_sequence);

        let options = config.database.into_options();
        assert_eq!(options.host.as_deref(), Some("db.internal"));
        assert_eq!(options.port, Some(3307));
        assert_eq!(options.database.as_deref(), Some("master"));
        assert_eq!(
            options.password.as_ref().map(|p| p.expose_secret().to_string()),
            Some("s3cret".to_string())
        );
        assert_eq!(options.params.get("prefer_socket").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = FileConfig::from_yaml("databse:\n  name: x\n").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_empty_file_config() {
        let config = FileConfig::from_yaml("").unwrap();
        assert!(!config.strict);
        assert!(config.database.name.is_none());
    }
}
