use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::models::{StatementType, WorkgroupConfiguration, WorkgroupTags};

/// Workgroup every account has; never looked up remotely
pub const DEFAULT_WORKGROUP: &str = "primary";

/// Service limit for DDL statements: 600 minutes
pub const DEFAULT_DDL_QUERY_TIMEOUT_SECS: u64 = 600 * 60;

/// Service limit for DML statements: 30 minutes
pub const DEFAULT_DML_QUERY_TIMEOUT_SECS: u64 = 30 * 60;

/// Longest query text the service accepts, in bytes
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 262_144;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Database queries run against
    pub database: String,

    /// Where the service writes result files
    pub output_location: String,

    /// Reject anything that is not a read-only statement
    pub read_only: bool,

    /// Report bytes scanned and cost for every finished query
    pub moneywise: bool,

    /// Fixed delay between status polls, in milliseconds
    pub poll_interval_ms: u64,

    /// Maximum query text length; interpolation may grow to 10x this
    pub max_query_length: usize,

    pub workgroup: WorkgroupSettings,

    pub service_limits: ServiceLimitOverride,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkgroupSettings {
    pub name: String,

    /// Create the workgroup remotely when the lookup fails
    pub allow_remote_creation: bool,

    /// Configuration used when creating the workgroup (defaults apply if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<WorkgroupConfiguration>,

    pub tags: WorkgroupTags,
}

/// Per-class timeout overrides, in seconds. Unset or zero keeps the service limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceLimitOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ddl_query_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dml_query_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,

    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            output_location: String::new(),
            read_only: false,
            moneywise: false,
            poll_interval_ms: 3_000,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
            workgroup: WorkgroupSettings::default(),
            service_limits: ServiceLimitOverride::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WorkgroupSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_WORKGROUP.to_string(),
            allow_remote_creation: false,
            configuration: None,
            tags: WorkgroupTags::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

impl ServiceLimitOverride {
    pub fn ddl_timeout(&self) -> Duration {
        Duration::from_secs(
            self.ddl_query_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_DDL_QUERY_TIMEOUT_SECS),
        )
    }

    pub fn dml_timeout(&self) -> Duration {
        Duration::from_secs(
            self.dml_query_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_DML_QUERY_TIMEOUT_SECS),
        )
    }

    /// Threshold for a statement class; anything not DDL uses the DML limit
    pub fn timeout_for(&self, statement_type: Option<&StatementType>) -> Duration {
        match statement_type {
            Some(StatementType::Ddl) => self.ddl_timeout(),
            _ => self.dml_timeout(),
        }
    }

    pub fn is_timed_out(&self, elapsed: Duration, statement_type: Option<&StatementType>) -> bool {
        elapsed > self.timeout_for(statement_type)
    }
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn workgroup_name(&self) -> &str {
        if self.workgroup.name.is_empty() {
            DEFAULT_WORKGROUP
        } else {
            &self.workgroup.name
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_output_location(mut self, location: impl Into<String>) -> Self {
        self.output_location = location.into();
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_moneywise(mut self, moneywise: bool) -> Self {
        self.moneywise = moneywise;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_workgroup(mut self, name: impl Into<String>, allow_remote_creation: bool) -> Self {
        self.workgroup.name = name.into();
        self.workgroup.allow_remote_creation = allow_remote_creation;
        self
    }

    pub fn with_workgroup_tags(mut self, tags: WorkgroupTags) -> Self {
        self.workgroup.tags = tags;
        self
    }

    pub fn with_service_limits(mut self, limits: ServiceLimitOverride) -> Self {
        self.service_limits = limits;
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid driver configuration")
    }

    /// Load config from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("athena-link").join("config.toml"))
    }

    /// Default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# athena-link configuration
# Location: ~/.config/athena-link/config.toml (Linux)

database = "default"
output_location = "s3://query-results-bucket/"

# Reject writes (CREATE, INSERT, DROP, ...) before they reach the service
read_only = false

# Log bytes scanned and cost of every query
moneywise = false

# Delay between status polls
poll_interval_ms = 3000

max_query_length = 262144

[workgroup]
name = "primary"
allow_remote_creation = false

# [workgroup.tags]
# team = "analytics"

[service_limits]
# ddl_query_timeout_secs = 36000
# dml_query_timeout_secs = 1800

[logging]
enabled = false
level = "info"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.workgroup_name(), DEFAULT_WORKGROUP);
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert!(!config.read_only);
        assert_eq!(config.max_query_length, 262_144);
    }

    #[test]
    fn test_commented_default_parses() {
        let config = DriverConfig::from_toml_str(&DriverConfig::create_default_with_comments()).unwrap();
        assert_eq!(config.output_location, "s3://query-results-bucket/");
        assert_eq!(config.workgroup.name, "primary");
        assert_eq!(config.service_limits, ServiceLimitOverride::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DriverConfig::from_toml_str(
            r#"
read_only = true

[workgroup]
name = "etl"
allow_remote_creation = true

[workgroup.tags]
team = "data"

[service_limits]
dml_query_timeout_secs = 60
"#,
        )
        .unwrap();
        assert!(config.read_only);
        assert_eq!(config.database, "default");
        assert_eq!(config.workgroup_name(), "etl");
        assert_eq!(config.workgroup.tags.get("team"), Some("data"));
        assert_eq!(config.service_limits.dml_timeout(), Duration::from_secs(60));
        assert_eq!(
            config.service_limits.ddl_timeout(),
            Duration::from_secs(DEFAULT_DDL_QUERY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_timeout_policy_by_statement_type() {
        let limits = ServiceLimitOverride {
            ddl_query_timeout_secs: Some(100),
            dml_query_timeout_secs: Some(10),
        };
        assert_eq!(limits.timeout_for(Some(&StatementType::Ddl)), Duration::from_secs(100));
        assert_eq!(limits.timeout_for(Some(&StatementType::Dml)), Duration::from_secs(10));
        assert_eq!(limits.timeout_for(Some(&StatementType::Utility)), Duration::from_secs(10));
        assert_eq!(limits.timeout_for(None), Duration::from_secs(10));

        assert!(!limits.is_timed_out(Duration::from_secs(50), Some(&StatementType::Ddl)));
        assert!(limits.is_timed_out(Duration::from_secs(50), Some(&StatementType::Dml)));
        // Zero means "keep the service limit"
        let limits = ServiceLimitOverride {
            ddl_query_timeout_secs: Some(0),
            dml_query_timeout_secs: None,
        };
        assert_eq!(
            limits.timeout_for(None),
            Duration::from_secs(DEFAULT_DML_QUERY_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_save_and_load_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = DriverConfig::default()
            .with_read_only(true)
            .with_workgroup("analytics", true)
            .with_poll_interval(Duration::from_millis(250));
        config.save_to(&path).unwrap();

        let loaded = DriverConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(DriverConfig::from_toml_str("read_only = \"yes\"").is_err());
    }
}
