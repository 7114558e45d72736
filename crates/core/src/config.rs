//! Configuration management
//!
//! Configuration is read from a TOML file and passed explicitly to every
//! client and engine. Nothing in this crate looks at process environment
//! variables; the binary maps those onto the loaded `Config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::backup::RetentionPolicy;
use crate::error::{Error, Result};
use crate::filter::FilterMode;
use crate::routing::{BucketMapping, RouteRule};

const CONFIG_DIR_NAME: &str = "s3shift";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Connection settings for one S3-compatible endpoint
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Endpoint URL; `None` means the regional AWS endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Bucket addressing style: "path", "dns" or "auto"
    #[serde(default = "default_bucket_lookup")]
    pub bucket_lookup: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_lookup() -> String {
    "auto".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: default_region(),
            access_key: None,
            secret_key: None,
            bucket_lookup: default_bucket_lookup(),
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("bucket_lookup", &self.bucket_lookup)
            .finish()
    }
}

impl EndpointConfig {
    /// Check that static credentials are present and the endpoint URL parses.
    ///
    /// `name` is used in error messages ("source", "destination").
    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.has_static_credentials() {
            return Err(Error::Config(format!("{name} credentials are not configured")));
        }
        self.validate_settings(name)
    }

    /// Like [`validate`](Self::validate), but an endpoint with neither key set
    /// is accepted and resolves credentials through the SDK default chain
    /// (environment, profile, instance or task role).
    pub fn validate_with_default_chain(&self, name: &str) -> Result<()> {
        let access = present(&self.access_key);
        let secret = present(&self.secret_key);
        if access != secret {
            return Err(Error::Config(format!(
                "{name} credentials are incomplete: set both access key and secret key, or neither"
            )));
        }
        self.validate_settings(name)
    }

    /// Both keys are set
    pub fn has_static_credentials(&self) -> bool {
        present(&self.access_key) && present(&self.secret_key)
    }

    fn validate_settings(&self, name: &str) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("{name} endpoint '{endpoint}': {e}")))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(Error::Config(format!(
                    "{name} endpoint must use http or https: {endpoint}"
                )));
            }
        }

        match self.bucket_lookup.as_str() {
            "path" | "dns" | "auto" => Ok(()),
            other => Err(Error::Config(format!(
                "{name} bucket_lookup must be path, dns or auto (got '{other}')"
            ))),
        }
    }

    /// Whether requests should use path-style bucket addressing
    pub fn force_path_style(&self) -> bool {
        match self.bucket_lookup.as_str() {
            "path" => true,
            "dns" => false,
            // Custom endpoints rarely support virtual-hosted buckets
            _ => self.endpoint.is_some(),
        }
    }
}

/// Retry configuration for metadata and listing calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    /// A single attempt: failures surface immediately unless retries are opted into
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
        }
    }
}

/// Settings for the object migration run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationSettings {
    /// Listed in declared order; `source_bucket = "name"` is also accepted
    #[serde(default, alias = "source_bucket", deserialize_with = "one_or_many")]
    pub source_buckets: Vec<String>,

    #[serde(default)]
    pub filter: FilterMode,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_parallel")]
    pub parallel: usize,

    /// Ordered prefix rules; the first matching prefix wins
    #[serde(default)]
    pub routes: Vec<RouteRule>,

    #[serde(default)]
    pub default_bucket: Option<String>,
}

fn default_parallel() -> usize {
    1
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(bucket) => vec![bucket],
        OneOrMany::Many(buckets) => buckets,
    })
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            source_buckets: Vec::new(),
            filter: FilterMode::default(),
            dry_run: false,
            parallel: default_parallel(),
            routes: Vec::new(),
            default_bucket: None,
        }
    }
}

impl MigrationSettings {
    /// The configured source buckets, or a configuration error if there are none
    pub fn source_buckets(&self) -> Result<&[String]> {
        if self.source_buckets.is_empty()
            || self.source_buckets.iter().any(|b| b.trim().is_empty())
        {
            return Err(Error::Config("source bucket is not configured".to_string()));
        }
        Ok(&self.source_buckets)
    }

    /// Build the routing table, keeping the declared rule order
    pub fn bucket_mapping(&self) -> Result<BucketMapping> {
        let default = self
            .default_bucket
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| Error::Config("default destination bucket is not configured".into()))?;

        let mut mapping = BucketMapping::new(default);
        for rule in &self.routes {
            mapping = mapping.with_rule(&rule.prefix, &rule.bucket);
        }
        mapping.validate()?;
        Ok(mapping)
    }
}

/// External command that produces the structured database export
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSettings {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Flag emitted once per excluded app, followed by the app name
    #[serde(default = "default_exclude_flag")]
    pub exclude_flag: String,
}

fn default_exclude_flag() -> String {
    "--exclude".to_string()
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: vec![
                "manage.py".to_string(),
                "dumpdata".to_string(),
                "--indent".to_string(),
                "2".to_string(),
                "--natural-foreign".to_string(),
                "--natural-primary".to_string(),
            ],
            exclude_flag: default_exclude_flag(),
        }
    }
}

/// Settings for the database backup run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupSettings {
    #[serde(default = "default_backup_bucket")]
    pub bucket: String,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    #[serde(default = "default_keep_local_days")]
    pub keep_local_days: u32,

    #[serde(default)]
    pub export: ExportSettings,
}

fn default_backup_bucket() -> String {
    "jhbridge-mysql-backups".to_string()
}

fn default_backup_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CONFIG_DIR_NAME)
        .join("backups")
}

fn default_exclude() -> Vec<String> {
    vec!["contenttypes".to_string(), "sessions".to_string()]
}

fn default_keep_local_days() -> u32 {
    7
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            bucket: default_backup_bucket(),
            backup_dir: default_backup_dir(),
            exclude: default_exclude(),
            keep_local_days: default_keep_local_days(),
            export: ExportSettings::default(),
        }
    }
}

impl BackupSettings {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.keep_local_days)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Legacy provider objects are read from
    #[serde(default)]
    pub source: EndpointConfig,

    /// Store objects and backups are written to
    #[serde(default)]
    pub destination: EndpointConfig,

    #[serde(default)]
    pub migration: MigrationSettings,

    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Validate everything a migration run needs before it lists anything
    pub fn validate_for_migration(&self) -> Result<()> {
        self.source.validate("source")?;
        self.destination.validate_with_default_chain("destination")?;
        self.migration.source_buckets()?;
        self.migration.bucket_mapping()?;
        Ok(())
    }

    /// Validate everything a backup run needs
    pub fn validate_for_backup(&self) -> Result<()> {
        self.destination.validate_with_default_chain("destination")?;
        if self.backup.bucket.trim().is_empty() {
            return Err(Error::Config("backup bucket is not configured".to_string()));
        }
        if self.backup.export.program.trim().is_empty() {
            return Err(Error::Config("export program is not configured".to_string()));
        }
        Ok(())
    }
}

/// Locates and loads the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    /// Use the platform config directory (`<config dir>/s3shift/config.toml`)
    pub fn new() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("cannot determine configuration directory".into()))?;
        Ok(Self::with_path(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, falling back to defaults when the file is absent
    pub fn load(&self) -> Result<Config> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                tracing::debug!(path = %self.path.display(), "Loaded configuration");
                Config::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No configuration file, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[source]
endpoint = "https://s3.us-west-004.backblazeb2.com"
region = "us-west-004"
access_key = "b2-key"
secret_key = "b2-secret"

[destination]
access_key = "aws-key"
secret_key = "aws-secret"

[migration]
source_bucket = "legacy-storage"
filter = "exclude-documents"
default_bucket = "documents-prod"

[[migration.routes]]
prefix = "signatures/"
bucket = "signatures-prod"

[[migration.routes]]
prefix = "company_logos/"
bucket = "email-assets"

[backup]
bucket = "db-backups"
keep_local_days = 3

[retry]
max_attempts = 4
initial_backoff_ms = 50
max_backoff_ms = 2000
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.source.region, "us-west-004");
        assert_eq!(config.destination.region, "us-east-1");
        assert_eq!(config.migration.filter, FilterMode::ExcludeDocuments);
        assert_eq!(config.migration.parallel, 1);
        assert_eq!(config.backup.bucket, "db-backups");
        assert_eq!(config.backup.exclude, vec!["contenttypes", "sessions"]);
        assert_eq!(config.backup.retention().keep_local_days, 3);
        assert_eq!(config.retry.max_attempts, 4);
        assert!(config.validate_for_migration().is_ok());
        assert!(config.validate_for_backup().is_ok());
    }

    #[test]
    fn test_routes_keep_declared_order() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let mapping = config.migration.bucket_mapping().unwrap();
        let prefixes: Vec<&str> = mapping.rules().iter().map(|r| r.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["signatures/", "company_logos/"]);
        assert_eq!(mapping.default_bucket(), "documents-prod");
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.source.secret_key = None;
        let err = config.validate_for_migration().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("source credentials"));
    }

    #[test]
    fn test_destination_may_use_default_chain() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.destination.access_key = None;
        config.destination.secret_key = None;
        assert!(!config.destination.has_static_credentials());
        assert!(config.validate_for_migration().is_ok());
        assert!(config.validate_for_backup().is_ok());
    }

    #[test]
    fn test_half_configured_destination_is_config_error() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.destination.secret_key = None;
        let err = config.validate_for_backup().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("destination credentials are incomplete"));
    }

    #[test]
    fn test_source_still_requires_static_keys() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.source.access_key = None;
        config.source.secret_key = None;
        assert!(config.validate_for_migration().is_err());
        assert!(config.source.validate_with_default_chain("source").is_ok());
    }

    #[test]
    fn test_missing_source_bucket_is_config_error() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.migration.source_buckets = vec!["  ".to_string()];
        assert!(matches!(
            config.validate_for_migration(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_default_bucket_is_config_error() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.migration.default_bucket = None;
        assert!(config.migration.bucket_mapping().is_err());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let endpoint = EndpointConfig {
            endpoint: Some("ftp://example.com".to_string()),
            access_key: Some("k".to_string()),
            secret_key: Some("s".to_string()),
            ..Default::default()
        };
        assert!(endpoint.validate("source").is_err());
    }

    #[test]
    fn test_force_path_style() {
        let mut endpoint = EndpointConfig::default();
        assert!(!endpoint.force_path_style());
        endpoint.endpoint = Some("http://localhost:9000".to_string());
        assert!(endpoint.force_path_style());
        endpoint.bucket_lookup = "dns".to_string();
        assert!(!endpoint.force_path_style());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let endpoint = EndpointConfig {
            secret_key: Some("super-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{endpoint:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.toml"));
        let config = manager.load().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ConfigManager::with_path(&path).load().unwrap();
        assert_eq!(config.migration.source_buckets, vec!["legacy-storage"]);
    }

    #[test]
    fn test_source_buckets_list() {
        let config = Config::from_toml(
            r#"
[migration]
source_buckets = ["legacy-storage", "legacy-archive"]
default_bucket = "documents-prod"
"#,
        )
        .unwrap();
        assert_eq!(
            config.migration.source_buckets().unwrap(),
            ["legacy-storage", "legacy-archive"]
        );
    }

    #[test]
    fn test_no_source_buckets_is_config_error() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.migration.source_buckets.clear();
        assert!(matches!(
            config.migration.source_buckets(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_retry_default_is_single_attempt() {
        assert_eq!(RetryConfig::default().max_attempts, 1);
    }
}
