//! Subcommands and the configuration plumbing they share

pub mod backup;
pub mod completions;
pub mod ls;
pub mod migrate;
pub mod route;

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use shift_core::{Config, ConfigManager, EndpointConfig, RouteRule};

/// Configuration file location
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to the configuration file
    #[arg(long, global = true, env = "S3SHIFT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Credential overrides for the source (legacy) endpoint
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Source endpoint URL
    #[arg(long = "source-endpoint",
        id = "source_endpoint", global = true, env = "SOURCE_ENDPOINT_URL")]
    pub endpoint: Option<String>,

    #[arg(long = "source-region",
        id = "source_region", global = true, env = "SOURCE_REGION")]
    pub region: Option<String>,

    #[arg(
        long = "source-access-key",
        id = "source_access_key",
        global = true,
        env = "SOURCE_ACCESS_KEY_ID",
        hide_env_values = true
    )]
    pub access_key: Option<String>,

    #[arg(
        long = "source-secret-key",
        id = "source_secret_key",
        global = true,
        env = "SOURCE_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    pub secret_key: Option<String>,
}

/// Credential overrides for the destination endpoint
#[derive(Args, Debug, Clone, Default)]
pub struct DestinationArgs {
    /// Destination endpoint URL (omit for AWS)
    #[arg(long = "dest-endpoint",
        id = "dest_endpoint", global = true, env = "AWS_ENDPOINT_URL")]
    pub endpoint: Option<String>,

    #[arg(long = "dest-region",
        id = "dest_region", global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    #[arg(
        long = "dest-access-key",
        id = "dest_access_key",
        global = true,
        env = "AWS_ACCESS_KEY_ID",
        hide_env_values = true
    )]
    pub access_key: Option<String>,

    #[arg(
        long = "dest-secret-key",
        id = "dest_secret_key",
        global = true,
        env = "AWS_SECRET_ACCESS_KEY",
        hide_env_values = true
    )]
    pub secret_key: Option<String>,
}

/// Everything needed to build a `Config`
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    pub config: ConfigArgs,
    pub source: SourceArgs,
    pub destination: DestinationArgs,
}

impl ConfigSource {
    /// Load the file (or defaults) and apply flag/env overrides
    pub fn load(&self) -> anyhow::Result<Config> {
        let manager = match &self.config.config {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new()?,
        };
        let mut config = manager
            .load()
            .with_context(|| format!("loading {}", manager.path().display()))?;

        apply_endpoint(
            &mut config.source,
            &self.source.endpoint,
            &self.source.region,
            &self.source.access_key,
            &self.source.secret_key,
        );
        apply_endpoint(
            &mut config.destination,
            &self.destination.endpoint,
            &self.destination.region,
            &self.destination.access_key,
            &self.destination.secret_key,
        );

        tracing::debug!(?config, "Effective configuration");
        Ok(config)
    }
}

fn apply_endpoint(
    target: &mut EndpointConfig,
    endpoint: &Option<String>,
    region: &Option<String>,
    access_key: &Option<String>,
    secret_key: &Option<String>,
) {
    if endpoint.is_some() {
        target.endpoint.clone_from(endpoint);
    }
    if let Some(region) = region {
        target.region.clone_from(region);
    }
    if access_key.is_some() {
        target.access_key.clone_from(access_key);
    }
    if secret_key.is_some() {
        target.secret_key.clone_from(secret_key);
    }
}

/// Parse a `PREFIX=BUCKET` routing rule
pub fn parse_route(value: &str) -> Result<RouteRule, String> {
    match value.split_once('=') {
        Some((prefix, bucket)) if !prefix.is_empty() && !bucket.is_empty() => Ok(RouteRule {
            prefix: prefix.to_string(),
            bucket: bucket.to_string(),
        }),
        _ => Err(format!("expected PREFIX=BUCKET, got '{value}'")),
    }
}
