//! route command - Show which bucket each key would be routed to
//!
//! Rules are first-match in declaration order, so a broad prefix declared
//! early can hide a narrower one. This command makes that visible before a
//! migration runs.

use clap::Args;
use comfy_table::{Table, presets::UTF8_BORDERS_ONLY};
use serde::Serialize;
use shift_core::{BucketMapping, RouteRule};

use super::{ConfigSource, parse_route};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Resolve keys through the routing table
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Object keys to resolve
    #[arg(required = true)]
    pub keys: Vec<String>,

    /// Bucket for keys no rule matches
    #[arg(long)]
    pub default_bucket: Option<String>,

    /// Routing rule PREFIX=BUCKET; repeat in priority order (replaces configured rules)
    #[arg(long = "route", value_name = "PREFIX=BUCKET", value_parser = parse_route)]
    pub routes: Vec<RouteRule>,
}

#[derive(Debug, Serialize)]
struct Resolution {
    key: String,
    bucket: String,
    /// Prefix of the deciding rule; `None` when the default applied
    matched_prefix: Option<String>,
}

#[derive(Debug, Serialize)]
struct RouteOutput {
    resolutions: Vec<Resolution>,
    shadowed_rules: Vec<RouteRule>,
}

/// Execute the route command
pub fn execute(
    args: RouteArgs,
    source: &ConfigSource,
    output_config: OutputConfig,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let mut config = match source.load() {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::from_anyhow(&e);
        }
    };
    if let Some(bucket) = args.default_bucket {
        config.migration.default_bucket = Some(bucket);
    }
    if !args.routes.is_empty() {
        config.migration.routes = args.routes;
    }

    let mapping = match config.migration.bucket_mapping() {
        Ok(m) => m,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from_error(&e);
        }
    };

    let output = RouteOutput {
        resolutions: resolve_all(&mapping, &args.keys),
        shadowed_rules: mapping.shadowed_rules().into_iter().cloned().collect(),
    };

    if formatter.is_json() {
        formatter.json(&output);
        return ExitCode::Success;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Key", "Bucket", "Rule"]);
    for resolution in &output.resolutions {
        table.add_row(vec![
            resolution.key.clone(),
            resolution.bucket.clone(),
            resolution
                .matched_prefix
                .clone()
                .unwrap_or_else(|| "(default)".to_string()),
        ]);
    }
    formatter.println(&table.to_string());

    for rule in &output.shadowed_rules {
        formatter.warning(&format!(
            "Rule '{}' -> {} can never match: an earlier prefix covers it",
            rule.prefix, rule.bucket
        ));
    }
    if !formatter.is_quiet() {
        formatter.println(&formatter.style_dim(&format!(
            "{} rule(s), default bucket {}",
            mapping.rules().len(),
            formatter.style_name(mapping.default_bucket())
        )));
    }

    ExitCode::Success
}

fn resolve_all(mapping: &BucketMapping, keys: &[String]) -> Vec<Resolution> {
    keys.iter()
        .map(|key| Resolution {
            key: key.clone(),
            bucket: mapping.resolve(key).to_string(),
            matched_prefix: mapping.matching_rule(key).map(|r| r.prefix.clone()),
        })
        .collect()
}
