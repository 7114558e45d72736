//! migrate command - Copy objects from the source endpoint into routed buckets
//!
//! Re-running is the recovery path after a partial failure: objects that
//! already exist at the destination with the same size are skipped.

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use shift_core::{
    Config, FilterMode, MigrationEvent, MigrationOptions, MigrationOutcome, MigrationSummary,
    Migrator, RouteRule,
};
use shift_s3::S3Client;

use super::{ConfigSource, parse_route};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Copy objects from the source endpoint to the destination buckets
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Source bucket; repeat to migrate several in order (replaces configured buckets)
    #[arg(
        long = "source-bucket",
        value_name = "BUCKET",
        env = "SOURCE_BUCKET",
        value_delimiter = ','
    )]
    pub source_buckets: Vec<String>,

    /// Bucket for keys no routing rule matches
    #[arg(long)]
    pub default_bucket: Option<String>,

    /// Routing rule PREFIX=BUCKET; repeat in priority order (replaces configured rules)
    #[arg(long = "route", value_name = "PREFIX=BUCKET", value_parser = parse_route)]
    pub routes: Vec<RouteRule>,

    /// Document filter: none, include or exclude
    #[arg(long)]
    pub filter: Option<FilterMode>,

    /// Plan only: classify objects without transferring anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of objects processed concurrently
    #[arg(short = 'P', long)]
    pub parallel: Option<usize>,

    /// Serverless-style JSON event; prints the JSON summary body
    #[arg(long, value_name = "JSON", conflicts_with_all = ["filter", "dry_run"])]
    pub event: Option<String>,
}

/// Execute the migrate command
pub async fn execute(
    args: MigrateArgs,
    source: &ConfigSource,
    output_config: OutputConfig,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let event = match args.event.as_deref().map(MigrationEvent::from_json).transpose() {
        Ok(event) => event,
        Err(e) => {
            formatter.error(&format!("Invalid event: {e}"));
            return ExitCode::UsageError;
        }
    };

    let mut config = match source.load() {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::from_anyhow(&e);
        }
    };
    apply_overrides(&mut config, &args, event.as_ref());

    if let Err(e) = config.validate_for_migration() {
        formatter.error(&e.to_string());
        return ExitCode::from_error(&e);
    }

    let (source_buckets, mapping) =
        match (config.migration.source_buckets(), config.migration.bucket_mapping()) {
            (Ok(buckets), Ok(mapping)) => (buckets.to_vec(), mapping),
            (Err(e), _) | (_, Err(e)) => {
                formatter.error(&e.to_string());
                return ExitCode::from_error(&e);
            }
        };

    for rule in mapping.shadowed_rules() {
        formatter.warning(&format!(
            "Rule '{}' -> {} can never match: an earlier prefix covers it",
            rule.prefix, rule.bucket
        ));
    }

    let source_client = match S3Client::new(&config.source, config.retry.clone()).await {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to create source client: {e}"));
            return ExitCode::from_error(&e);
        }
    };
    let destination_client = match S3Client::new(&config.destination, config.retry.clone()).await
    {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to create destination client: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let options = MigrationOptions::from_buckets(source_buckets)
        .filter(config.migration.filter)
        .dry_run(config.migration.dry_run)
        .parallel(config.migration.parallel);
    let migrator = Migrator::new(&source_client, &destination_client, &mapping, options);

    let progress = formatter.show_progress().then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.green} {pos} objects [{elapsed_precise}] {wide_msg}")
        {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb
    });

    let on_outcome = |outcome: &MigrationOutcome| {
        let Some(pb) = &progress else {
            return;
        };
        pb.inc(1);
        pb.set_message(outcome.key().to_string());
        match outcome {
            MigrationOutcome::Migrated { .. } => {
                pb.println(format!("+ {}", formatter.style_key(&outcome.describe())));
            }
            MigrationOutcome::Errored { .. } => {
                pb.println(format!("✗ {}", outcome.describe()));
            }
            MigrationOutcome::Skipped { .. } => {}
        }
    };

    let result = tokio::select! {
        result = migrator.run_with(on_outcome) => result,
        _ = tokio::signal::ctrl_c() => {
            if let Some(pb) = &progress {
                pb.abandon_with_message("interrupted");
            }
            formatter.error(
                "Interrupted; objects copied so far are complete and a re-run will skip them",
            );
            return ExitCode::Interrupted;
        }
    };

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            formatter.error(&format!("Migration aborted: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    if event.is_some() {
        formatter.json(&MigrationSummary::from(&report));
    } else {
        formatter.output(&report);
        if !formatter.is_json() {
            for outcome in report.errors() {
                formatter.warning(&outcome.describe());
            }
        }
    }

    if report.has_errors() {
        ExitCode::GeneralError
    } else {
        ExitCode::Success
    }
}

/// Fold command-line flags (or the event) into the loaded configuration
fn apply_overrides(config: &mut Config, args: &MigrateArgs, event: Option<&MigrationEvent>) {
    let migration = &mut config.migration;
    if !args.source_buckets.is_empty() {
        migration.source_buckets = args.source_buckets.clone();
    }
    if let Some(bucket) = &args.default_bucket {
        migration.default_bucket = Some(bucket.clone());
    }
    if !args.routes.is_empty() {
        migration.routes = args.routes.clone();
    }
    if let Some(parallel) = args.parallel {
        migration.parallel = parallel;
    }

    match event {
        Some(event) => {
            migration.filter = event.filter();
            migration.dry_run = event.dry_run;
        }
        None => {
            if let Some(filter) = args.filter {
                migration.filter = filter;
            }
            migration.dry_run |= args.dry_run;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> MigrateArgs {
        MigrateArgs {
            source_buckets: Vec::new(),
            default_bucket: None,
            routes: Vec::new(),
            filter: None,
            dry_run: false,
            parallel: None,
            event: None,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let args = MigrateArgs {
            source_buckets: vec!["legacy".to_string(), "archive".to_string()],
            default_bucket: Some("documents-prod".to_string()),
            routes: vec![parse_route("signatures/=signatures-prod").unwrap()],
            filter: Some(FilterMode::ExcludeDocuments),
            dry_run: true,
            parallel: Some(4),
            ..args()
        };

        apply_overrides(&mut config, &args, None);

        let migration = &config.migration;
        assert_eq!(migration.source_buckets, vec!["legacy", "archive"]);
        assert_eq!(migration.filter, FilterMode::ExcludeDocuments);
        assert!(migration.dry_run);
        assert_eq!(migration.parallel, 4);
        let mapping = migration.bucket_mapping().unwrap();
        assert_eq!(mapping.resolve("signatures/a.png"), "signatures-prod");
        assert_eq!(mapping.resolve("other"), "documents-prod");
    }

    #[test]
    fn test_event_decides_filter_and_dry_run() {
        let mut config = Config::default();
        config.migration.dry_run = true;
        let event = MigrationEvent::from_json(r#"{"filter_mode": "exclude"}"#).unwrap();

        apply_overrides(&mut config, &args(), Some(&event));

        assert_eq!(config.migration.filter, FilterMode::ExcludeDocuments);
        assert!(!config.migration.dry_run);
    }

    #[test]
    fn test_configured_routes_kept_without_flags() {
        let mut config = Config::default();
        config.migration.routes = vec![parse_route("contracts/=contracts-prod").unwrap()];
        config.migration.source_buckets = vec!["legacy".to_string()];

        apply_overrides(&mut config, &args(), None);

        assert_eq!(config.migration.routes.len(), 1);
        assert_eq!(config.migration.source_buckets, vec!["legacy"]);
    }
}
