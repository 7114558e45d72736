//! backup command - Export, compress, verify and upload a database backup

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use shift_core::{BackupEngine, BackupOptions, CommandExporter, Config};
use shift_s3::S3Client;

use super::ConfigSource;
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Back up the database to S3
#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Destination bucket (created with versioning and expiry if missing)
    #[arg(long, env = "BACKUP_BUCKET")]
    pub bucket: Option<String>,

    /// Local directory for backup archives
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// App to leave out of the export; repeatable (replaces configured list)
    #[arg(long = "exclude", value_name = "APP")]
    pub exclude: Vec<String>,

    /// Days to keep local archives
    #[arg(long)]
    pub keep_local_days: Option<u32>,
}

/// Execute the backup command
pub async fn execute(
    args: BackupArgs,
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
    apply_overrides(&mut config, &args);

    if let Err(e) = config.validate_for_backup() {
        formatter.error(&e.to_string());
        return ExitCode::from_error(&e);
    }

    let client = match S3Client::new(&config.destination, config.retry.clone()).await {
        Ok(c) => c,
        Err(e) => {
            formatter.error(&format!("Failed to create S3 client: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let engine = BackupEngine::new(
        Arc::new(client),
        Arc::new(CommandExporter::from(&config.backup.export)),
        BackupOptions::from_settings(&config.backup),
    );

    let spinner = formatter.show_progress().then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!(
            "Backing up to {}",
            formatter.style_name(&config.backup.bucket)
        ));
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        pb
    });

    let result = engine.run().await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match result {
        Ok(report) => {
            formatter.output(&report);
            formatter.success("Backup uploaded and verified");
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&format!("Backup failed: {e}"));
            ExitCode::from_error(&e)
        }
    }
}

fn apply_overrides(config: &mut Config, args: &BackupArgs) {
    let backup = &mut config.backup;
    if let Some(bucket) = &args.bucket {
        backup.bucket = bucket.clone();
    }
    if let Some(dir) = &args.backup_dir {
        backup.backup_dir = dir.clone();
    }
    if !args.exclude.is_empty() {
        backup.exclude = args.exclude.clone();
    }
    if let Some(days) = args.keep_local_days {
        backup.keep_local_days = days;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        let args = BackupArgs {
            bucket: Some("db-backups".to_string()),
            backup_dir: Some(PathBuf::from("/srv/backups")),
            exclude: vec!["auth".to_string()],
            keep_local_days: Some(0),
        };

        apply_overrides(&mut config, &args);

        let options = BackupOptions::from_settings(&config.backup);
        assert_eq!(options.bucket, "db-backups");
        assert_eq!(options.backup_dir, PathBuf::from("/srv/backups"));
        assert_eq!(options.exclude, vec!["auth"]);
        assert_eq!(options.retention.keep_local_days, 0);
    }

    #[test]
    fn test_defaults_kept_without_flags() {
        let mut config = Config::default();
        let args = BackupArgs {
            bucket: None,
            backup_dir: None,
            exclude: Vec::new(),
            keep_local_days: None,
        };

        apply_overrides(&mut config, &args);

        assert_eq!(config.backup.bucket, "jhbridge-mysql-backups");
        assert_eq!(config.backup.exclude, vec!["contenttypes", "sessions"]);
        assert_eq!(config.backup.keep_local_days, 7);
    }
}
