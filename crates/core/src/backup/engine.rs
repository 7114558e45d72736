//! Backup pipeline driver

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use futures::{StreamExt, TryStreamExt};
use jiff::Timestamp;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use super::archive::{compress_file, sha256_file, verify_archive};
use super::artifact::{BACKUP_PREFIX, BackupArtifact, FORMAT_TAG};
use super::export::DatabaseExporter;
use super::retention::RetentionPolicy;
use crate::config::BackupSettings;
use crate::error::{Error, Result};
use crate::traits::{LifecycleRule, ObjectStore, PutOptions};

const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";
const DEFAULT_STORAGE_CLASS: &str = "STANDARD_IA";
const DEFAULT_URL_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;
const URL_PREVIEW_CHARS: usize = 100;

/// Rule installed on a freshly created backup bucket
pub fn backup_lifecycle_rule() -> LifecycleRule {
    LifecycleRule {
        id: "DeleteOldBackups".to_string(),
        prefix: BACKUP_PREFIX.to_string(),
        expiration_days: 30,
        noncurrent_days: 7,
    }
}

/// Inputs for a backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    pub bucket: String,
    pub backup_dir: PathBuf,
    /// Apps left out of the export
    pub exclude: Vec<String>,
    pub retention: RetentionPolicy,
    pub storage_class: String,
    pub url_expiry_secs: u64,
}

impl BackupOptions {
    pub fn new(bucket: impl Into<String>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            backup_dir: backup_dir.into(),
            exclude: Vec::new(),
            retention: RetentionPolicy::default(),
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            url_expiry_secs: DEFAULT_URL_EXPIRY_SECS,
        }
    }

    pub fn from_settings(settings: &BackupSettings) -> Self {
        Self {
            exclude: settings.exclude.clone(),
            retention: settings.retention(),
            ..Self::new(&settings.bucket, &settings.backup_dir)
        }
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }
}

/// Result of a successful backup run
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub artifact: BackupArtifact,

    /// Pre-signed download URL; absent if signing failed
    pub download_url: Option<String>,

    pub uncompressed_size: u64,

    /// Compressed size over uncompressed size
    pub compression_ratio: f64,

    /// Local archives removed by the retention sweep
    pub swept: Vec<PathBuf>,
}

impl fmt::Display for BackupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Backup: {}", self.artifact.local_path().display())?;
        writeln!(f, "Remote: {}", self.artifact.remote_uri())?;
        writeln!(
            f,
            "Size: {} bytes ({:.1}% of {} bytes uncompressed)",
            self.artifact.compressed_size_bytes(),
            self.compression_ratio * 100.0,
            self.uncompressed_size
        )?;
        writeln!(f, "SHA-256: {}", self.artifact.sha256_checksum())?;
        if let Some(url) = &self.download_url {
            match url.char_indices().nth(URL_PREVIEW_CHARS) {
                Some((cut, _)) => writeln!(f, "Download: {}...", &url[..cut])?,
                None => writeln!(f, "Download: {url}")?,
            }
        }
        write!(f, "Removed {} expired local backup(s)", self.swept.len())
    }
}

/// Runs export, compression, verification, upload and retention in order
pub struct BackupEngine {
    store: Arc<dyn ObjectStore>,
    exporter: Arc<dyn DatabaseExporter>,
    options: BackupOptions,
}

impl BackupEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        exporter: Arc<dyn DatabaseExporter>,
        options: BackupOptions,
    ) -> Self {
        Self {
            store,
            exporter,
            options,
        }
    }

    pub fn options(&self) -> &BackupOptions {
        &self.options
    }

    pub async fn run(&self) -> Result<BackupReport> {
        self.run_at(Timestamp::now()).await
    }

    /// Run the pipeline as if started at `now`
    ///
    /// `now` names the artifact and anchors the retention cutoff.
    pub async fn run_at(&self, now: Timestamp) -> Result<BackupReport> {
        self.ensure_bucket().await?;

        tokio::fs::create_dir_all(&self.options.backup_dir).await?;
        let mut artifact = BackupArtifact::new(&self.options.backup_dir, now, &self.options.bucket);

        let staged = match self.export_and_upload(&mut artifact).await {
            Ok(staged) => staged,
            Err(e) => {
                remove_quietly(&artifact.export_path()).await;
                remove_quietly(artifact.local_path()).await;
                return Err(e);
            }
        };

        let swept = self
            .options
            .retention
            .sweep(&self.options.backup_dir, SystemTime::from(now))?;

        let compression_ratio = if staged.uncompressed_size == 0 {
            0.0
        } else {
            artifact.compressed_size_bytes() as f64 / staged.uncompressed_size as f64
        };

        Ok(BackupReport {
            artifact,
            download_url: staged.download_url,
            uncompressed_size: staged.uncompressed_size,
            compression_ratio,
            swept,
        })
    }

    /// Create the bucket with versioning and the expiry rule if it is missing
    async fn ensure_bucket(&self) -> Result<()> {
        let bucket = &self.options.bucket;
        if self.store.bucket_exists(bucket).await? {
            tracing::debug!(bucket, "Backup bucket exists");
            return Ok(());
        }

        tracing::info!(bucket, "Creating backup bucket");
        self.store.create_bucket(bucket).await?;
        self.store.set_versioning(bucket, true).await?;
        self.store
            .put_lifecycle_rule(bucket, &backup_lifecycle_rule())
            .await?;
        Ok(())
    }

    async fn export_and_upload(&self, artifact: &mut BackupArtifact) -> Result<Staged> {
        let export_path = artifact.export_path();
        let archive_path = artifact.local_path().to_path_buf();

        let compressed = {
            let exporter = Arc::clone(&self.exporter);
            let exclude = self.options.exclude.clone();
            let export_path = export_path.clone();
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || {
                export_to_file(exporter.as_ref(), &exclude, &export_path)?;
                let size = compress_file(&export_path, &archive_path)?;
                std::fs::remove_file(&export_path)?;
                Ok::<_, Error>(size)
            })
            .await
            .map_err(|e| Error::General(format!("export task failed: {e}")))??
        };
        artifact.set_compressed_size(compressed);
        tracing::info!(path = %archive_path.display(), bytes = compressed, "Export compressed");

        let (checksum, uncompressed_size) = {
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || {
                let checksum = sha256_file(&archive_path)?;
                let uncompressed = verify_archive(&archive_path)?;
                Ok::<_, Error>((checksum, uncompressed))
            })
            .await
            .map_err(|e| Error::General(format!("verification task failed: {e}")))??
        };
        artifact.set_checksum(checksum);
        tracing::info!(sha256 = artifact.sha256_checksum(), "Archive verified");

        self.upload(artifact).await?;
        artifact.mark_verified();

        let download_url = match self
            .store
            .presign_get(
                artifact.remote_bucket(),
                artifact.remote_key(),
                self.options.url_expiry_secs,
            )
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "Could not generate download URL");
                None
            }
        };

        Ok(Staged {
            uncompressed_size,
            download_url,
        })
    }

    async fn upload(&self, artifact: &BackupArtifact) -> Result<()> {
        let file = tokio::fs::File::open(artifact.local_path()).await?;
        let body = ReaderStream::new(file).map_err(Error::from).boxed();

        let metadata = BTreeMap::from([
            (
                "checksum-sha256".to_string(),
                artifact.sha256_checksum().to_string(),
            ),
            ("backup-date".to_string(), artifact.created_at().to_string()),
            ("format".to_string(), FORMAT_TAG.to_string()),
        ]);
        let options = PutOptions {
            content_type: Some(ARCHIVE_CONTENT_TYPE.to_string()),
            content_length: Some(artifact.compressed_size_bytes()),
            metadata,
            storage_class: Some(self.options.storage_class.clone()),
        };

        tracing::info!(uri = %artifact.remote_uri(), "Uploading backup");
        self.store
            .put_object_stream(artifact.remote_bucket(), artifact.remote_key(), body, options)
            .await?;

        let remote = self
            .store
            .head_object(artifact.remote_bucket(), artifact.remote_key())
            .await?;
        match remote {
            Some(meta) if meta.size == artifact.compressed_size_bytes() => Ok(()),
            Some(meta) => Err(Error::Integrity(format!(
                "{} is {} bytes remotely, {} bytes locally",
                artifact.remote_uri(),
                meta.size,
                artifact.compressed_size_bytes()
            ))),
            None => Err(Error::Integrity(format!(
                "{} not found after upload",
                artifact.remote_uri()
            ))),
        }
    }
}

struct Staged {
    uncompressed_size: u64,
    download_url: Option<String>,
}

fn export_to_file(exporter: &dyn DatabaseExporter, exclude: &[String], path: &Path) -> Result<()> {
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    exporter.export(exclude, &mut out)?;
    out.flush()?;
    Ok(())
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial backup file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial backup file"),
    }
}
