//! Backup artifact naming and state

use std::path::{Path, PathBuf};

use jiff::Timestamp;
use serde::Serialize;

/// Remote prefix every backup is stored under
pub const BACKUP_PREFIX: &str = "backups/";

/// Glob matching local backup files
pub const BACKUP_FILE_PATTERN: &str = "backup_*.json.gz";

/// Format tag attached to uploaded backups
pub const FORMAT_TAG: &str = "json-gzip";

/// `backup_<YYYYMMDD_HHMMSS>.json.gz` for the given instant (UTC)
pub fn backup_file_name(created_at: Timestamp) -> String {
    format!("backup_{}.json.gz", created_at.strftime("%Y%m%d_%H%M%S"))
}

/// Remote key for a local backup file name
pub fn remote_key(file_name: &str) -> String {
    format!("{BACKUP_PREFIX}{file_name}")
}

/// One backup instance as it moves through the pipeline
///
/// Fields are filled stage by stage; once `upload_verified` is set the
/// artifact no longer changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupArtifact {
    local_path: PathBuf,
    compressed_size_bytes: u64,
    sha256_checksum: String,
    created_at: Timestamp,
    remote_key: String,
    remote_bucket: String,
    upload_verified: bool,
}

impl BackupArtifact {
    pub(crate) fn new(backup_dir: &Path, created_at: Timestamp, bucket: &str) -> Self {
        let file_name = backup_file_name(created_at);
        Self {
            local_path: backup_dir.join(&file_name),
            compressed_size_bytes: 0,
            sha256_checksum: String::new(),
            created_at,
            remote_key: remote_key(&file_name),
            remote_bucket: bucket.to_string(),
            upload_verified: false,
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Path of the uncompressed export written before compression
    pub(crate) fn export_path(&self) -> PathBuf {
        self.local_path.with_extension("")
    }

    pub fn compressed_size_bytes(&self) -> u64 {
        self.compressed_size_bytes
    }

    pub fn sha256_checksum(&self) -> &str {
        &self.sha256_checksum
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }

    pub fn remote_bucket(&self) -> &str {
        &self.remote_bucket
    }

    pub fn upload_verified(&self) -> bool {
        self.upload_verified
    }

    /// `s3://bucket/key`
    pub fn remote_uri(&self) -> String {
        format!("s3://{}/{}", self.remote_bucket, self.remote_key)
    }

    pub(crate) fn set_compressed_size(&mut self, size: u64) {
        debug_assert!(!self.upload_verified);
        self.compressed_size_bytes = size;
    }

    pub(crate) fn set_checksum(&mut self, checksum: String) {
        debug_assert!(!self.upload_verified);
        self.sha256_checksum = checksum;
    }

    pub(crate) fn mark_verified(&mut self) {
        self.upload_verified = true;
    }
}
