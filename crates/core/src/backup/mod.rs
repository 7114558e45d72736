//! Database backup pipeline
//!
//! bucket readiness -> export -> compress -> checksum -> verify -> upload ->
//! local retention sweep.

pub mod archive;
pub mod artifact;
pub mod engine;
pub mod export;
pub mod retention;

pub use archive::{compress_file, sha256_file, verify_archive};
pub use artifact::{
    BACKUP_FILE_PATTERN, BACKUP_PREFIX, BackupArtifact, FORMAT_TAG, backup_file_name, remote_key,
};
pub use engine::{BackupEngine, BackupOptions, BackupReport, backup_lifecycle_rule};
pub use export::{CommandExporter, DatabaseExporter};
pub use retention::RetentionPolicy;
