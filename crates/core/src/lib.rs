//! shift-core: Core library for the s3shift migration and backup toolchain
//!
//! This crate provides the SDK-independent pieces of s3shift, including:
//! - Configuration loading and validation
//! - The `ObjectStore` trait and object descriptors
//! - Ordered prefix routing of keys to destination buckets
//! - The migration engine and its run report
//! - The database backup pipeline (export, compress, checksum, upload, sweep)
//!
//! Nothing in here talks to a concrete S3 SDK, so every pipeline can be
//! driven against the in-memory store (feature `testing`) in tests.

pub mod backup;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod listing;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod migrate;
pub mod report;
pub mod retry;
pub mod routing;
pub mod traits;

pub use backup::{
    BackupArtifact, BackupEngine, BackupOptions, BackupReport, CommandExporter, DatabaseExporter,
    RetentionPolicy,
};
pub use config::{
    BackupSettings, Config, ConfigManager, EndpointConfig, ExportSettings, MigrationSettings,
    RetryConfig,
};
pub use error::{Error, Result};
pub use event::{MigrationEvent, MigrationSummary};
pub use filter::{DOCUMENT_EXTENSIONS, FilterMode, is_document};
pub use listing::list_objects;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;
pub use migrate::{MigrationOptions, Migrator};
pub use report::{MigrationOutcome, RunReport, SkipReason};
pub use retry::{RetryBuilder, is_retryable_error, retry_with_backoff};
pub use routing::{BucketMapping, RouteRule, resolve_bucket};
pub use traits::{
    ByteStream, DEFAULT_CONTENT_TYPE, LifecycleRule, ListPage, ObjectBody, ObjectDescriptor,
    ObjectMeta, ObjectStore, PutOptions,
};
