//! ObjectStore trait and the types that cross it
//!
//! The trait is the seam between the pipelines and a concrete SDK. It is
//! deliberately small: paginated listing, a tri-state metadata probe,
//! streamed get and put, plus the bucket calls the backup pipeline needs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Content type used when a store reports none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A streamed object body
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One stored object as seen at listing time
///
/// A snapshot: it is not refreshed while the object is being processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Full key, unique within its bucket
    pub key: String,

    /// Size in bytes
    pub size: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    pub content_type: String,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

/// One page of a bucket listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectDescriptor>,

    /// Token for the next page; `None` when the listing is exhausted
    pub next_token: Option<String>,
}

/// Metadata returned by a successful probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn with_size(size: u64) -> Self {
        Self {
            size,
            content_type: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// A readable object: its byte stream plus what the store said about it
pub struct ObjectBody {
    pub stream: ByteStream,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Options attached to an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,

    /// Expected length; a body that ends up a different size fails the upload
    pub content_length: Option<u64>,

    /// User metadata (`x-amz-meta-*`)
    pub metadata: BTreeMap<String, String>,

    pub storage_class: Option<String>,
}

/// Bucket lifecycle rule expiring objects under a prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub id: String,
    pub prefix: String,
    pub expiration_days: i32,
    pub noncurrent_days: i32,
}

/// Uniform access to an S3-compatible endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one listing page, starting from `continuation_token`
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    /// Probe an object's metadata
    ///
    /// `Ok(None)` only for a definitive not-found answer. Auth and
    /// transport failures are errors, never "absent".
    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>>;

    /// Open a streamed read of an object
    async fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    /// Upload a stream. Either the whole object is committed or an error is
    /// returned and nothing becomes visible under `key`.
    async fn put_object_stream(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        options: PutOptions,
    ) -> Result<()>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    async fn set_versioning(&self, bucket: &str, enabled: bool) -> Result<()>;

    async fn put_lifecycle_rule(&self, bucket: &str, rule: &LifecycleRule) -> Result<()>;

    /// Time-limited download URL
    async fn presign_get(&self, bucket: &str, key: &str, expires_secs: u64) -> Result<String>;
}
