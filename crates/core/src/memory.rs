//! In-memory ObjectStore
//!
//! Behaves like a small S3 endpoint: buckets must exist before use,
//! listings are paginated, and uploads only become visible once the whole
//! body has been received. Failure injection hooks let tests simulate
//! transient read and probe errors.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::error::{Error, Result};
use crate::traits::{
    ByteStream, DEFAULT_CONTENT_TYPE, LifecycleRule, ListPage, ObjectBody, ObjectDescriptor,
    ObjectMeta, ObjectStore, PutOptions,
};

const DEFAULT_PAGE_SIZE: usize = 1000;
const CHUNK_SIZE: usize = 64 * 1024;

/// An object held by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub storage_class: Option<String>,
}

#[derive(Debug, Default)]
struct Bucket {
    objects: BTreeMap<String, StoredObject>,
    versioning: Option<bool>,
    lifecycle: Vec<LifecycleRule>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, Bucket>,
    failing_reads: HashSet<String>,
    failing_heads: HashSet<String>,
    head_size_overrides: HashMap<String, u64>,
    list_calls: usize,
    put_calls: usize,
}

/// ObjectStore backed by process memory
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limit listing pages to `page_size` objects
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_bucket_sync(&self, bucket: &str) {
        self.state().buckets.entry(bucket.to_string()).or_default();
    }

    /// Store an object directly, creating the bucket if needed
    pub fn insert(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
    ) {
        self.state()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .objects
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.into(),
                    content_type: content_type.map(str::to_string),
                    metadata: BTreeMap::new(),
                    storage_class: None,
                },
            );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.state()
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn versioning(&self, bucket: &str) -> Option<bool> {
        self.state().buckets.get(bucket).and_then(|b| b.versioning)
    }

    pub fn lifecycle_rules(&self, bucket: &str) -> Vec<LifecycleRule> {
        self.state()
            .buckets
            .get(bucket)
            .map(|b| b.lifecycle.clone())
            .unwrap_or_default()
    }

    /// Reads of `key` stream its data and then fail mid-transfer
    pub fn fail_reads_for(&self, key: &str) {
        self.state().failing_reads.insert(key.to_string());
    }

    /// Probes of `key` fail with a transient network error
    pub fn fail_heads_for(&self, key: &str) {
        self.state().failing_heads.insert(key.to_string());
    }

    /// Probes of `key` report `size` regardless of the stored data
    pub fn misreport_size(&self, key: &str, size: u64) {
        self.state()
            .head_size_overrides
            .insert(key.to_string(), size);
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn put_calls(&self) -> usize {
        self.state().put_calls
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let mut state = self.state();
        state.list_calls += 1;

        let objects = &state
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {bucket}")))?
            .objects;

        let mut remaining = objects
            .iter()
            .filter(|(key, _)| continuation_token.as_deref().is_none_or(|t| key.as_str() > t));

        let page: Vec<ObjectDescriptor> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(key, object)| ObjectDescriptor {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: None,
                content_type: object
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            })
            .collect();

        let next_token = match remaining.next() {
            Some(_) => page.last().map(|o| o.key.clone()),
            None => None,
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let state = self.state();
        if state.failing_heads.contains(key) {
            return Err(Error::Network(format!("Request timeout probing {bucket}/{key}")));
        }

        let Some(object) = state.buckets.get(bucket).and_then(|b| b.objects.get(key)) else {
            return Ok(None);
        };

        Ok(Some(ObjectMeta {
            size: state
                .head_size_overrides
                .get(key)
                .copied()
                .unwrap_or(object.data.len() as u64),
            content_type: object.content_type.clone(),
            metadata: object.metadata.clone(),
        }))
    }

    async fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let state = self.state();
        let object = state
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key))
            .ok_or_else(|| Error::NotFound(format!("{bucket}/{key}")))?;

        let data = object.data.clone();
        let mut chunks: Vec<Result<Bytes>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
            .collect();

        if state.failing_reads.contains(key) {
            chunks.push(Err(Error::Network(format!(
                "connection reset reading {bucket}/{key}"
            ))));
        }

        Ok(ObjectBody {
            stream: stream::iter(chunks).boxed(),
            content_type: object.content_type.clone(),
            content_length: Some(data.len() as u64),
        })
    }

    async fn put_object_stream(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        options: PutOptions,
    ) -> Result<()> {
        {
            let mut state = self.state();
            state.put_calls += 1;
            if !state.buckets.contains_key(bucket) {
                return Err(Error::NotFound(format!("Bucket not found: {bucket}")));
            }
        }

        let data = body
            .try_fold(BytesMut::new(), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok(buffer)
            })
            .await?
            .freeze();

        if let Some(expected) = options.content_length
            && expected != data.len() as u64
        {
            return Err(Error::Integrity(format!(
                "upload of {bucket}/{key} received {} bytes, expected {expected}",
                data.len()
            )));
        }

        let mut state = self.state();
        let target = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {bucket}")))?;
        target.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: options.content_type,
                metadata: options.metadata,
                storage_class: options.storage_class,
            },
        );
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.state().buckets.contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.state();
        if state.buckets.contains_key(bucket) {
            return Err(Error::Conflict(format!("Bucket already exists: {bucket}")));
        }
        state.buckets.insert(bucket.to_string(), Bucket::default());
        Ok(())
    }

    async fn set_versioning(&self, bucket: &str, enabled: bool) -> Result<()> {
        let mut state = self.state();
        let target = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {bucket}")))?;
        target.versioning = Some(enabled);
        Ok(())
    }

    async fn put_lifecycle_rule(&self, bucket: &str, rule: &LifecycleRule) -> Result<()> {
        let mut state = self.state();
        let target = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| Error::NotFound(format!("Bucket not found: {bucket}")))?;
        target.lifecycle.retain(|r| r.id != rule.id);
        target.lifecycle.push(rule.clone());
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_secs: u64) -> Result<String> {
        Ok(format!("memory://{bucket}/{key}?expires={expires_secs}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(data: &'static [u8]) -> ByteStream {
        stream::iter(vec![Ok(Bytes::from_static(data))]).boxed()
    }

    #[tokio::test]
    async fn test_put_then_head() {
        let store = MemoryStore::new();
        store.create_bucket_sync("b");
        store
            .put_object_stream("b", "k", body(b"hello"), PutOptions::default())
            .await
            .unwrap();

        let meta = store.head_object("b", "k").await.unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert!(store.head_object("b", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_nothing_behind() {
        let store = MemoryStore::new();
        store.create_bucket_sync("b");
        let failing: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::Network("connection reset".to_string())),
        ])
        .boxed();

        let result = store
            .put_object_stream("b", "k", failing, PutOptions::default())
            .await;
        assert!(result.is_err());
        assert!(store.object("b", "k").is_none());
    }

    #[tokio::test]
    async fn test_length_mismatch_rejected() {
        let store = MemoryStore::new();
        store.create_bucket_sync("b");
        let options = PutOptions {
            content_length: Some(10),
            ..Default::default()
        };
        let result = store.put_object_stream("b", "k", body(b"short"), options).await;
        assert!(matches!(result, Err(Error::Integrity(_))));
        assert!(store.object("b", "k").is_none());
    }

    #[tokio::test]
    async fn test_put_to_missing_bucket() {
        let store = MemoryStore::new();
        let result = store
            .put_object_stream("nope", "k", body(b"x"), PutOptions::default())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failing_head_is_error_not_absent() {
        let store = MemoryStore::new();
        store.fail_heads_for("k");
        assert!(store.head_object("b", "k").await.is_err());
    }

    #[tokio::test]
    async fn test_create_bucket_twice_conflicts() {
        let store = MemoryStore::new();
        store.create_bucket("b").await.unwrap();
        assert!(matches!(
            store.create_bucket("b").await,
            Err(Error::Conflict(_))
        ));
    }
}
