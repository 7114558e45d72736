//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from shift-core.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream as SdkByteStream;
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, BucketLocationConstraint, BucketVersioningStatus,
    CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration, ExpirationStatus,
    LifecycleExpiration, LifecycleRuleFilter, NoncurrentVersionExpiration, StorageClass,
    VersioningConfiguration,
};
use bytes::Bytes;
use futures::StreamExt;
use jiff::Timestamp;
use shift_core::{
    ByteStream, DEFAULT_CONTENT_TYPE, EndpointConfig, Error, LifecycleRule, ListPage, ObjectBody,
    ObjectDescriptor, ObjectMeta, ObjectStore, PutOptions, Result, RetryConfig,
    is_retryable_error, retry_with_backoff,
};

use crate::upload::{PART_SIZE, PartReader};

/// Convert an SDK timestamp, dropping values jiff cannot represent
pub fn to_timestamp(dt: &aws_smithy_types::DateTime) -> Option<Timestamp> {
    Timestamp::new(dt.secs(), dt.subsec_nanos() as i32).ok()
}

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    region: String,
    retry: RetryConfig,
}

impl S3Client {
    /// Create a client for one endpoint
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the SDK's default provider chain (environment, profile, instance or
    /// task role).
    pub async fn new(endpoint: &EndpointConfig, retry: RetryConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(endpoint.region.clone()));

        if let (Some(access_key), Some(secret_key), true) = (
            &endpoint.access_key,
            &endpoint.secret_key,
            endpoint.has_static_credentials(),
        ) {
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None, // session token
                None, // expiry
                "s3shift-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(url) = &endpoint.endpoint {
            loader = loader.endpoint_url(url);
        }

        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(endpoint.force_path_style())
            .build();

        tracing::debug!(
            endpoint = endpoint.endpoint.as_deref().unwrap_or("aws"),
            region = %endpoint.region,
            "S3 client created"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            region: endpoint.region.clone(),
            retry,
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E>) -> String {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {err}");
                if let Some(code) = meta.headers().get("x-amz-error-code") {
                    msg.push_str(&format!(" (code: {code})"));
                }
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {err:?}")
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {err:?}")
            }
            SdkError::ResponseError(err) => {
                format!("Response error: {err:?}")
            }
            _ => error.to_string(),
        }
    }

    /// Map an SDK error onto the shift-core taxonomy
    fn map_sdk_error<E>(context: &str, error: &SdkError<E>) -> Error
    where
        E: ProvideErrorMetadata + std::fmt::Display,
    {
        let message = format!("{context}: {}", Self::format_sdk_error(error));
        match error {
            SdkError::ConstructionFailure(_) => Error::General(message),
            SdkError::ServiceError(_) | SdkError::ResponseError(_) => {
                let status = error.raw_response().map(|r| r.status().as_u16());
                classify(error.code(), status, message)
            }
            _ => Error::Network(message),
        }
    }

    fn is_head_not_found(error: &SdkError<aws_sdk_s3::operation::head_object::HeadObjectError>) -> bool {
        error.as_service_error().is_some_and(|e| e.is_not_found())
            || error.raw_response().is_some_and(|r| r.status().as_u16() == 404)
    }

    async fn list_page_once(&self, bucket: &str, token: Option<String>) -> Result<ListPage> {
        let response = self
            .inner
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("list {bucket}"), &e))?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectDescriptor {
                    key: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified().and_then(to_timestamp),
                    content_type: DEFAULT_CONTENT_TYPE.to_string(),
                })
            })
            .collect();

        let next_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn head_object_once(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        let response = match self.inner.head_object().bucket(bucket).key(key).send().await {
            Ok(response) => response,
            Err(e) if Self::is_head_not_found(&e) => return Ok(None),
            Err(e) => return Err(Self::map_sdk_error(&format!("head {bucket}/{key}"), &e)),
        };

        Ok(Some(ObjectMeta {
            size: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response.content_type().map(str::to_string),
            metadata: response
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        }))
    }

    async fn bucket_exists_once(&self, bucket: &str) -> Result<bool> {
        match self.inner.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error().is_some_and(|s| s.is_not_found())
                    || e.raw_response().is_some_and(|r| r.status().as_u16() == 404) =>
            {
                Ok(false)
            }
            Err(e) => Err(Self::map_sdk_error(&format!("head bucket {bucket}"), &e)),
        }
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<()> {
        let mut request = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(data.len() as i64)
            .set_metadata(user_metadata(options))
            .body(SdkByteStream::from(data));

        if let Some(ct) = &options.content_type {
            request = request.content_type(ct);
        }
        if let Some(sc) = &options.storage_class {
            request = request.storage_class(StorageClass::from(sc.as_str()));
        }

        request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("put {bucket}/{key}"), &e))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        first: Bytes,
        mut reader: PartReader,
        options: &PutOptions,
    ) -> Result<()> {
        let mut request = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_metadata(user_metadata(options));
        if let Some(ct) = &options.content_type {
            request = request.content_type(ct);
        }
        if let Some(sc) = &options.storage_class {
            request = request.storage_class(StorageClass::from(sc.as_str()));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("start upload {bucket}/{key}"), &e))?;
        let upload_id = response
            .upload_id()
            .ok_or_else(|| Error::General(format!("no upload id for {bucket}/{key}")))?
            .to_string();

        let result = self
            .upload_parts(bucket, key, &upload_id, first, &mut reader, options)
            .await;

        if let Err(e) = result {
            tracing::warn!(bucket, key, error = %e, "Aborting multipart upload");
            if let Err(abort) = self
                .inner
                .abort_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                tracing::warn!(
                    bucket,
                    key,
                    error = %Self::format_sdk_error(&abort),
                    "Failed to abort multipart upload"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first: Bytes,
        reader: &mut PartReader,
        options: &PutOptions,
    ) -> Result<()> {
        let mut parts = Vec::new();
        let mut total: u64 = 0;
        let mut next = Some(first);
        let mut part_number: i32 = 1;

        while let Some(data) = next {
            total += data.len() as u64;
            let response = self
                .inner
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .content_length(data.len() as i64)
                .body(SdkByteStream::from(data))
                .send()
                .await
                .map_err(|e| {
                    Self::map_sdk_error(&format!("upload part {part_number} of {bucket}/{key}"), &e)
                })?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            tracing::debug!(bucket, key, part_number, total, "Uploaded part");

            part_number += 1;
            next = reader.next_part().await?;
        }

        if let Some(expected) = options.content_length
            && expected != total
        {
            return Err(Error::Integrity(format!(
                "upload of {bucket}/{key} streamed {total} bytes, expected {expected}"
            )));
        }

        self.inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("complete upload {bucket}/{key}"), &e))?;
        Ok(())
    }
}

/// Map an error code and HTTP status onto an error kind
fn classify(code: Option<&str>, status: Option<u16>, message: String) -> Error {
    match (code, status) {
        (
            Some(
                "AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken"
                | "InvalidToken",
            ),
            _,
        )
        | (_, Some(401 | 403)) => Error::Auth(message),
        (Some("NoSuchBucket" | "NoSuchKey" | "NotFound"), _) | (_, Some(404)) => {
            Error::NotFound(message)
        }
        (Some("BucketAlreadyExists" | "BucketAlreadyOwnedByYou"), _) | (_, Some(409)) => {
            Error::Conflict(message)
        }
        _ => Error::Network(message),
    }
}

fn user_metadata(options: &PutOptions) -> Option<HashMap<String, String>> {
    if options.metadata.is_empty() {
        None
    } else {
        Some(
            options
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        retry_with_backoff(
            &self.retry,
            || self.list_page_once(bucket, continuation_token.clone()),
            is_retryable_error,
        )
        .await
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<Option<ObjectMeta>> {
        retry_with_backoff(
            &self.retry,
            || self.head_object_once(bucket, key),
            is_retryable_error,
        )
        .await
    }

    async fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("get {bucket}/{key}"), &e))?;

        let content_type = response.content_type().map(str::to_string);
        let content_length = response.content_length().map(|len| len.max(0) as u64);
        let context = format!("{bucket}/{key}");

        let stream = futures::stream::try_unfold(response.body, move |mut body| {
            let context = context.clone();
            async move {
                match body.try_next().await {
                    Ok(Some(chunk)) => Ok(Some((chunk, body))),
                    Ok(None) => Ok(None),
                    Err(e) => Err(Error::Network(format!("reading {context}: {e}"))),
                }
            }
        })
        .boxed();

        Ok(ObjectBody {
            stream,
            content_type,
            content_length,
        })
    }

    async fn put_object_stream(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        options: PutOptions,
    ) -> Result<()> {
        let mut reader = PartReader::new(body, PART_SIZE);
        let first = reader.next_part().await?.unwrap_or_default();

        if !reader.is_exhausted() {
            return self
                .put_multipart(bucket, key, first, reader, &options)
                .await;
        }

        if let Some(expected) = options.content_length
            && expected != first.len() as u64
        {
            return Err(Error::Integrity(format!(
                "upload of {bucket}/{key} streamed {} bytes, expected {expected}",
                first.len()
            )));
        }
        self.put_single(bucket, key, first, &options).await
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        retry_with_backoff(
            &self.retry,
            || self.bucket_exists_once(bucket),
            is_retryable_error,
        )
        .await
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut request = self.inner.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("create bucket {bucket}"), &e))?;
        Ok(())
    }

    async fn set_versioning(&self, bucket: &str, enabled: bool) -> Result<()> {
        let status = if enabled {
            BucketVersioningStatus::Enabled
        } else {
            BucketVersioningStatus::Suspended
        };

        let config = VersioningConfiguration::builder().status(status).build();

        self.inner
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(config)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("set versioning on {bucket}"), &e))?;

        Ok(())
    }

    async fn put_lifecycle_rule(&self, bucket: &str, rule: &LifecycleRule) -> Result<()> {
        let sdk_rule = aws_sdk_s3::types::LifecycleRule::builder()
            .id(&rule.id)
            .filter(LifecycleRuleFilter::builder().prefix(&rule.prefix).build())
            .status(ExpirationStatus::Enabled)
            .expiration(LifecycleExpiration::builder().days(rule.expiration_days).build())
            .noncurrent_version_expiration(
                NoncurrentVersionExpiration::builder()
                    .noncurrent_days(rule.noncurrent_days)
                    .build(),
            )
            .build()
            .map_err(|e| Error::General(format!("lifecycle rule: {e}")))?;

        let config = BucketLifecycleConfiguration::builder()
            .rules(sdk_rule)
            .build()
            .map_err(|e| Error::General(format!("lifecycle configuration: {e}")))?;

        self.inner
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(config)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(&format!("set lifecycle on {bucket}"), &e))?;

        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_secs: u64) -> Result<String> {
        let config = aws_sdk_s3::presigning::PresigningConfig::builder()
            .expires_in(Duration::from_secs(expires_secs))
            .build()
            .map_err(|e| Error::General(format!("presign_get config: {e}")))?;

        let request = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| Error::General(format!("presign_get: {e}")))?;

        Ok(request.uri().to_string())
    }
}
