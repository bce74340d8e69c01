//! AWS SDK implementation of the object-store client contract.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use pl_error::StorageError;
use pl_traits::{ObjectStat, ObjectStoreClient};
use pl_types::config::BucketConfig;
use tracing::debug;

/// Object-store client backed by the AWS SDK.
///
/// Buckets are addressed path-style, which is what MinIO-style endpoints and
/// GCS interoperability mode expect. Objects are written with `Content-MD5`
/// so the store verifies integrity end to end; entity tags therefore equal
/// the MD5 hex digest for the single-part uploads pelican performs.
pub struct AwsObjectStoreClient {
    client: Client,
}

impl AwsObjectStoreClient {
    /// Build a client for a configured bucket endpoint.
    pub async fn connect(config: &BucketConfig, retry_limit: u32) -> Result<Self, StorageError> {
        let scheme = if config.use_ssl { "https" } else { "http" };
        let endpoint = format!("{scheme}://{}", config.endpoint);

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "pelican",
        );

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .retry_config(
                aws_config::retry::RetryConfig::standard()
                    .with_max_attempts(retry_limit.max(1)),
            )
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        debug!(endpoint = %endpoint, region = %config.region, "object-store client created");
        Ok(Self {
            client: Client::from_conf(s3_config),
        })
    }

    /// Wrap an existing SDK client (tests, custom wiring).
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn trim_etag(etag: Option<&str>) -> String {
    etag.unwrap_or_default().trim_matches('"').to_string()
}

fn to_chrono(dt: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    dt.and_then(|d| DateTime::<Utc>::from_timestamp(d.secs(), d.subsec_nanos()))
}

/// Content-MD5 header value for a hex digest.
fn content_md5_base64(md5_hex: &str) -> Result<String, StorageError> {
    let raw = hex::decode(md5_hex)
        .map_err(|err| StorageError::Io(format!("invalid md5 digest '{md5_hex}': {err}")))?;
    Ok(BASE64.encode(raw))
}

#[async_trait]
impl ObjectStoreClient for AwsObjectStoreClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Client(service_err.to_string()))
                }
            }
        }
    }

    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<(), StorageError> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 is the default location and must not be sent as a
        // constraint.
        if !region.is_empty() && region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let service_err = err.into_service_error();
                // Lost a creation race; the bucket is there either way.
                if service_err.is_bucket_already_owned_by_you()
                    || service_err.is_bucket_already_exists()
                {
                    Ok(())
                } else {
                    Err(StorageError::Client(format!(
                        "failed to create bucket: {service_err}"
                    )))
                }
            }
        }
    }

    async fn stat_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<ObjectStat>, StorageError> {
        match self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectStat {
                key: key.to_string(),
                etag: trim_etag(output.e_tag()),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                last_modified: to_chrono(output.last_modified()),
            })),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(StorageError::Client(service_err.to_string()))
                }
            }
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        src: &Path,
        content_md5_hex: &str,
    ) -> Result<ObjectStat, StorageError> {
        let body = ByteStream::from_path(src)
            .await
            .map_err(|err| StorageError::Io(err.to_string()))?;

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_md5(content_md5_base64(content_md5_hex)?)
            .body(body)
            .send()
            .await
            .map_err(|err| {
                StorageError::Client(format!(
                    "failed to upload object: {}",
                    err.into_service_error()
                ))
            })?;

        let size = tokio::fs::metadata(src)
            .await
            .map(|m| m.len())
            .unwrap_or_default();

        Ok(ObjectStat {
            key: key.to_string(),
            etag: trim_etag(output.e_tag()),
            size,
            last_modified: Some(Utc::now()),
        })
    }
}
