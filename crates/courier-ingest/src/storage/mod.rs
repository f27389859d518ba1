//! S3-compatible object storage
//!
//! [`Storage`] wraps an `aws-sdk-s3` client. The [`ObjectStore`] trait is the
//! seam the destination sink and the relocation job depend on, so both can run
//! against an in-memory store in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use courier_common::checksum::sha256_hex;
use tracing::{debug, info, instrument};

pub mod config;

/// Minimal object operations used by the pipeline
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object, replacing any existing one
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<UploadResult>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// All keys under `prefix`, in the order the store returns them
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: u64,
}

impl UploadResult {
    pub fn for_data(key: impl Into<String>, data: &[u8]) -> Self {
        Self {
            key: key.into(),
            checksum: sha256_hex(data),
            size: data.len() as u64,
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            path_style = config.path_style,
            static_credentials = config.has_static_credentials(),
            "Initializing object storage client"
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "courier-storage");
                aws_sdk_s3::Config::builder()
                    .credentials_provider(credentials)
                    .region(region)
            },
            _ => {
                let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        s3_config_builder = s3_config_builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());
        info!(region = %config.region, "Object storage client initialized");

        Ok(Self { client })
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<UploadResult> {
        let result = UploadResult::for_data(key, &data);

        debug!("Uploading {} bytes to s3://{}/{}", result.size, bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to upload s3://{}/{}", bucket, key))?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);

        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download s3://{}/{}", bucket, key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", bucket, key))?;

        info!("Deleted s3://{}/{}", bucket, key);

        Ok(())
    }

    /// List every key under a prefix, following continuation tokens
    #[instrument(skip(self))]
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .with_context(|| format!("Failed to list s3://{}/{}", bucket, prefix))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} keys under s3://{}/{}", keys.len(), bucket, prefix);

        Ok(keys)
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<UploadResult> {
        self.upload(bucket, key, data).await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.download(bucket, key).await
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.delete(bucket, key).await
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        self.list(bucket, prefix).await
    }
}
