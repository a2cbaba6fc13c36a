use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("other: {0}")]
    Other(String),
}

/// Blob storage holding uploaded image binaries, one namespace (key prefix)
/// per property. Listing returns public URLs ready for the reconciler.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Public URLs of every image object under the property's prefix,
    /// sorted by object name.
    async fn list_urls(&self, property_id: Uuid) -> Result<Vec<String>, ImageStoreError>;
    /// Store `bytes` under the property's prefix and return the public URL.
    async fn save(&self, property_id: Uuid, file_name: &str, bytes: &[u8]) -> Result<String, ImageStoreError>;
    async fn delete(&self, property_id: Uuid, file_name: &str) -> Result<(), ImageStoreError>;
    /// Remove every object under the property's prefix (on property delete).
    async fn delete_all(&self, property_id: Uuid) -> Result<(), ImageStoreError>;
    /// Public URL for a named object, whether or not it exists.
    fn public_url(&self, property_id: Uuid, file_name: &str) -> String;
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "svg"];

/// Listings can contain stray non-image objects (folder markers, temp files);
/// only extension-recognized image files count.
pub fn is_image_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3ImageStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    /// Base for public URLs, e.g. "http://localhost:9000". Objects resolve to
    /// "{public_base}/{bucket}/{property_id}/{file_name}".
    public_base: String,
}

impl S3ImageStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "property-images".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let public_base = std::env::var("S3_PUBLIC_BASE").unwrap_or_else(|_| endpoint.clone());
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing (required for most MinIO/local endpoints without wildcard DNS)
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO client (path-style addressing enabled)");

        // Ensure bucket exists (create if missing)
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) => {
                        if attempt >= max_attempts {
                            error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                            return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                        }
                        let backoff_ms = 200 * attempt.pow(2); // quadratic backoff
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self { bucket, client, public_base })
    }

    fn key_for(&self, property_id: Uuid, file_name: &str) -> String {
        format!("{property_id}/{file_name}")
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn list_urls(&self, property_id: Uuid) -> Result<Vec<String>, ImageStoreError> {
        let prefix = format!("{property_id}/");
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .send()
            .await
            .map_err(|e| ImageStoreError::Other(e.to_string()))?;
        let mut names: Vec<String> = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|name| !name.is_empty() && is_image_file(name))
            .map(|name| name.to_string())
            .collect();
        names.sort();
        Ok(names
            .iter()
            .map(|name| self.public_url(property_id, name))
            .collect())
    }

    async fn save(&self, property_id: Uuid, file_name: &str, bytes: &[u8]) -> Result<String, ImageStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let key = self.key_for(property_id, file_name);
        let content_type = infer::get(bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type);
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            return Err(ImageStoreError::Other(e.to_string()));
        }
        Ok(self.public_url(property_id, file_name))
    }

    async fn delete(&self, property_id: Uuid, file_name: &str) -> Result<(), ImageStoreError> {
        let key = self.key_for(property_id, file_name);
        // Best-effort delete: treat not found as success
        let _ = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;
        Ok(())
    }

    async fn delete_all(&self, property_id: Uuid) -> Result<(), ImageStoreError> {
        let prefix = format!("{property_id}/");
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .send()
            .await
            .map_err(|e| ImageStoreError::Other(e.to_string()))?;
        for obj in resp.contents() {
            if let Some(key) = obj.key() {
                let _ = self
                    .client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await;
            }
        }
        Ok(())
    }

    fn public_url(&self, property_id: Uuid, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.public_base.trim_end_matches('/'),
            self.bucket,
            property_id,
            file_name
        )
    }
}

// Factory helper used in main (S3-only; panic early if misconfigured)
pub async fn build_image_store() -> Arc<dyn ImageStore> {
    match S3ImageStore::new().await {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("Failed to initialize S3 image store: {e}"),
    }
}
