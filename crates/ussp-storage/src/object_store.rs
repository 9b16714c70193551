// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! S3-compatible object store adapter
//!
//! Objects are stored under `{prefix}{namespace}/{name}` in one bucket. The
//! content fingerprint is computed client-side and saved as object metadata
//! (`x-amz-meta-sha256`); backend ETags are never trusted since multipart
//! uploads produce non-content ETags.
//!
//! # Configuration
//!
//! ```json
//! {
//!   "bucket": "ussp-files",
//!   "region": "eu-west-1",
//!   "endpoint": "http://localhost:9000",
//!   "accessKeyId": "minioadmin",
//!   "secretAccessKey": "minioadmin",
//!   "forcePathStyle": true,
//!   "prefix": "tenant-a/"
//! }
//! ```
//!
//! With both keys present the client is built directly from static
//! credentials, skipping region discovery. Otherwise the standard AWS
//! credential chain (environment, profile, instance metadata) is used.
//! Construction never touches the network; [`StorageAdapter::test_connection`]
//! probes the bucket with `HeadBucket`.

use crate::error::{StorageError, StorageResult};
use crate::{content_fingerprint, resolve_mime, AdapterKind, FileLocation, FileStat, StorageAdapter};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

const FINGERPRINT_METADATA_KEY: &str = "sha256";
const DEFAULT_REGION: &str = "us-east-1";

fn default_max_attempts() -> u32 {
    3
}

/// Descriptor config for an object store adapter
#[derive(Clone, Deserialize)]
pub struct ObjectStoreConfig {
    /// Bucket name
    pub bucket: String,
    /// Region; `us-east-1` when absent with static credentials
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services
    #[serde(default, alias = "endpointUrl", alias = "endpoint_url")]
    pub endpoint: Option<String>,
    /// Static access key id
    #[serde(default, alias = "accessKeyId", alias = "access_key")]
    pub access_key_id: Option<String>,
    /// Static secret access key
    #[serde(default, alias = "secretAccessKey", alias = "secret_key")]
    pub secret_access_key: Option<String>,
    /// Path-style addressing (`endpoint/bucket/key`), needed by most self-hosted stores
    #[serde(default, alias = "forcePathStyle", alias = "path_style")]
    pub force_path_style: bool,
    /// Optional key prefix shared by every object of this adapter
    #[serde(default, alias = "keyPrefix")]
    pub prefix: Option<String>,
    /// SDK retry attempts for transient failures
    #[serde(default = "default_max_attempts", alias = "maxAttempts")]
    pub max_attempts: u32,
}

impl ObjectStoreConfig {
    /// Config for a bucket with every other option defaulted
    pub fn new(bucket: impl Into<String>) -> Self {
        ObjectStoreConfig {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            prefix: None,
            max_attempts: default_max_attempts(),
        }
    }

    fn validate(&self) -> StorageResult<()> {
        if self.bucket.trim().is_empty() {
            return Err(StorageError::invalid_config("object store bucket is required"));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(StorageError::invalid_config(
                "object store credentials need both access key id and secret access key",
            ));
        }
        if self.max_attempts == 0 {
            return Err(StorageError::invalid_config("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("static_credentials", &self.access_key_id.is_some())
            .field("force_path_style", &self.force_path_style)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// S3-compatible storage adapter
#[derive(Clone)]
pub struct ObjectStoreAdapter {
    client: Client,
    bucket: String,
    prefix: String,
    endpoint: Option<String>,
}

impl ObjectStoreAdapter {
    /// Build the adapter from its config
    pub async fn new(config: ObjectStoreConfig) -> StorageResult<Self> {
        config.validate()?;

        let retry = RetryConfig::standard().with_max_attempts(config.max_attempts);

        let client = match (&config.access_key_id, &config.secret_access_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials = Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None,
                    None,
                    "ObjectStoreAdapter",
                );

                // Static credentials skip aws_config::defaults() so no region
                // discovery round trips happen outside AWS.
                let mut builder = aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .force_path_style(config.force_path_style)
                    .retry_config(retry)
                    .region(Region::new(
                        config
                            .region
                            .clone()
                            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                    ));
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.endpoint_url(endpoint);
                }
                Client::from_conf(builder.build())
            }
            _ => {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
                if let Some(region) = &config.region {
                    loader = loader.region(Region::new(region.clone()));
                }
                let sdk_config = loader.load().await;

                let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
                    .force_path_style(config.force_path_style)
                    .retry_config(retry);
                if let Some(endpoint) = &config.endpoint {
                    debug!("Using custom object store endpoint: {}", endpoint);
                    builder = builder.endpoint_url(endpoint);
                }
                Client::from_conf(builder.build())
            }
        };

        let prefix = match config.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(p) if !p.is_empty() => format!("{}/", p),
            _ => String::new(),
        };

        Ok(ObjectStoreAdapter {
            client,
            bucket: config.bucket,
            prefix,
            endpoint: config.endpoint,
        })
    }

    /// Bucket this adapter writes to
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key for `(namespace, name)`
    ///
    /// Names may contain `/` to form hierarchies, but empty, `.` and `..`
    /// segments are rejected.
    pub fn object_key(&self, namespace: &str, name: &str) -> StorageResult<String> {
        if namespace.is_empty() || namespace.contains('/') || namespace == "." || namespace == ".." {
            return Err(StorageError::invalid_name(format!(
                "invalid namespace key: {:?}",
                namespace
            )));
        }
        if name.is_empty() {
            return Err(StorageError::invalid_name("file name is empty"));
        }
        if name
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            return Err(StorageError::path_escape(namespace, name));
        }
        Ok(format!("{}{}/{}", self.prefix, namespace, name))
    }

    fn namespace_prefix(&self, namespace: &str) -> String {
        format!("{}{}/", self.prefix, namespace)
    }

    /// Time-limited signed GET URL for an object
    ///
    /// Signing happens locally; no request reaches the backend.
    pub async fn presigned_download_url(
        &self,
        namespace: &str,
        name: &str,
        expires_in: Duration,
    ) -> StorageResult<String> {
        let key = self.object_key(namespace, name)?;
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::invalid_config(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| Self::sdk_err(namespace, name, e))?;

        Ok(request.uri().to_string())
    }

    fn sdk_err<E>(namespace: &str, name: &str, err: E) -> StorageError
    where
        E: std::error::Error,
    {
        StorageError::io(
            AdapterKind::ObjectStore,
            namespace,
            name,
            DisplayErrorContext(err).to_string(),
        )
    }

    fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
        err.raw_response().map(|r| r.status().as_u16())
    }
}

impl fmt::Debug for ObjectStoreAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreAdapter")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl StorageAdapter for ObjectStoreAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::ObjectStore
    }

    async fn upload(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        mime_hint: Option<&str>,
    ) -> StorageResult<FileLocation> {
        let key = self.object_key(namespace, name)?;
        let mime_type = resolve_mime(name, mime_hint);
        let fingerprint = content_fingerprint(data);

        debug!(bucket = %self.bucket, key = %key, size = data.len(), "Putting object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&mime_type)
            .metadata(FINGERPRINT_METADATA_KEY, &fingerprint)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| Self::sdk_err(namespace, name, e))?;

        Ok(FileLocation {
            address: key,
            size: data.len() as u64,
            mime_type,
            fingerprint,
        })
    }

    async fn download(&self, namespace: &str, name: &str) -> StorageResult<Vec<u8>> {
        let key = self.object_key(namespace, name)?;

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || Self::status_of(&e) == Some(404);
                return Err(if missing {
                    StorageError::not_found(AdapterKind::ObjectStore, namespace, name)
                } else {
                    Self::sdk_err(namespace, name, e)
                });
            }
        };

        // Drain the whole body before returning
        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::io(AdapterKind::ObjectStore, namespace, name, e))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn delete(&self, namespace: &str, name: &str) -> StorageResult<()> {
        let key = self.object_key(namespace, name)?;

        // DeleteObject succeeds for absent keys
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::sdk_err(namespace, name, e))?;

        debug!(bucket = %self.bucket, key = %key, "Deleted object");
        Ok(())
    }

    async fn stat(&self, namespace: &str, name: &str) -> StorageResult<FileStat> {
        let key = self.object_key(namespace, name)?;

        let head = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(head) => head,
            Err(e) => {
                let missing = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false)
                    || Self::status_of(&e) == Some(404);
                return Err(if missing {
                    StorageError::not_found(AdapterKind::ObjectStore, namespace, name)
                } else {
                    Self::sdk_err(namespace, name, e)
                });
            }
        };

        let mime_type = head
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| resolve_mime(name, None));
        let stored_fingerprint = head
            .metadata()
            .and_then(|m| m.get(FINGERPRINT_METADATA_KEY))
            .cloned();

        match stored_fingerprint {
            Some(fingerprint) => Ok(FileStat {
                size: head.content_length().unwrap_or(0).max(0) as u64,
                mime_type,
                fingerprint,
            }),
            None => {
                // Written by something else; hash the bytes ourselves
                let data = self.download(namespace, name).await?;
                Ok(FileStat {
                    size: data.len() as u64,
                    mime_type,
                    fingerprint: content_fingerprint(&data),
                })
            }
        }
    }

    async fn list(&self, namespace: &str) -> StorageResult<Vec<String>> {
        // Validates the namespace with a throwaway name
        self.object_key(namespace, "probe")?;
        let prefix = self.namespace_prefix(namespace);

        let mut result = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::sdk_err(namespace, "", e))?;

            for obj in response.contents() {
                if let Some(name) = obj.key().and_then(|k| k.strip_prefix(prefix.as_str())) {
                    result.push(name.to_string());
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(|t| t.to_string());
            } else {
                break;
            }
        }

        result.sort();
        Ok(result)
    }

    async fn test_connection(&self) -> bool {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(bucket = %self.bucket, error = %DisplayErrorContext(&e), "Bucket probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn static_config() -> ObjectStoreConfig {
        ObjectStoreConfig {
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: Some("minioadmin".to_string()),
            secret_access_key: Some("minioadmin".to_string()),
            force_path_style: true,
            ..ObjectStoreConfig::new("ussp-test")
        }
    }

    #[test]
    fn test_config_from_camel_case_json() {
        let config: ObjectStoreConfig = serde_json::from_value(serde_json::json!({
            "bucket": "b",
            "endpoint": "http://minio:9000",
            "accessKeyId": "ak",
            "secretAccessKey": "sk",
            "forcePathStyle": true,
            "keyPrefix": "tenant"
        }))
        .unwrap();
        assert_eq!(config.bucket, "b");
        assert!(config.force_path_style);
        assert_eq!(config.prefix.as_deref(), Some("tenant"));
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", static_config());
        assert!(!rendered.contains("minioadmin"));
        assert!(rendered.contains("ussp-test"));
    }

    #[tokio::test]
    async fn test_config_validation() {
        let mut config = static_config();
        config.secret_access_key = None;
        assert!(matches!(
            ObjectStoreAdapter::new(config).await.unwrap_err(),
            StorageError::InvalidConfig(_)
        ));

        let config = ObjectStoreConfig::new("  ");
        assert!(ObjectStoreAdapter::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_object_key_layout() {
        let adapter = ObjectStoreAdapter::new(static_config()).await.unwrap();
        assert_eq!(adapter.object_key("ns", "a.txt").unwrap(), "ns/a.txt");
        assert_eq!(
            adapter.object_key("ns", "photos/2024/a.jpg").unwrap(),
            "ns/photos/2024/a.jpg"
        );
        assert!(adapter.object_key("ns", "").is_err());
        assert!(adapter.object_key("", "a").is_err());
        assert!(adapter.object_key("a/b", "a").is_err());
        assert!(adapter.object_key("ns", "../x").unwrap_err().is_path_escape());
        assert!(adapter.object_key("ns", "/abs").unwrap_err().is_path_escape());
        assert!(adapter.object_key("ns", "a//b").is_err());
    }

    #[tokio::test]
    async fn test_object_key_with_prefix() {
        let config = ObjectStoreConfig {
            prefix: Some("/tenant-a/".to_string()),
            ..static_config()
        };
        let adapter = ObjectStoreAdapter::new(config).await.unwrap();
        assert_eq!(adapter.object_key("ns", "a.txt").unwrap(), "tenant-a/ns/a.txt");
    }

    #[tokio::test]
    async fn test_presigned_url_is_signed_locally() {
        let adapter = ObjectStoreAdapter::new(static_config()).await.unwrap();
        let url = adapter
            .presigned_download_url("ns", "report.pdf", Duration::from_secs(300))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/ussp-test/ns/report.pdf?"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=300"));
    }

    #[tokio::test]
    async fn test_presigned_url_rejects_excessive_expiry() {
        let adapter = ObjectStoreAdapter::new(static_config()).await.unwrap();
        let result = adapter
            .presigned_download_url("ns", "a", Duration::from_secs(8 * 24 * 3600))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }
}
