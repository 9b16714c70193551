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

//! Cloud drive storage adapter (Google Drive API v3)
//!
//! Every file lives as a named object inside one configured parent folder.
//! The drive addresses objects by generated ids, so each operation first
//! resolves `"{namespace}/{name}"` to an id with a name query. The lookup is
//! repeated on every call; ids are never cached across calls.
//!
//! Each object carries `appProperties` `{namespace, sha256}` so listing can
//! filter by namespace and `stat` can report the client-side fingerprint.
//!
//! Access tokens are minted from a long-lived refresh token and cached until
//! shortly before expiry. Requests are retried with exponential backoff on
//! 429 and 5xx responses; a 401 drops the cached token and retries once.
//!
//! `delete` moves the object to the drive trash. Deleting an absent file
//! succeeds.

use crate::error::{StorageError, StorageResult};
use crate::{content_fingerprint, resolve_mime, AdapterKind, FileLocation, FileStat, StorageAdapter};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const MULTIPART_BOUNDARY: &str = "ussp-drive-part-boundary-5c1b7e";
const FILE_FIELDS: &str = "id,name,size,mimeType,appProperties";
const MAX_PAGE_SIZE: u32 = 1000;

/// Refresh the access token this long before it actually expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_upload_base() -> String {
    DEFAULT_UPLOAD_BASE.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_max_retries() -> u32 {
    3
}

/// Upper bound on a single retry wait
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `100ms * 2^attempt`, capped at [`MAX_BACKOFF`]
fn backoff_delay(attempt: u32) -> Duration {
    2u64.checked_pow(attempt)
        .and_then(|factor| factor.checked_mul(100))
        .map(Duration::from_millis)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Descriptor config for a cloud drive adapter
#[derive(Clone, Deserialize)]
pub struct CloudDriveConfig {
    /// OAuth client id of the drive application
    #[serde(alias = "clientId")]
    pub client_id: String,
    /// OAuth client secret
    #[serde(alias = "clientSecret")]
    pub client_secret: String,
    /// Long-lived refresh token
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
    /// Parent folder holding every object
    #[serde(alias = "folderId")]
    pub folder_id: String,
    /// Metadata API base URL
    #[serde(default = "default_api_base", alias = "apiBase")]
    pub api_base: String,
    /// Media upload API base URL
    #[serde(default = "default_upload_base", alias = "uploadBase")]
    pub upload_base: String,
    /// OAuth token endpoint
    #[serde(default = "default_token_url", alias = "tokenUrl")]
    pub token_url: String,
    /// Attempts for rate-limited or failing requests
    #[serde(default = "default_max_retries", alias = "maxRetries")]
    pub max_retries: u32,
}

impl fmt::Debug for CloudDriveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudDriveConfig")
            .field("client_id", &self.client_id)
            .field("folder_id", &self.folder_id)
            .field("api_base", &self.api_base)
            .field("upload_base", &self.upload_base)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Failures talking to the drive API
#[derive(Error, Debug)]
enum DriveError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("drive API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),
}

impl DriveError {
    fn is_not_found(&self) -> bool {
        matches!(self, DriveError::Api { status: 404, .. })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    app_properties: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilesListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Cloud drive storage adapter
pub struct CloudDriveAdapter {
    http: reqwest::Client,
    config: CloudDriveConfig,
    token: Mutex<Option<CachedToken>>,
}

impl CloudDriveAdapter {
    /// Build the adapter. No request is made until the first operation.
    pub fn new(config: CloudDriveConfig) -> StorageResult<Self> {
        for (field, value) in [
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
            ("refresh_token", &config.refresh_token),
            ("folder_id", &config.folder_id),
        ] {
            if value.trim().is_empty() {
                return Err(StorageError::invalid_config(format!(
                    "cloud drive {} is required",
                    field
                )));
            }
        }
        if config.max_retries == 0 {
            return Err(StorageError::invalid_config("max_retries must be at least 1"));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| StorageError::invalid_config(format!("HTTP client: {}", e)))?;

        Ok(CloudDriveAdapter {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    /// Name of the drive object for `(namespace, name)`
    pub fn object_name(namespace: &str, name: &str) -> StorageResult<String> {
        if namespace.is_empty() || namespace.contains('/') {
            return Err(StorageError::invalid_name(format!(
                "invalid namespace key: {:?}",
                namespace
            )));
        }
        if name.is_empty() {
            return Err(StorageError::invalid_name("file name is empty"));
        }
        Ok(format!("{}/{}", namespace, name))
    }

    /// Escape a literal for use inside a single-quoted drive query string
    fn escape_query(value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }

    async fn access_token(&self) -> Result<String, DriveError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Refreshing cloud drive access token");
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.config.refresh_token.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Cloud drive token refresh rejected");
            return Err(DriveError::TokenRefresh(format!("status {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DriveError::TokenRefresh(format!("invalid token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Send a request built by `build`, retrying transient failures
    ///
    /// `build` is called once per attempt with the current access token.
    #[instrument(skip(self, build))]
    async fn send_with_retry<F>(&self, op: &'static str, build: F) -> Result<Response, DriveError>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let max_retries = self.config.max_retries;
        let mut attempt = 0u32;
        let mut reauthenticated = false;

        loop {
            let token = self.access_token().await?;
            let error = match build(&token).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                        reauthenticated = true;
                        self.invalidate_token().await;
                        continue;
                    }
                    let message = response.text().await.unwrap_or_default();
                    let error = DriveError::Api {
                        status: status.as_u16(),
                        message,
                    };
                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        return Err(error);
                    }
                    error
                }
                Err(e) => DriveError::Transport(e),
            };

            attempt += 1;
            if attempt >= max_retries {
                warn!(op, attempts = attempt, error = %error, "Drive request failed");
                return Err(error);
            }

            let backoff = backoff_delay(attempt);
            warn!(
                "Drive request {} failed (attempt {}/{}): {}, retrying in {}ms",
                op,
                attempt,
                max_retries,
                error,
                backoff.as_millis()
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Resolve an object name to its drive file, if present
    #[instrument(skip(self))]
    async fn find_file(&self, object_name: &str) -> Result<Option<DriveFile>, DriveError> {
        let query = format!(
            "name='{}' and '{}' in parents and trashed=false",
            Self::escape_query(object_name),
            Self::escape_query(&self.config.folder_id)
        );
        let url = format!(
            "{}/files?q={}&spaces=drive&pageSize=1&fields=files({})",
            self.config.api_base,
            urlencoding::encode(&query),
            FILE_FIELDS
        );

        let response = self
            .send_with_retry("find", |token| self.http.get(&url).bearer_auth(token))
            .await?;
        let list: FilesListResponse = response.json().await?;
        Ok(list.files.into_iter().next())
    }

    fn multipart_body(metadata: &serde_json::Value, mime_type: &str, data: &[u8]) -> Bytes {
        let mut body = BytesMut::with_capacity(data.len() + 512);
        body.put_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.put_slice(metadata.to_string().as_bytes());
        body.put_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.put_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
        body.put_slice(data);
        body.put_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
        body.freeze()
    }

    fn map_err(namespace: &str, name: &str, err: DriveError) -> StorageError {
        if err.is_not_found() {
            StorageError::not_found(AdapterKind::CloudDrive, namespace, name)
        } else {
            StorageError::io(AdapterKind::CloudDrive, namespace, name, err)
        }
    }
}

impl fmt::Debug for CloudDriveAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudDriveAdapter")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl StorageAdapter for CloudDriveAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::CloudDrive
    }

    async fn upload(
        &self,
        namespace: &str,
        name: &str,
        data: &[u8],
        mime_hint: Option<&str>,
    ) -> StorageResult<FileLocation> {
        let object_name = Self::object_name(namespace, name)?;
        let mime_type = resolve_mime(name, mime_hint);
        let fingerprint = content_fingerprint(data);

        let existing = self
            .find_file(&object_name)
            .await
            .map_err(|e| Self::map_err(namespace, name, e))?;

        let app_properties = serde_json::json!({
            "namespace": namespace,
            "sha256": fingerprint,
        });
        let (method, url, metadata) = match &existing {
            Some(file) => (
                Method::PATCH,
                format!(
                    "{}/files/{}?uploadType=multipart&fields=id",
                    self.config.upload_base,
                    urlencoding::encode(&file.id)
                ),
                serde_json::json!({
                    "mimeType": mime_type,
                    "appProperties": app_properties,
                }),
            ),
            None => (
                Method::POST,
                format!(
                    "{}/files?uploadType=multipart&fields=id",
                    self.config.upload_base
                ),
                serde_json::json!({
                    "name": object_name,
                    "parents": [self.config.folder_id],
                    "mimeType": mime_type,
                    "appProperties": app_properties,
                }),
            ),
        };

        let body = Self::multipart_body(&metadata, &mime_type, data);
        let content_type = format!("multipart/related; boundary={}", MULTIPART_BOUNDARY);

        let response = self
            .send_with_retry("upload", |token| {
                self.http
                    .request(method.clone(), &url)
                    .bearer_auth(token)
                    .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                    .body(body.clone())
            })
            .await
            .map_err(|e| Self::map_err(namespace, name, e))?;

        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| StorageError::io(AdapterKind::CloudDrive, namespace, name, e))?;

        debug!(
            namespace,
            name,
            file_id = %created.id,
            overwrite = existing.is_some(),
            "Stored file in cloud drive"
        );

        Ok(FileLocation {
            address: created.id,
            size: data.len() as u64,
            mime_type,
            fingerprint,
        })
    }

    async fn download(&self, namespace: &str, name: &str) -> StorageResult<Vec<u8>> {
        let object_name = Self::object_name(namespace, name)?;
        let file = self
            .find_file(&object_name)
            .await
            .map_err(|e| Self::map_err(namespace, name, e))?
            .ok_or_else(|| StorageError::not_found(AdapterKind::CloudDrive, namespace, name))?;

        let url = format!(
            "{}/files/{}?alt=media",
            self.config.api_base,
            urlencoding::encode(&file.id)
        );
        let response = self
            .send_with_retry("download", |token| self.http.get(&url).bearer_auth(token))
            .await
            .map_err(|e| Self::map_err(namespace, name, e))?;

        // Drain the whole body before returning
        let data = response
            .bytes()
            .await
            .map_err(|e| StorageError::io(AdapterKind::CloudDrive, namespace, name, e))?;
        Ok(data.to_vec())
    }

    async fn delete(&self, namespace: &str, name: &str) -> StorageResult<()> {
        let object_name = Self::object_name(namespace, name)?;
        let Some(file) = self
            .find_file(&object_name)
            .await
            .map_err(|e| Self::map_err(namespace, name, e))?
        else {
            return Ok(());
        };

        let url = format!(
            "{}/files/{}",
            self.config.api_base,
            urlencoding::encode(&file.id)
        );
        let trash = serde_json::json!({ "trashed": true });
        match self
            .send_with_retry("delete", |token| {
                self.http.patch(&url).bearer_auth(token).json(&trash)
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(Self::map_err(namespace, name, e)),
        }
    }

    async fn stat(&self, namespace: &str, name: &str) -> StorageResult<FileStat> {
        let object_name = Self::object_name(namespace, name)?;
        let file = self
            .find_file(&object_name)
            .await
            .map_err(|e| Self::map_err(namespace, name, e))?
            .ok_or_else(|| StorageError::not_found(AdapterKind::CloudDrive, namespace, name))?;

        let mime_type = file
            .mime_type
            .clone()
            .unwrap_or_else(|| resolve_mime(name, None));

        match file.app_properties.get("sha256") {
            Some(fingerprint) => Ok(FileStat {
                size: file
                    .size
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
                mime_type,
                fingerprint: fingerprint.clone(),
            }),
            None => {
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
        Self::object_name(namespace, "probe")?;
        let query = format!(
            "'{}' in parents and trashed=false and appProperties has {{ key='namespace' and value='{}' }}",
            Self::escape_query(&self.config.folder_id),
            Self::escape_query(namespace)
        );
        let prefix = format!("{}/", namespace);

        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = format!(
                "{}/files?q={}&spaces=drive&pageSize={}&fields=nextPageToken,files({})",
                self.config.api_base,
                urlencoding::encode(&query),
                MAX_PAGE_SIZE,
                FILE_FIELDS
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let response = self
                .send_with_retry("list", |token| self.http.get(&url).bearer_auth(token))
                .await
                .map_err(|e| Self::map_err(namespace, "", e))?;
            let page: FilesListResponse = response
                .json()
                .await
                .map_err(|e| StorageError::io(AdapterKind::CloudDrive, namespace, "", e))?;

            names.extend(
                page.files
                    .into_iter()
                    .filter_map(|f| f.name.strip_prefix(&prefix).map(str::to_string)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn test_connection(&self) -> bool {
        let url = format!(
            "{}/files/{}?fields=id",
            self.config.api_base,
            urlencoding::encode(&self.config.folder_id)
        );
        match self
            .send_with_retry("probe", |token| self.http.get(&url).bearer_auth(token))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Cloud drive probe failed");
                false
            }
        }
    }
}
