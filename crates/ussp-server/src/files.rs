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
//! File API
//!
//! # Endpoints
//! - POST /api/files/upload?namespaceId=&path= - Raw body, `Content-Type` is the mime hint
//! - GET /api/files/download?namespaceId=&path= - Bytes as an attachment
//! - GET /api/files?namespaceId= - File records of a namespace
//! - DELETE /api/files?namespaceId=&path= - Remove bytes and record
//!
//! `namespaceId` accepts a namespace id or, failing that, a namespace name.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, ETAG},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use ussp_security::{audit, AuthClient};
use ussp_storage::{content_fingerprint, StorageError};

use crate::error::{ApiError, ApiResult};
use crate::model::{new_id, FileObject, Namespace};
use crate::state::AppState;

/// Routes under `/api/files`
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/files/upload", post(upload))
        .route("/api/files/download", get(download))
        .route("/api/files", get(list).delete(remove))
}

/// Query parameters shared by the file endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileQuery {
    #[serde(default)]
    namespace_id: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

impl FileQuery {
    fn namespace_id(&self) -> ApiResult<&str> {
        non_empty(&self.namespace_id, "namespaceId")
    }

    fn path(&self) -> ApiResult<&str> {
        non_empty(&self.path, "path")
    }
}

fn non_empty<'a>(value: &'a Option<String>, name: &str) -> ApiResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::validation(format!("missing required parameter: {}", name))),
    }
}

/// Upload response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Path as supplied
    pub path: String,
    /// Stored size in bytes
    pub size: u64,
    /// Resolved MIME type
    pub mime_type: String,
    /// Content fingerprint
    pub etag: String,
}

/// Look up a namespace by id or name and check the caller may use it
pub(crate) async fn authorize_namespace(
    state: &AppState,
    client: &AuthClient,
    namespace_ref: &str,
) -> ApiResult<Namespace> {
    let namespace = match state.persistence.get_namespace(namespace_ref).await? {
        Some(ns) => ns,
        None => state
            .persistence
            .get_namespace_by_name(namespace_ref)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("namespace not found: {}", namespace_ref)))?,
    };

    if !namespace.allows(&client.client_id) {
        audit::log_access_denied(
            &client.client_id,
            client.user_id.as_deref(),
            &format!("namespace:{}", namespace.name),
            "namespace owned by another client",
        );
        return Err(ApiError::forbidden(format!(
            "client may not access namespace '{}'",
            namespace.name
        )));
    }
    Ok(namespace)
}

fn storage_failure(
    client: &AuthClient,
    namespace: &Namespace,
    path: &str,
    err: StorageError,
) -> ApiError {
    if err.is_path_escape() {
        audit::log_path_escape_attempt(Some(&client.client_id), &namespace.name, path);
    }
    ApiError::from(err)
}

/// Mime hint from `Content-Type`, ignoring the generic types clients send by default
fn mime_hint(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let essence = value.split(';').next().unwrap_or_default().trim();
    match essence {
        "" | "application/octet-stream" | "application/x-www-form-urlencoded" => None,
        other => Some(other.to_string()),
    }
}

async fn check_quota(
    state: &AppState,
    namespace: &Namespace,
    replaced: Option<&FileObject>,
    incoming: u64,
) -> ApiResult<()> {
    let Some(quota) = namespace.quota_bytes else {
        return Ok(());
    };

    let used: u64 = state
        .persistence
        .list_files(&namespace.id)
        .await?
        .iter()
        .map(|f| f.size_bytes)
        .sum();
    let after = used.saturating_sub(replaced.map_or(0, |f| f.size_bytes)) + incoming;

    if after > quota {
        tracing::warn!(
            namespace = %namespace.name,
            used,
            incoming,
            quota,
            "Upload rejected by namespace quota"
        );
        return Err(ApiError::forbidden(format!(
            "namespace quota exceeded: {} of {} bytes",
            after, quota
        )));
    }
    Ok(())
}

/// POST /api/files/upload
async fn upload(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    headers: HeaderMap,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> ApiResult<Response> {
    let path = query.path()?;
    let namespace = authorize_namespace(&state, &client, query.namespace_id()?).await?;
    let adapter = state.namespace_adapter(&namespace).await?;

    let existing = state.persistence.find_file(&namespace.id, path).await?;
    check_quota(&state, &namespace, existing.as_ref(), body.len() as u64).await?;

    let hint = mime_hint(&headers);
    let location = adapter
        .upload(&namespace.id, path, &body, hint.as_deref())
        .await
        .map_err(|e| storage_failure(&client, &namespace, path, e))?;

    let record = state
        .persistence
        .put_file(FileObject {
            id: existing.map(|f| f.id).unwrap_or_else(new_id),
            namespace_id: namespace.id.clone(),
            path: path.to_string(),
            size_bytes: location.size,
            mime_type: location.mime_type,
            content_fingerprint: location.fingerprint,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(
        client_id = %client.client_id,
        namespace = %namespace.name,
        path,
        size = record.size_bytes,
        adapter = %adapter.kind(),
        "Stored file"
    );

    let response = UploadResponse {
        path: record.path,
        size: record.size_bytes,
        mime_type: record.mime_type,
        etag: record.content_fingerprint,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

fn attachment_name(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect()
}

/// GET /api/files/download
async fn download(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Query(query): Query<FileQuery>,
) -> ApiResult<Response> {
    let path = query.path()?;
    let namespace = authorize_namespace(&state, &client, query.namespace_id()?).await?;
    let record = state
        .persistence
        .find_file(&namespace.id, path)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("file not found: {}", path)))?;

    let adapter = state.namespace_adapter(&namespace).await?;
    let data = adapter
        .download(&namespace.id, path)
        .await
        .map_err(|e| storage_failure(&client, &namespace, path, e))?;

    if content_fingerprint(&data) != record.content_fingerprint {
        tracing::error!(
            namespace = %namespace.name,
            path,
            adapter = %adapter.kind(),
            "Stored bytes do not match recorded fingerprint"
        );
        return Err(ApiError::AdapterIo(format!(
            "content fingerprint mismatch for {}",
            path
        )));
    }

    let headers = [
        (CONTENT_TYPE, record.mime_type.clone()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", attachment_name(path)),
        ),
        (ETAG, format!("\"{}\"", record.content_fingerprint)),
    ];
    Ok((StatusCode::OK, headers, data).into_response())
}

/// GET /api/files
async fn list(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Query(query): Query<FileQuery>,
) -> ApiResult<Json<Vec<FileObject>>> {
    let namespace = authorize_namespace(&state, &client, query.namespace_id()?).await?;
    Ok(Json(state.persistence.list_files(&namespace.id).await?))
}

/// DELETE /api/files
async fn remove(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Query(query): Query<FileQuery>,
) -> ApiResult<StatusCode> {
    let path = query.path()?;
    let namespace = authorize_namespace(&state, &client, query.namespace_id()?).await?;
    let record = state
        .persistence
        .find_file(&namespace.id, path)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("file not found: {}", path)))?;

    let adapter = state.namespace_adapter(&namespace).await?;
    adapter
        .delete(&namespace.id, path)
        .await
        .map_err(|e| storage_failure(&client, &namespace, path, e))?;
    state.persistence.delete_file(&record.id).await?;

    tracing::info!(client_id = %client.client_id, namespace = %namespace.name, path, "Deleted file");
    Ok(StatusCode::NO_CONTENT)
}
