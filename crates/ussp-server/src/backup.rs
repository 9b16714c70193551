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
//! Backup API
//!
//! Jobs are only recorded here; the replication worker does the copying.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use ussp_security::{audit, AuthClient};

use crate::error::{ApiError, ApiResult};
use crate::model::{JobStatus, ReplicationJob};
use crate::state::AppState;

/// Routes under `/api/backup`
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/backup/create", post(create))
        .route("/api/backup/status", get(status))
        .route("/api/backup/jobs/:id", get(job))
}

/// Body of a backup request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupRequest {
    #[serde(default)]
    file_id: Option<String>,
    #[serde(default)]
    source_adapter_id: Option<String>,
    #[serde(default)]
    target_adapter_id: Option<String>,
}

fn field<'a>(value: &'a Option<String>, name: &str) -> ApiResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::validation(format!("missing required field: {}", name))),
    }
}

async fn require_adapter(state: &AppState, adapter_id: &str) -> ApiResult<()> {
    match state.persistence.get_adapter(adapter_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found(format!("adapter not found: {}", adapter_id))),
    }
}

/// POST /api/backup/create
async fn create(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ReplicationJob>)> {
    let request: CreateBackupRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("malformed JSON body: {}", e)))?;

    let file_id = field(&request.file_id, "fileId")?;
    let source = field(&request.source_adapter_id, "sourceAdapterId")?;
    let target = field(&request.target_adapter_id, "targetAdapterId")?;
    if source == target {
        return Err(ApiError::validation("source and target adapters must differ"));
    }

    let file = state
        .persistence
        .get_file(file_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("file not found: {}", file_id)))?;
    let namespace = state
        .persistence
        .get_namespace(&file.namespace_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("namespace not found: {}", file.namespace_id)))?;
    if !namespace.allows(&client.client_id) {
        audit::log_access_denied(
            &client.client_id,
            client.user_id.as_deref(),
            &format!("file:{}", file.id),
            "namespace owned by another client",
        );
        return Err(ApiError::forbidden("client may not back up this file"));
    }

    require_adapter(&state, source).await?;
    require_adapter(&state, target).await?;

    let job = state
        .persistence
        .create_job(ReplicationJob::pending(
            file.id,
            source,
            target,
            Some(client.client_id.clone()),
        ))
        .await?;

    tracing::info!(
        job_id = %job.id,
        client_id = %client.client_id,
        source,
        target,
        "Queued replication job"
    );
    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    status: Option<String>,
}

/// GET /api/backup/status
async fn status(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<ReplicationJob>>> {
    let filter = match query.status.as_deref() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<JobStatus>().map_err(ApiError::Validation)?),
    };

    let jobs = state
        .persistence
        .list_jobs(filter, Some(&client.client_id))
        .await?;
    Ok(Json(jobs))
}

/// GET /api/backup/jobs/:id
async fn job(
    State(state): State<Arc<AppState>>,
    client: AuthClient,
    Path(id): Path<String>,
) -> ApiResult<Json<ReplicationJob>> {
    let job = state
        .persistence
        .get_job(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job not found: {}", id)))?;

    if job.requested_by.as_deref() != Some(client.client_id.as_str()) {
        return Err(ApiError::forbidden("job was requested by another client"));
    }
    Ok(Json(job))
}
