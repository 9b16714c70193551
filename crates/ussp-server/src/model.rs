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
//! Persistent records managed by the server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use ussp_security::PkceMethod;
use uuid::Uuid;

/// Fresh random record id
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// OAuth client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Developer-chosen identifier
    pub client_id: String,
    /// Generated secret, shown once
    #[serde(skip_serializing)]
    pub secret: String,
    /// Display name
    pub name: String,
    /// Registered redirect URIs
    pub redirect_uris: BTreeSet<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("name", &self.name)
            .field("redirect_uris", &self.redirect_uris)
            .finish_non_exhaustive()
    }
}

/// Logical bucket of files bound to one adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    /// Record id, also the key handed to the adapter
    pub id: String,
    /// Unique name
    pub name: String,
    /// Adapter holding the bytes; `None` fails at first file access
    pub adapter_id: Option<String>,
    /// Upper bound on stored bytes
    pub quota_bytes: Option<u64>,
    /// Only this client may use the namespace; `None` means shared
    pub owner_client: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Namespace {
    /// Whether `client_id` may read and write this namespace
    pub fn allows(&self, client_id: &str) -> bool {
        self.owner_client
            .as_deref()
            .map_or(true, |owner| owner == client_id)
    }
}

/// Metadata of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileObject {
    /// Record id
    pub id: String,
    /// Owning namespace
    pub namespace_id: String,
    /// Path as supplied by the uploader
    pub path: String,
    /// Stored size
    pub size_bytes: u64,
    /// Content type
    pub mime_type: String,
    /// SHA-256 hex of the stored bytes
    pub content_fingerprint: String,
    /// Upload time
    pub created_at: DateTime<Utc>,
}

/// Replication job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the worker
    Pending,
    /// Claimed by the worker
    InProgress,
    /// Bytes copied
    Completed,
    /// Gave up; see `error_message`
    Failed,
}

impl JobStatus {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and Failed never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" | "inprogress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Copy of one file between two adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationJob {
    /// Record id
    pub id: String,
    /// File to copy
    pub file_id: String,
    /// Adapter read from
    pub source_adapter_id: String,
    /// Adapter written to
    pub target_adapter_id: String,
    /// Current state
    pub status: JobStatus,
    /// Why the job failed
    pub error_message: Option<String>,
    /// Client that requested the copy
    pub requested_by: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReplicationJob {
    /// New pending job
    pub fn pending(
        file_id: impl Into<String>,
        source_adapter_id: impl Into<String>,
        target_adapter_id: impl Into<String>,
        requested_by: Option<String>,
    ) -> Self {
        Self {
            id: new_id(),
            file_id: file_id.into(),
            source_adapter_id: source_adapter_id.into(),
            target_adapter_id: target_adapter_id.into(),
            status: JobStatus::Pending,
            error_message: None,
            requested_by,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// One-time authorization code bound to a PKCE challenge
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    /// The code itself
    pub code: String,
    /// Client it was issued to
    pub client_id: String,
    /// Redirect URI it was delivered to
    pub redirect_uri: String,
    /// PKCE challenge from the authorize request
    pub code_challenge: String,
    /// PKCE method from the authorize request
    pub code_challenge_method: PkceMethod,
    /// User who approved
    pub user_id: String,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Set on first successful exchange
    pub consumed_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationCode")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("code_challenge_method", &self.code_challenge_method)
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .field("consumed_at", &self.consumed_at)
            .finish_non_exhaustive()
    }
}

/// Opaque, single-use refresh token
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    /// The token itself
    pub token: String,
    /// Client it was issued to
    pub client_id: String,
    /// User behind the original grant
    pub user_id: Option<String>,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Set when rotated
    pub consumed_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .field("consumed_at", &self.consumed_at)
            .finish_non_exhaustive()
    }
}

/// A person who can log in and approve consent
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    /// Record id
    pub id: String,
    /// Login name
    pub username: String,
    /// bcrypt hash
    pub password_hash: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
