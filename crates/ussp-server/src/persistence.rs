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
//! Persistence interface and in-memory implementation
//!
//! The server only talks to [`Persistence`]. The two operations that must be
//! atomic, claiming pending replication jobs and consuming one-time grants,
//! are single trait methods so a database implementation can map them onto
//! `UPDATE ... WHERE` / `SELECT ... FOR UPDATE`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use ussp_storage::AdapterDescriptor;

use crate::model::{
    AuthorizationCode, Client, FileObject, JobStatus, Namespace, RefreshToken, ReplicationJob,
    User,
};

/// Persistence failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Record to update does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Record type
        entity: &'static str,
        /// Lookup key
        key: String,
    },

    /// Job state change not allowed by the state machine
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Job id
        job_id: String,
        /// Current state
        from: JobStatus,
        /// Requested state
        to: JobStatus,
    },

    /// Storage engine failure
    #[error("persistence backend error: {0}")]
    Backend(String),
}

impl PersistenceError {
    fn not_found(entity: &'static str, key: &str) -> Self {
        PersistenceError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// Result alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Record storage used by the authorization flow, file API and replication
#[async_trait]
pub trait Persistence: Send + Sync + std::fmt::Debug {
    /// Look up a client
    async fn get_client(&self, client_id: &str) -> PersistenceResult<Option<Client>>;

    /// Insert `client` unless one with the same id exists.
    /// Returns the stored record and whether it was created.
    async fn insert_client_if_absent(&self, client: Client) -> PersistenceResult<(Client, bool)>;

    /// Add a redirect URI to a client
    async fn add_redirect_uri(&self, client_id: &str, uri: &str) -> PersistenceResult<Client>;

    /// Look up a namespace by id
    async fn get_namespace(&self, id: &str) -> PersistenceResult<Option<Namespace>>;

    /// Look up a namespace by name
    async fn get_namespace_by_name(&self, name: &str) -> PersistenceResult<Option<Namespace>>;

    /// Insert `namespace` unless one with the same name exists
    async fn insert_namespace_if_absent(
        &self,
        namespace: Namespace,
    ) -> PersistenceResult<(Namespace, bool)>;

    /// All namespaces
    async fn list_namespaces(&self) -> PersistenceResult<Vec<Namespace>>;

    /// Look up an adapter descriptor
    async fn get_adapter(&self, id: &str) -> PersistenceResult<Option<AdapterDescriptor>>;

    /// First adapter flagged as default
    async fn default_adapter(&self) -> PersistenceResult<Option<AdapterDescriptor>>;

    /// Insert or replace an adapter descriptor
    async fn upsert_adapter(&self, descriptor: AdapterDescriptor) -> PersistenceResult<()>;

    /// All adapter descriptors
    async fn list_adapters(&self) -> PersistenceResult<Vec<AdapterDescriptor>>;

    /// Look up a file by id
    async fn get_file(&self, id: &str) -> PersistenceResult<Option<FileObject>>;

    /// Look up a file by namespace and path
    async fn find_file(&self, namespace_id: &str, path: &str)
        -> PersistenceResult<Option<FileObject>>;

    /// Files of a namespace, ordered by path
    async fn list_files(&self, namespace_id: &str) -> PersistenceResult<Vec<FileObject>>;

    /// Insert a file record, replacing any record at the same namespace and path
    async fn put_file(&self, file: FileObject) -> PersistenceResult<FileObject>;

    /// Remove a file record; returns whether it existed
    async fn delete_file(&self, id: &str) -> PersistenceResult<bool>;

    /// Store a new replication job
    async fn create_job(&self, job: ReplicationJob) -> PersistenceResult<ReplicationJob>;

    /// Look up a job
    async fn get_job(&self, id: &str) -> PersistenceResult<Option<ReplicationJob>>;

    /// Jobs filtered by status and requester, oldest first
    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        requested_by: Option<&str>,
    ) -> PersistenceResult<Vec<ReplicationJob>>;

    /// Atomically move up to `limit` pending jobs to in-progress and return them
    async fn claim_pending_jobs(&self, limit: usize) -> PersistenceResult<Vec<ReplicationJob>>;

    /// Move an in-progress job to a terminal state
    async fn finish_job(
        &self,
        id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> PersistenceResult<ReplicationJob>;

    /// Reset every in-progress job to pending; returns how many moved
    async fn reset_in_progress_jobs(&self) -> PersistenceResult<usize>;

    /// Store a freshly minted authorization code
    async fn store_authorization_code(&self, code: AuthorizationCode) -> PersistenceResult<()>;

    /// Look up an authorization code
    async fn get_authorization_code(&self, code: &str)
        -> PersistenceResult<Option<AuthorizationCode>>;

    /// Compare-and-swap the consumed flag. Returns `true` for exactly one caller.
    async fn consume_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool>;

    /// Store a refresh token
    async fn store_refresh_token(&self, token: RefreshToken) -> PersistenceResult<()>;

    /// Compare-and-swap the consumed flag of a refresh token.
    /// Returns the record only to the caller that consumed it.
    async fn consume_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Option<RefreshToken>>;

    /// Look up a user by login name
    async fn get_user_by_username(&self, username: &str) -> PersistenceResult<Option<User>>;

    /// Store a user
    async fn create_user(&self, user: User) -> PersistenceResult<()>;
}

#[derive(Default)]
struct Tables {
    clients: HashMap<String, Client>,
    namespaces: HashMap<String, Namespace>,
    adapters: Vec<AdapterDescriptor>,
    files: HashMap<String, FileObject>,
    jobs: HashMap<String, ReplicationJob>,
    codes: HashMap<String, AuthorizationCode>,
    refresh_tokens: HashMap<String, RefreshToken>,
    users: HashMap<String, User>,
}

impl Tables {
    /// Drop grants that can never be redeemed again
    fn evict_spent_grants(&mut self, now: DateTime<Utc>) {
        self.codes
            .retain(|_, c| c.consumed_at.is_none() && c.expires_at > now);
        self.refresh_tokens
            .retain(|_, t| t.consumed_at.is_none() && t.expires_at > now);
    }
}

/// Process-local [`Persistence`] for development and tests
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn get_client(&self, client_id: &str) -> PersistenceResult<Option<Client>> {
        Ok(self.tables.read().await.clients.get(client_id).cloned())
    }

    async fn insert_client_if_absent(&self, client: Client) -> PersistenceResult<(Client, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.clients.get(&client.client_id) {
            return Ok((existing.clone(), false));
        }
        tables
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok((client, true))
    }

    async fn add_redirect_uri(&self, client_id: &str, uri: &str) -> PersistenceResult<Client> {
        let mut tables = self.tables.write().await;
        let client = tables
            .clients
            .get_mut(client_id)
            .ok_or_else(|| PersistenceError::not_found("client", client_id))?;
        client.redirect_uris.insert(uri.to_string());
        Ok(client.clone())
    }

    async fn get_namespace(&self, id: &str) -> PersistenceResult<Option<Namespace>> {
        Ok(self.tables.read().await.namespaces.get(id).cloned())
    }

    async fn get_namespace_by_name(&self, name: &str) -> PersistenceResult<Option<Namespace>> {
        Ok(self
            .tables
            .read()
            .await
            .namespaces
            .values()
            .find(|ns| ns.name == name)
            .cloned())
    }

    async fn insert_namespace_if_absent(
        &self,
        namespace: Namespace,
    ) -> PersistenceResult<(Namespace, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.namespaces.values().find(|ns| ns.name == namespace.name) {
            return Ok((existing.clone(), false));
        }
        tables
            .namespaces
            .insert(namespace.id.clone(), namespace.clone());
        Ok((namespace, true))
    }

    async fn list_namespaces(&self) -> PersistenceResult<Vec<Namespace>> {
        let mut namespaces: Vec<Namespace> =
            self.tables.read().await.namespaces.values().cloned().collect();
        namespaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(namespaces)
    }

    async fn get_adapter(&self, id: &str) -> PersistenceResult<Option<AdapterDescriptor>> {
        Ok(self
            .tables
            .read()
            .await
            .adapters
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn default_adapter(&self) -> PersistenceResult<Option<AdapterDescriptor>> {
        Ok(self
            .tables
            .read()
            .await
            .adapters
            .iter()
            .find(|a| a.is_default)
            .cloned())
    }

    async fn upsert_adapter(&self, descriptor: AdapterDescriptor) -> PersistenceResult<()> {
        let mut tables = self.tables.write().await;
        match tables.adapters.iter_mut().find(|a| a.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => tables.adapters.push(descriptor),
        }
        Ok(())
    }

    async fn list_adapters(&self) -> PersistenceResult<Vec<AdapterDescriptor>> {
        Ok(self.tables.read().await.adapters.clone())
    }

    async fn get_file(&self, id: &str) -> PersistenceResult<Option<FileObject>> {
        Ok(self.tables.read().await.files.get(id).cloned())
    }

    async fn find_file(
        &self,
        namespace_id: &str,
        path: &str,
    ) -> PersistenceResult<Option<FileObject>> {
        Ok(self
            .tables
            .read()
            .await
            .files
            .values()
            .find(|f| f.namespace_id == namespace_id && f.path == path)
            .cloned())
    }

    async fn list_files(&self, namespace_id: &str) -> PersistenceResult<Vec<FileObject>> {
        let mut files: Vec<FileObject> = self
            .tables
            .read()
            .await
            .files
            .values()
            .filter(|f| f.namespace_id == namespace_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn put_file(&self, file: FileObject) -> PersistenceResult<FileObject> {
        let mut tables = self.tables.write().await;
        tables
            .files
            .retain(|_, f| !(f.namespace_id == file.namespace_id && f.path == file.path));
        tables.files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn delete_file(&self, id: &str) -> PersistenceResult<bool> {
        Ok(self.tables.write().await.files.remove(id).is_some())
    }

    async fn create_job(&self, job: ReplicationJob) -> PersistenceResult<ReplicationJob> {
        self.tables
            .write()
            .await
            .jobs
            .insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> PersistenceResult<Option<ReplicationJob>> {
        Ok(self.tables.read().await.jobs.get(id).cloned())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        requested_by: Option<&str>,
    ) -> PersistenceResult<Vec<ReplicationJob>> {
        let mut jobs: Vec<ReplicationJob> = self
            .tables
            .read()
            .await
            .jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .filter(|job| requested_by.map_or(true, |r| job.requested_by.as_deref() == Some(r)))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn claim_pending_jobs(&self, limit: usize) -> PersistenceResult<Vec<ReplicationJob>> {
        let mut tables = self.tables.write().await;

        let mut pending: Vec<(DateTime<Utc>, String)> = tables
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| (job.created_at, job.id.clone()))
            .collect();
        pending.sort();
        pending.truncate(limit);

        let mut claimed = Vec::with_capacity(pending.len());
        for (_, id) in pending {
            if let Some(job) = tables.jobs.get_mut(&id) {
                job.status = JobStatus::InProgress;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn finish_job(
        &self,
        id: &str,
        status: JobStatus,
        error_message: Option<String>,
    ) -> PersistenceResult<ReplicationJob> {
        let mut tables = self.tables.write().await;
        let job = tables
            .jobs
            .get_mut(id)
            .ok_or_else(|| PersistenceError::not_found("replication job", id))?;

        if job.status != JobStatus::InProgress || !status.is_terminal() {
            return Err(PersistenceError::InvalidTransition {
                job_id: id.to_string(),
                from: job.status,
                to: status,
            });
        }

        job.status = status;
        job.error_message = error_message;
        job.completed_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn reset_in_progress_jobs(&self) -> PersistenceResult<usize> {
        let mut tables = self.tables.write().await;
        let mut reset = 0;
        for job in tables.jobs.values_mut() {
            if job.status == JobStatus::InProgress {
                job.status = JobStatus::Pending;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn store_authorization_code(&self, code: AuthorizationCode) -> PersistenceResult<()> {
        let mut tables = self.tables.write().await;
        tables.evict_spent_grants(Utc::now());
        tables.codes.insert(code.code.clone(), code);
        Ok(())
    }

    async fn get_authorization_code(
        &self,
        code: &str,
    ) -> PersistenceResult<Option<AuthorizationCode>> {
        Ok(self.tables.read().await.codes.get(code).cloned())
    }

    async fn consume_authorization_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<bool> {
        let mut tables = self.tables.write().await;
        let won = match tables.codes.get_mut(code) {
            Some(record) if record.consumed_at.is_none() => {
                record.consumed_at = Some(now);
                true
            }
            _ => false,
        };
        tables.evict_spent_grants(now);
        Ok(won)
    }

    async fn store_refresh_token(&self, token: RefreshToken) -> PersistenceResult<()> {
        let mut tables = self.tables.write().await;
        tables.evict_spent_grants(Utc::now());
        tables.refresh_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn consume_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> PersistenceResult<Option<RefreshToken>> {
        let mut tables = self.tables.write().await;
        let previous = match tables.refresh_tokens.get_mut(token) {
            Some(record) if record.consumed_at.is_none() => {
                let previous = record.clone();
                record.consumed_at = Some(now);
                Some(previous)
            }
            _ => None,
        };
        tables.evict_spent_grants(now);
        Ok(previous)
    }

    async fn get_user_by_username(&self, username: &str) -> PersistenceResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, user: User) -> PersistenceResult<()> {
        self.tables.write().await.users.insert(user.id.clone(), user);
        Ok(())
    }
}
