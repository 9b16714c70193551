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
use chrono::Duration;
use std::sync::Arc;
use ussp_security::TokenService;
use ussp_storage::{AdapterRegistry, StorageAdapter};

use crate::error::{ApiError, ApiResult};
use crate::model::Namespace;
use crate::persistence::Persistence;
use crate::session::SessionStore;

/// Lifetimes and cookie settings of the authorization server
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Authorization code lifetime
    pub code_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Session lifetime, used for the cookie `Max-Age`
    pub session_ttl: Duration,
    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
    /// Hash checked for unknown usernames, at the same cost as real users
    pub decoy_password_hash: String,
}

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    /// Record storage
    pub persistence: Arc<dyn Persistence>,

    /// Login sessions
    pub sessions: Arc<dyn SessionStore>,

    /// Live adapter cache
    pub registry: Arc<AdapterRegistry>,

    /// Access token signing and verification
    pub tokens: Arc<TokenService>,

    /// Code, token and cookie settings
    pub auth: AuthSettings,

    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl AppState {
    /// Create state with default body limit
    pub fn new(
        persistence: Arc<dyn Persistence>,
        sessions: Arc<dyn SessionStore>,
        registry: Arc<AdapterRegistry>,
        tokens: Arc<TokenService>,
        auth: AuthSettings,
    ) -> Self {
        Self {
            persistence,
            sessions,
            registry,
            tokens,
            auth,
            max_body_bytes: 512 * 1024 * 1024,
        }
    }

    /// Override the request body limit
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Resolve an adapter id to a live adapter
    pub async fn adapter(&self, adapter_id: &str) -> ApiResult<Arc<dyn StorageAdapter>> {
        let descriptor = self
            .persistence
            .get_adapter(adapter_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("adapter not found: {}", adapter_id)))?;
        Ok(self.registry.resolve(&descriptor).await?)
    }

    /// Resolve the adapter a namespace is bound to
    pub async fn namespace_adapter(
        &self,
        namespace: &Namespace,
    ) -> ApiResult<Arc<dyn StorageAdapter>> {
        let adapter_id = namespace.adapter_id.as_deref().ok_or_else(|| {
            ApiError::not_found(format!(
                "adapter not found: namespace '{}' has no storage adapter",
                namespace.name
            ))
        })?;
        self.adapter(adapter_id).await
    }
}
