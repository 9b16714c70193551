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
//! Audit logging for security events
//!
//! Provides structured logging for security-critical events including:
//! - Failed and successful user authentication
//! - Attempted path escapes in storage requests
//! - Rejected redirect URIs and authorization grants
//! - Client auto-provisioning
//!
//! Audit logs are emitted under the `ussp::security::audit` target using the
//! `tracing` framework, so they can be routed separately by a subscriber.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Tracing target for every audit event
pub const AUDIT_TARGET: &str = "ussp::security::audit";

/// Security event types for audit logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Failed authentication attempt (login, bearer token)
    AuthenticationFailed,
    /// Successful login
    AuthenticationSuccess,
    /// File name or namespace tried to leave its storage root
    PathEscapeAttempt,
    /// Redirect URI not registered for the client
    InvalidRedirectUri,
    /// Authorization code or refresh token rejected
    InvalidGrant,
    /// Authenticated caller not entitled to the resource
    AccessDenied,
    /// Client record created on first authorization request
    ClientProvisioned,
}

/// Audit event with structured fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event type
    pub event_type: AuditEventType,
    /// Timestamp of the event
    pub timestamp: SystemTime,
    /// OAuth client identifier (if known)
    pub client_id: Option<String>,
    /// User identifier (if authenticated)
    pub user_id: Option<String>,
    /// Namespace (if applicable)
    pub namespace: Option<String>,
    /// Request or file path
    pub path: Option<String>,
    /// Additional context or error message
    pub message: String,
    /// Additional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(event_type: AuditEventType, message: impl Into<String>) -> Self {
        Self {
            event_type,
            timestamp: SystemTime::now(),
            client_id: None,
            user_id: None,
            namespace: None,
            path: None,
            message: message.into(),
            metadata: None,
        }
    }

    /// Set client identifier
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set user ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set additional metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Log this audit event using tracing
    pub fn log(&self) {
        let event_json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());

        match self.event_type {
            AuditEventType::AuthenticationFailed
            | AuditEventType::PathEscapeAttempt
            | AuditEventType::InvalidRedirectUri
            | AuditEventType::InvalidGrant
            | AuditEventType::AccessDenied => {
                tracing::warn!(
                    target: AUDIT_TARGET,
                    event_type = ?self.event_type,
                    client_id = ?self.client_id,
                    user_id = ?self.user_id,
                    namespace = ?self.namespace,
                    path = ?self.path,
                    message = %self.message,
                    audit_event = %event_json,
                    "Security audit event"
                );
            }
            AuditEventType::AuthenticationSuccess => {
                tracing::info!(
                    target: AUDIT_TARGET,
                    event_type = ?self.event_type,
                    user_id = ?self.user_id,
                    message = %self.message,
                    audit_event = %event_json,
                    "Authentication successful"
                );
            }
            AuditEventType::ClientProvisioned => {
                tracing::info!(
                    target: AUDIT_TARGET,
                    event_type = ?self.event_type,
                    client_id = ?self.client_id,
                    message = %self.message,
                    audit_event = %event_json,
                    "Client provisioned"
                );
            }
        }
    }
}

/// Log a failed authentication attempt
pub fn log_authentication_failed(user_id: Option<&str>, reason: &str) {
    AuditEvent::new(
        AuditEventType::AuthenticationFailed,
        format!("Authentication failed: {}", reason),
    )
    .with_user_id(user_id.unwrap_or("unknown"))
    .log();
}

/// Log a successful login
pub fn log_authentication_success(user_id: &str) {
    AuditEvent::new(AuditEventType::AuthenticationSuccess, "Authentication successful")
        .with_user_id(user_id)
        .log();
}

/// Log an attempted escape from a storage root
pub fn log_path_escape_attempt(client_id: Option<&str>, namespace: &str, path: &str) {
    let mut event = AuditEvent::new(
        AuditEventType::PathEscapeAttempt,
        "Path escape attempt rejected",
    )
    .with_namespace(namespace)
    .with_path(path);

    if let Some(cid) = client_id {
        event = event.with_client_id(cid);
    }

    event.log();
}

/// Log a redirect URI that is not registered for the client
pub fn log_invalid_redirect_uri(client_id: &str, redirect_uri: &str) {
    AuditEvent::new(
        AuditEventType::InvalidRedirectUri,
        "Redirect URI not registered for client",
    )
    .with_client_id(client_id)
    .with_metadata(serde_json::json!({ "redirect_uri": redirect_uri }))
    .log();
}

/// Log a rejected authorization code or refresh token
pub fn log_invalid_grant(client_id: &str, reason: &str) {
    AuditEvent::new(
        AuditEventType::InvalidGrant,
        format!("Invalid grant: {}", reason),
    )
    .with_client_id(client_id)
    .log();
}

/// Log an access denied event
pub fn log_access_denied(client_id: &str, user_id: Option<&str>, resource: &str, reason: &str) {
    let mut event = AuditEvent::new(
        AuditEventType::AccessDenied,
        format!("Access denied: {}", reason),
    )
    .with_client_id(client_id)
    .with_path(resource);

    if let Some(uid) = user_id {
        event = event.with_user_id(uid);
    }

    event.log();
}

/// Log the auto-provisioning of a new client
pub fn log_client_provisioned(client_id: &str, redirect_uri: &str) {
    AuditEvent::new(AuditEventType::ClientProvisioned, "Client auto-provisioned")
        .with_client_id(client_id)
        .with_metadata(serde_json::json!({ "redirect_uri": redirect_uri }))
        .log();
}
