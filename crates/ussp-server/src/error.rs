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
//! HTTP error taxonomy
//!
//! Every handler failure becomes an [`ApiError`], rendered as
//! `{"error": <code>, "error_description": <text>}` with a fixed status.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use ussp_security::AuthError;
use ussp_storage::StorageError;

use crate::persistence::PersistenceError;

/// Error returned by every HTTP handler
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request field
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not entitled
    #[error("{0}")]
    Forbidden(String),

    /// Namespace, adapter, file or job absent
    #[error("{0}")]
    NotFound(String),

    /// Bad authorization code, PKCE mismatch, replay or bad refresh token
    #[error("{0}")]
    InvalidGrant(String),

    /// Redirect URI not registered for the client
    #[error("{0}")]
    InvalidRedirectUri(String),

    /// `grant_type` other than `authorization_code` or `refresh_token`
    #[error("{0}")]
    UnsupportedGrantType(String),

    /// Storage backend failure
    #[error("{0}")]
    AdapterIo(String),

    /// Attempted traversal outside a storage root
    #[error("{0}")]
    PathEscape(String),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable code
    pub error: &'static str,
    /// Human-readable detail
    pub error_description: String,
}

impl ApiError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidGrant(_) => "invalid_grant",
            ApiError::InvalidRedirectUri(_) => "invalid_redirect_uri",
            ApiError::UnsupportedGrantType(_) => "unsupported_grant_type",
            ApiError::AdapterIo(_) => "adapter_io_error",
            ApiError::PathEscape(_) => "path_escape",
            ApiError::Internal(_) => "server_error",
        }
    }

    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidGrant(_)
            | ApiError::InvalidRedirectUri(_)
            | ApiError::UnsupportedGrantType(_)
            | ApiError::PathEscape(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AdapterIo(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for [`ApiError::Validation`]
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    /// Shorthand for [`ApiError::NotFound`]
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    /// Shorthand for [`ApiError::InvalidGrant`]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        ApiError::InvalidGrant(message.into())
    }

    /// Shorthand for [`ApiError::Forbidden`]
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.code(),
            error_description: self.to_string(),
        };

        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StorageError::PathEscape { .. } => ApiError::PathEscape(err.to_string()),
            StorageError::InvalidName(_) => ApiError::Validation(err.to_string()),
            StorageError::Io { .. }
            | StorageError::UnknownAdapterKind(_)
            | StorageError::InvalidConfig(_) => {
                tracing::error!(error = %err, "Storage adapter failure");
                ApiError::AdapterIo(err.to_string())
            }
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            PersistenceError::InvalidTransition { .. } => ApiError::Internal(err.to_string()),
            PersistenceError::Backend(_) => {
                tracing::error!(error = %err, "Persistence failure");
                ApiError::Internal("persistence failure".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => ApiError::Unauthorized("access token expired".to_string()),
            AuthError::InvalidToken(_) => ApiError::Unauthorized("invalid access token".to_string()),
            AuthError::Unauthorized(message) => ApiError::Unauthorized(message),
            AuthError::Internal(e) => {
                tracing::error!(error = %e, "Token service failure");
                ApiError::Internal("token service failure".to_string())
            }
        }
    }
}

/// Result alias for handlers
pub type ApiResult<T> = Result<T, ApiError>;
