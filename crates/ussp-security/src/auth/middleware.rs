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
//! Axum middleware for bearer-token authentication
//!
//! Requests without a valid, unexpired access token are answered with
//! `401 Unauthorized` and a JSON error body before reaching the handler.
//! Authenticated requests carry an [`AuthClient`] in their extensions.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{AuthError, TokenService};
use crate::audit::log_authentication_failed;

/// Authenticated caller extracted from a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthClient {
    /// Client the token was issued to
    pub client_id: String,

    /// Approving user, if any
    pub user_id: Option<String>,
}

/// Implement FromRequestParts for AuthClient to enable it as an extractor
#[async_trait]
impl<S> FromRequestParts<S> for AuthClient
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthClient>()
            .cloned()
            .ok_or_else(|| unauthorized_response("authentication required"))
    }
}

/// 401 response with an OAuth-style JSON body
pub fn unauthorized_response(description: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(serde_json::json!({
            "error": "unauthorized",
            "error_description": description,
        })),
    )
        .into_response()
}

/// Authenticate a request from its `Authorization` header
pub fn authenticate(tokens: &TokenService, req: &Request) -> Result<AuthClient, AuthError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AuthError::Unauthorized("missing bearer token".to_string()))?
        .to_str()
        .map_err(|_| AuthError::Unauthorized("malformed Authorization header".to_string()))?;

    let token = TokenService::extract_bearer(header_value)?;
    let claims = tokens.verify_access_token(token)?;

    Ok(AuthClient {
        client_id: claims.client_id,
        user_id: claims.sub,
    })
}

/// Middleware function for Axum
///
/// Use with `axum::middleware::from_fn`:
/// `from_fn(move |req, next| bearer_auth_middleware(Arc::clone(&tokens), req, next))`
pub async fn bearer_auth_middleware(
    tokens: Arc<TokenService>,
    mut req: Request,
    next: Next,
) -> Response {
    match authenticate(&tokens, &req) {
        Ok(client) => {
            // Insert authenticated client into request extensions
            req.extensions_mut().insert(client);
            next.run(req).await
        }
        Err(e) => {
            log_authentication_failed(None, &e.to_string());
            let description = match e {
                AuthError::TokenExpired => "access token expired",
                AuthError::Unauthorized(_) => "missing or malformed bearer token",
                _ => "invalid access token",
            };
            unauthorized_response(description)
        }
    }
}
