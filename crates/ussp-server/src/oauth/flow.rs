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
//! Authorization code flow
//!
//! Request validation, client and namespace provisioning, code issuance and
//! the two token grants. Handlers in the parent module stay thin wrappers
//! around these functions.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use ussp_security::{
    audit, pkce,
    random::{generate_authorization_code, generate_client_secret},
    PkceMethod, TokenPair,
};

use crate::error::{ApiError, ApiResult};
use crate::model::{new_id, AuthorizationCode, Client, Namespace, RefreshToken};
use crate::security::{validate_client_id, validate_redirect_uri};
use crate::state::AppState;

/// Raw authorize parameters as they arrive on the query string or a form
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizeParams {
    /// Requesting client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Where the code is delivered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// PKCE challenge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// `S256` or `plain`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
    /// Opaque client state, echoed back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Requested scope, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Authorize request that passed parameter validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAuthorize {
    /// Requesting client
    pub client_id: String,
    /// Redirect URI exactly as supplied
    pub redirect_uri: String,
    /// PKCE challenge
    pub code_challenge: String,
    /// PKCE method
    pub code_challenge_method: PkceMethod,
    /// Opaque client state
    pub state: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
}

impl ValidatedAuthorize {
    /// Back to the wire form, for re-rendering in hidden fields
    pub fn to_params(&self) -> AuthorizeParams {
        AuthorizeParams {
            client_id: Some(self.client_id.clone()),
            redirect_uri: Some(self.redirect_uri.clone()),
            code_challenge: Some(self.code_challenge.clone()),
            code_challenge_method: Some(self.code_challenge_method.as_str().to_string()),
            state: self.state.clone(),
            scope: self.scope.clone(),
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> ApiResult<&'a str> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::validation(format!("missing required parameter: {}", name))),
    }
}

/// Check presence and shape of the authorize parameters
///
/// A missing `code_challenge_method` means `plain`, as in RFC 7636.
pub fn validate_params(params: &AuthorizeParams) -> ApiResult<ValidatedAuthorize> {
    let client_id = required(&params.client_id, "client_id")?;
    validate_client_id(client_id)
        .map_err(|reason| ApiError::validation(format!("invalid client_id: {}", reason)))?;

    let redirect_uri = required(&params.redirect_uri, "redirect_uri")?;
    validate_redirect_uri(redirect_uri)
        .map_err(|reason| ApiError::validation(format!("invalid redirect_uri: {}", reason)))?;

    let code_challenge = required(&params.code_challenge, "code_challenge")?;
    if !pkce::is_well_formed(code_challenge) {
        return Err(ApiError::validation(
            "code_challenge must be 43-128 characters of [A-Za-z0-9-._~]",
        ));
    }

    let code_challenge_method = match params.code_challenge_method.as_deref() {
        None | Some("") => PkceMethod::Plain,
        Some(method) => method.parse::<PkceMethod>().map_err(|_| {
            ApiError::validation(format!("unsupported code_challenge_method: {}", method))
        })?,
    };

    Ok(ValidatedAuthorize {
        client_id: client_id.to_string(),
        redirect_uri: redirect_uri.to_string(),
        code_challenge: code_challenge.to_string(),
        code_challenge_method,
        state: params.state.clone(),
        scope: params.scope.clone().filter(|s| !s.is_empty()),
    })
}

/// Register the client and its namespace on first sight
///
/// A client with no registered redirect URIs adopts the supplied one.
pub async fn provision(state: &AppState, request: &ValidatedAuthorize) -> ApiResult<Client> {
    let candidate = Client {
        client_id: request.client_id.clone(),
        secret: generate_client_secret(),
        name: request.client_id.clone(),
        redirect_uris: BTreeSet::from([request.redirect_uri.clone()]),
        created_at: Utc::now(),
    };

    let (mut client, created) = state.persistence.insert_client_if_absent(candidate).await?;
    if created {
        audit::log_client_provisioned(&client.client_id, &request.redirect_uri);
        tracing::info!(client_id = %client.client_id, "Provisioned OAuth client");
    } else if client.redirect_uris.is_empty() {
        client = state
            .persistence
            .add_redirect_uri(&client.client_id, &request.redirect_uri)
            .await?;
        tracing::info!(client_id = %client.client_id, "Registered first redirect URI");
    }

    ensure_namespace(state, &client.client_id).await?;
    Ok(client)
}

async fn ensure_namespace(state: &AppState, client_id: &str) -> ApiResult<Namespace> {
    if let Some(existing) = state.persistence.get_namespace_by_name(client_id).await? {
        return Ok(existing);
    }

    let adapter_id = state.persistence.default_adapter().await?.map(|d| d.id);
    if adapter_id.is_none() {
        tracing::warn!(client_id, "No default adapter; namespace created without storage");
    }

    let (namespace, created) = state
        .persistence
        .insert_namespace_if_absent(Namespace {
            id: new_id(),
            name: client_id.to_string(),
            adapter_id,
            quota_bytes: None,
            owner_client: Some(client_id.to_string()),
            created_at: Utc::now(),
        })
        .await?;
    if created {
        tracing::info!(client_id, namespace_id = %namespace.id, "Provisioned namespace");
    }
    Ok(namespace)
}

/// Reject redirect URIs the client never registered
pub fn check_redirect_uri(client: &Client, redirect_uri: &str) -> ApiResult<()> {
    if client.redirect_uris.contains(redirect_uri) {
        return Ok(());
    }
    audit::log_invalid_redirect_uri(&client.client_id, redirect_uri);
    Err(ApiError::InvalidRedirectUri(format!(
        "redirect_uri is not registered for client '{}'",
        client.client_id
    )))
}

/// Mint and store a single-use authorization code
pub async fn issue_code(
    state: &AppState,
    request: &ValidatedAuthorize,
    user_id: &str,
) -> ApiResult<String> {
    let code = generate_authorization_code();
    state
        .persistence
        .store_authorization_code(AuthorizationCode {
            code: code.clone(),
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method,
            user_id: user_id.to_string(),
            expires_at: Utc::now() + state.auth.code_ttl,
            consumed_at: None,
        })
        .await?;

    tracing::debug!(client_id = %request.client_id, "Issued authorization code");
    Ok(code)
}

/// Append query parameters to a redirect URI
pub fn redirect_with(redirect_uri: &str, params: &[(&str, Option<&str>)]) -> ApiResult<String> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| ApiError::validation(format!("invalid redirect_uri: {}", e)))?;
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in params {
            if let Some(value) = value {
                query.append_pair(name, value);
            }
        }
    }
    Ok(url.into())
}

/// Token endpoint request, from JSON or a form body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    #[serde(default)]
    pub grant_type: Option<String>,
    /// Authorization code
    #[serde(default)]
    pub code: Option<String>,
    /// Requesting client
    #[serde(default)]
    pub client_id: Option<String>,
    /// PKCE verifier
    #[serde(default)]
    pub code_verifier: Option<String>,
    /// Optional, must match the code's redirect URI when present
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn reject(client_id: &str, reason: &str) -> ApiError {
    audit::log_invalid_grant(client_id, reason);
    ApiError::invalid_grant(reason)
}

/// Dispatch on `grant_type`, which defaults to `authorization_code`
pub async fn grant(state: &AppState, request: &TokenRequest) -> ApiResult<TokenPair> {
    match request.grant_type.as_deref() {
        None | Some("") | Some("authorization_code") => {
            exchange_code(
                state,
                required(&request.code, "code")?,
                required(&request.client_id, "client_id")?,
                required(&request.code_verifier, "code_verifier")?,
                request.redirect_uri.as_deref().filter(|r| !r.is_empty()),
            )
            .await
        }
        Some("refresh_token") => {
            refresh(
                state,
                required(&request.refresh_token, "refresh_token")?,
                required(&request.client_id, "client_id")?,
            )
            .await
        }
        Some(other) => Err(ApiError::UnsupportedGrantType(format!(
            "unsupported grant_type: {}",
            other
        ))),
    }
}

/// Redeem an authorization code for a token pair
pub async fn exchange_code(
    state: &AppState,
    code: &str,
    client_id: &str,
    code_verifier: &str,
    redirect_uri: Option<&str>,
) -> ApiResult<TokenPair> {
    let now = Utc::now();
    let record = state
        .persistence
        .get_authorization_code(code)
        .await?
        .ok_or_else(|| reject(client_id, "unknown authorization code"))?;

    if record.client_id != client_id {
        return Err(reject(client_id, "authorization code was issued to another client"));
    }
    if record.expires_at <= now {
        return Err(reject(client_id, "authorization code expired"));
    }
    if record.consumed_at.is_some() {
        return Err(reject(client_id, "authorization code already used"));
    }
    if let Some(redirect_uri) = redirect_uri {
        if redirect_uri != record.redirect_uri {
            return Err(reject(client_id, "redirect_uri does not match authorization request"));
        }
    }
    if !pkce::is_well_formed(code_verifier)
        || !pkce::verify_challenge(
            code_verifier,
            &record.code_challenge,
            record.code_challenge_method,
        )
    {
        return Err(reject(client_id, "PKCE verification failed"));
    }

    // Concurrent redemptions race here; exactly one wins.
    if !state.persistence.consume_authorization_code(code, now).await? {
        return Err(reject(client_id, "authorization code already used"));
    }

    let pair = issue_tokens(state, client_id, Some(&record.user_id)).await?;
    audit::log_authentication_success(&record.user_id);
    tracing::info!(client_id, user_id = %record.user_id, "Exchanged authorization code");
    Ok(pair)
}

/// Rotate a refresh token
///
/// The presented token is consumed before any other check, so a token shown
/// by the wrong client is burned as well.
pub async fn refresh(state: &AppState, token: &str, client_id: &str) -> ApiResult<TokenPair> {
    let now = Utc::now();
    let record = state
        .persistence
        .consume_refresh_token(token, now)
        .await?
        .ok_or_else(|| reject(client_id, "unknown or used refresh token"))?;

    if record.client_id != client_id {
        return Err(reject(client_id, "refresh token was issued to another client"));
    }
    if record.expires_at <= now {
        return Err(reject(client_id, "refresh token expired"));
    }

    let pair = issue_tokens(state, client_id, record.user_id.as_deref()).await?;
    tracing::info!(client_id, "Rotated refresh token");
    Ok(pair)
}

async fn issue_tokens(
    state: &AppState,
    client_id: &str,
    user_id: Option<&str>,
) -> ApiResult<TokenPair> {
    let pair = state.tokens.issue_pair(client_id, user_id)?;
    state
        .persistence
        .store_refresh_token(RefreshToken {
            token: pair.refresh_token.clone(),
            client_id: client_id.to_string(),
            user_id: user_id.map(str::to_string),
            expires_at: Utc::now() + state.auth.refresh_token_ttl,
            consumed_at: None,
        })
        .await?;
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AuthorizeParams {
        AuthorizeParams {
            client_id: Some("acme-app".to_string()),
            redirect_uri: Some("http://localhost:3000/cb".to_string()),
            code_challenge: Some(pkce::s256_challenge(&"v".repeat(43))),
            code_challenge_method: Some("S256".to_string()),
            state: Some("xyz".to_string()),
            scope: None,
        }
    }

    #[test]
    fn test_validate_params_ok() {
        let validated = validate_params(&params()).unwrap();
        assert_eq!(validated.client_id, "acme-app");
        assert_eq!(validated.code_challenge_method, PkceMethod::S256);
        assert_eq!(validated.to_params(), params());
    }

    #[test]
    fn test_validate_params_requires_pkce() {
        let mut p = params();
        p.code_challenge = None;
        assert!(matches!(validate_params(&p), Err(ApiError::Validation(_))));

        let mut p = params();
        p.code_challenge = Some("short".to_string());
        assert!(matches!(validate_params(&p), Err(ApiError::Validation(_))));

        let mut p = params();
        p.code_challenge_method = Some("S512".to_string());
        assert!(matches!(validate_params(&p), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_missing_method_defaults_to_plain() {
        let mut p = params();
        p.code_challenge_method = None;
        assert_eq!(validate_params(&p).unwrap().code_challenge_method, PkceMethod::Plain);
    }

    #[test]
    fn test_empty_state_is_echoed() {
        let mut p = params();
        p.state = Some(String::new());
        let validated = validate_params(&p).unwrap();
        assert_eq!(validated.state.as_deref(), Some(""));

        let url = redirect_with(
            &validated.redirect_uri,
            &[("code", Some("abc")), ("state", validated.state.as_deref())],
        )
        .unwrap();
        assert_eq!(url, "http://localhost:3000/cb?code=abc&state=");

        p.state = None;
        assert_eq!(validate_params(&p).unwrap().state, None);
    }

    #[test]
    fn test_validate_params_rejects_bad_redirect() {
        let mut p = params();
        p.redirect_uri = Some("javascript:alert(1)".to_string());
        assert!(matches!(validate_params(&p), Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_redirect_with_keeps_existing_query() {
        let url = redirect_with(
            "http://localhost:3000/cb?tenant=1",
            &[("code", Some("abc")), ("state", None)],
        )
        .unwrap();
        assert_eq!(url, "http://localhost:3000/cb?tenant=1&code=abc");

        let url = redirect_with("https://app.test/cb", &[("state", Some("a b&c"))]).unwrap();
        assert_eq!(url, "https://app.test/cb?state=a+b%26c");
    }
}
