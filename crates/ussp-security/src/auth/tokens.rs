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
//! Access token issuing and verification
//!
//! Tokens use the compact three-segment JWS form signed with HMAC-SHA256.
//! Expiry is checked with zero leeway: a token whose `exp` is in the past is
//! rejected even though its signature is valid.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{AuthError, AuthResult};
use crate::random::generate_refresh_token;

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Client the token was issued to
    pub client_id: String,

    /// Approving user, when the grant involved one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issued at (unix seconds)
    pub iat: i64,

    /// Expiration time (unix seconds)
    pub exp: i64,
}

/// Token pair returned from the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Signed access token
    pub access_token: String,
    /// Opaque refresh token
    pub refresh_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues and verifies access tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
}

impl TokenService {
    /// Create a token service with a signing secret and access token lifetime
    pub fn new(secret: &str, access_token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_ttl,
        }
    }

    /// Access token lifetime
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    /// Issue an access token valid from now
    pub fn issue_access_token(&self, client_id: &str, user_id: Option<&str>) -> AuthResult<String> {
        self.issue_access_token_at(client_id, user_id, Utc::now())
    }

    /// Issue an access token as if it were issued at `issued_at`
    pub fn issue_access_token_at(
        &self,
        client_id: &str,
        user_id: Option<&str>,
        issued_at: DateTime<Utc>,
    ) -> AuthResult<String> {
        let claims = AccessClaims {
            client_id: client_id.to_string(),
            sub: user_id.map(str::to_string),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.access_token_ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.into()))
    }

    /// Issue a fresh access token plus an opaque refresh token
    pub fn issue_pair(&self, client_id: &str, user_id: Option<&str>) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(client_id, user_id)?,
            refresh_token: generate_refresh_token(),
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_ttl.num_seconds(),
        })
    }

    /// Verify signature and expiry, returning the claims
    ///
    /// # Errors
    /// `AuthError::TokenExpired` when `exp` has passed, `AuthError::InvalidToken`
    /// for anything malformed or wrongly signed.
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// Extract the token from an `Authorization` header value
    ///
    /// Expects format: "Bearer <token>" (scheme is case-insensitive)
    pub fn extract_bearer(auth_header: &str) -> AuthResult<&str> {
        let (scheme, token) = auth_header
            .split_once(' ')
            .ok_or_else(|| AuthError::Unauthorized("Invalid Authorization header format".to_string()))?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(AuthError::Unauthorized(
                "Invalid Authorization header format".to_string(),
            ));
        }
        Ok(token)
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("access_token_ttl", &self.access_token_ttl)
            .finish_non_exhaustive()
    }
}
