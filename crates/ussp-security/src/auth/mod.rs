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
//! Token signing and password hashing
//!
//! Access tokens are self-contained HS256 JWTs carrying
//! `{client_id, sub, iat, exp}`; verification needs no storage lookup.
//! Refresh tokens are opaque random strings resolved through persistence by
//! the caller, so they can be revoked.
//!
//! # Example
//!
//! ```
//! use chrono::Duration;
//! use ussp_security::auth::TokenService;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tokens = TokenService::new("secret-key", Duration::hours(1));
//! let token = tokens.issue_access_token("acme-app", Some("alice"))?;
//! let claims = tokens.verify_access_token(&token)?;
//! assert_eq!(claims.client_id, "acme-app");
//! # Ok(())
//! # }
//! ```

pub mod password;
pub mod tokens;

#[cfg(feature = "middleware")]
pub mod middleware;

pub use password::{hash_password, verify_password};
pub use tokens::{AccessClaims, TokenPair, TokenService};

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed token or bad signature
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Well-formed token past its expiry
    #[error("Token expired")]
    TokenExpired,

    /// Missing or unusable credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal error
    #[error("Authentication error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
