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

//! Security primitives for USSP
//!
//! - [`pkce`]: Proof Key for Code Exchange challenge generation and verification
//! - [`random`]: opaque random identifiers (authorization codes, refresh tokens,
//!   client secrets, session ids)
//! - [`compare`]: constant-time comparison
//! - [`audit`]: structured security audit events
//! - `auth` (feature `auth`): signed access tokens and password hashing
//! - `auth::middleware` (feature `middleware`): bearer-token middleware for axum

// Audit logging module
pub mod audit;

pub mod compare;
pub mod pkce;
pub mod random;

// Authentication module
#[cfg(feature = "auth")]
pub mod auth;

// Re-export commonly used types
pub use audit::{
    log_access_denied, log_authentication_failed, log_authentication_success,
    log_client_provisioned, log_invalid_grant, log_invalid_redirect_uri,
    log_path_escape_attempt, AuditEvent, AuditEventType,
};
pub use compare::constant_time_eq;
pub use pkce::{PkceChallenge, PkceMethod};

#[cfg(feature = "auth")]
pub use auth::{AccessClaims, AuthError, AuthResult, TokenPair, TokenService};

#[cfg(feature = "middleware")]
pub use auth::middleware::{bearer_auth_middleware, AuthClient};
