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
#![allow(clippy::unwrap_used)]
//! Access token lifetime tests
//!
//! A token is accepted until `iat + ttl` and rejected with
//! `AuthError::TokenExpired` afterwards, regardless of a valid signature.

use chrono::{Duration, Utc};
use ussp_security::{AuthError, TokenService};

const SECRET: &str = "ttl-test-secret";

#[test]
fn test_fresh_token_is_valid() {
    let tokens = TokenService::new(SECRET, Duration::seconds(3600));
    let token = tokens.issue_access_token("acme-app", Some("alice")).unwrap();

    let claims = tokens.verify_access_token(&token).unwrap();
    assert_eq!(claims.exp - claims.iat, 3600);
    assert!(claims.exp > Utc::now().timestamp());
}

#[test]
fn test_token_near_end_of_lifetime_is_valid() {
    let tokens = TokenService::new(SECRET, Duration::seconds(3600));
    let issued = Utc::now() - Duration::seconds(3600 - 60);
    let token = tokens.issue_access_token_at("acme-app", None, issued).unwrap();

    assert!(tokens.verify_access_token(&token).is_ok());
}

#[test]
fn test_token_past_lifetime_is_expired() {
    let tokens = TokenService::new(SECRET, Duration::seconds(3600));
    let issued = Utc::now() - Duration::seconds(3600 + 5);
    let token = tokens.issue_access_token_at("acme-app", None, issued).unwrap();

    assert!(matches!(
        tokens.verify_access_token(&token),
        Err(AuthError::TokenExpired)
    ));
}

#[test]
fn test_short_ttl_expires() {
    let tokens = TokenService::new(SECRET, Duration::seconds(1));
    let issued = Utc::now() - Duration::seconds(10);
    let token = tokens.issue_access_token_at("acme-app", None, issued).unwrap();

    assert!(matches!(
        tokens.verify_access_token(&token),
        Err(AuthError::TokenExpired)
    ));
}

#[test]
fn test_pair_reports_configured_lifetime() {
    let tokens = TokenService::new(SECRET, Duration::minutes(15));
    let pair = tokens.issue_pair("acme-app", Some("alice")).unwrap();

    assert_eq!(pair.token_type, "Bearer");
    assert_eq!(pair.expires_in, 900);
    assert_eq!(pair.refresh_token.len(), 64);
    assert_ne!(pair.access_token, pair.refresh_token);
}

#[test]
fn test_expired_token_from_other_secret_is_invalid_not_expired() {
    let issuer = TokenService::new("another-secret", Duration::seconds(60));
    let verifier = TokenService::new(SECRET, Duration::seconds(60));
    let token = issuer
        .issue_access_token_at("acme-app", None, Utc::now() - Duration::hours(2))
        .unwrap();

    // Signature is checked before expiry
    assert!(matches!(
        verifier.verify_access_token(&token),
        Err(AuthError::InvalidToken(_))
    ));
}
