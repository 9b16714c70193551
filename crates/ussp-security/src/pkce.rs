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

//! PKCE (RFC 7636) challenge generation and verification
//!
//! A verifier is 32 random bytes rendered as unpadded base64url (43 chars).
//! The `S256` challenge is `base64url(SHA-256(verifier))`. `plain` is accepted
//! for compatibility, but only `S256` is ever generated.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::compare::constant_time_eq;

/// Minimum verifier / challenge length
pub const MIN_LENGTH: usize = 43;
/// Maximum verifier / challenge length
pub const MAX_LENGTH: usize = 128;

/// Code challenge transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceMethod {
    /// SHA-256 then base64url
    S256,
    /// Challenge equals verifier
    #[serde(rename = "plain")]
    Plain,
}

impl PkceMethod {
    /// Wire name (`S256` or `plain`)
    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
            PkceMethod::Plain => "plain",
        }
    }
}

impl fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unsupported `code_challenge_method` values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported code_challenge_method: {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for PkceMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(PkceMethod::S256),
            "plain" => Ok(PkceMethod::Plain),
            other => Err(UnsupportedMethod(other.to_string())),
        }
    }
}

/// A freshly generated verifier with its challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Secret kept by the client until the token exchange
    pub verifier: String,
    /// Value sent on the authorization request
    pub challenge: String,
    /// Always [`PkceMethod::S256`]
    pub method: PkceMethod,
}

/// Generate a random verifier and its `S256` challenge
pub fn generate_challenge() -> PkceChallenge {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = s256_challenge(&verifier);
    PkceChallenge {
        verifier,
        challenge,
        method: PkceMethod::S256,
    }
}

/// `base64url(SHA-256(verifier))` without padding
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Check a verifier against a stored challenge
///
/// Both methods compare in constant time.
pub fn verify_challenge(verifier: &str, challenge: &str, method: PkceMethod) -> bool {
    match method {
        PkceMethod::S256 => {
            constant_time_eq(s256_challenge(verifier).as_bytes(), challenge.as_bytes())
        }
        PkceMethod::Plain => constant_time_eq(verifier.as_bytes(), challenge.as_bytes()),
    }
}

/// Whether `value` is a well-formed verifier or challenge
///
/// 43 to 128 characters from the unreserved set `[A-Za-z0-9-._~]`.
pub fn is_well_formed(value: &str) -> bool {
    (MIN_LENGTH..=MAX_LENGTH).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
