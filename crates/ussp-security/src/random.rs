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

//! Opaque random identifiers
//!
//! Every identifier is drawn from the operating system CSPRNG and rendered as
//! lowercase hex, so it is safe in URLs, cookies and form fields.

use rand::rngs::OsRng;
use rand::RngCore;

/// Byte length of authorization codes, refresh tokens, secrets and session ids
pub const TOKEN_BYTES: usize = 32;

/// `len` random bytes rendered as lowercase hex
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Single-use authorization code
pub fn generate_authorization_code() -> String {
    random_hex(TOKEN_BYTES)
}

/// Opaque refresh token
pub fn generate_refresh_token() -> String {
    random_hex(TOKEN_BYTES)
}

/// Client secret issued when a client is provisioned
pub fn generate_client_secret() -> String {
    random_hex(TOKEN_BYTES)
}

/// Browser session identifier
pub fn generate_session_id() -> String {
    random_hex(TOKEN_BYTES)
}

/// Per-session CSRF token for consent forms
pub fn generate_csrf_token() -> String {
    random_hex(TOKEN_BYTES)
}
