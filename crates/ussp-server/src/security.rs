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
//! HTTP security: response headers, request identifier checks, rate limiting

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use url::Url;

pub use tower_governor::{
    governor::{GovernorConfig, GovernorConfigBuilder},
    key_extractor::SmartIpKeyExtractor,
    GovernorLayer,
};

/// Longest accepted client identifier
pub const MAX_CLIENT_ID_LEN: usize = 128;

/// Rate limiting configuration for the `/oauth/*` routes
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per second per IP
    pub requests_per_second: u64,
    /// Burst capacity
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    /// Create new rate limit configuration
    pub fn new(requests_per_second: u64, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }
}

impl From<&ussp_config::RateLimitConfig> for RateLimitConfig {
    fn from(config: &ussp_config::RateLimitConfig) -> Self {
        Self::new(u64::from(config.requests_per_second), config.burst_size)
    }
}

/// Security headers middleware
///
/// Adds security-related HTTP headers to all responses.
pub async fn security_headers_middleware(
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // Login and consent pages carry their own inline styles and nothing else
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'none'; style-src 'unsafe-inline'; frame-ancestors 'none'"),
    );

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));

    Ok(response)
}

/// Validate a client identifier
///
/// 1 to 128 characters from `[A-Za-z0-9._-]`, not starting with `.`.
/// Identifiers double as namespace names, so anything that could act as a
/// path component is refused.
pub fn validate_client_id(client_id: &str) -> Result<(), &'static str> {
    if client_id.is_empty() {
        return Err("client_id is empty");
    }

    if client_id.len() > MAX_CLIENT_ID_LEN {
        return Err("client_id is longer than 128 characters");
    }

    if client_id.starts_with('.') {
        return Err("client_id must not start with '.'");
    }

    let is_safe = client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

    if !is_safe {
        return Err("client_id contains invalid characters");
    }

    Ok(())
}

/// Parse a redirect URI: absolute `http`/`https`, with a host, no fragment
pub fn validate_redirect_uri(redirect_uri: &str) -> Result<Url, &'static str> {
    let url = Url::parse(redirect_uri).map_err(|_| "redirect_uri is not an absolute URL")?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err("redirect_uri must use http or https");
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err("redirect_uri has no host");
    }

    if url.fragment().is_some() {
        return Err("redirect_uri must not contain a fragment");
    }

    Ok(url)
}
