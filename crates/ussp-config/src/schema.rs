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
//! Configuration schema
//!
//! Every section has serde defaults so an empty file (or no file at all)
//! yields a runnable development configuration.

use serde::{Deserialize, Serialize};

/// Default signing secret; startup warns when it is still in use
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-key-change-in-production";

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,

    /// Token, code and session lifetimes
    pub auth: AuthConfig,

    /// Optional rate limit for the `/oauth/*` routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    /// Background replication worker
    pub replication: ReplicationConfig,

    /// Log output
    pub logging: LoggingConfig,

    /// Storage adapters to register at startup
    pub adapters: Vec<AdapterSeed>,

    /// Namespaces to create at startup
    pub namespaces: Vec<NamespaceSeed>,

    /// Pre-registered OAuth clients
    pub clients: Vec<ClientSeed>,

    /// Users allowed to log in and approve consent
    pub users: Vec<UserSeed>,
}

impl Config {
    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Whether the signing secret was left at its development default
    pub fn uses_default_secret(&self) -> bool {
        self.auth.jwt_secret == DEFAULT_JWT_SECRET
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Authorization server settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub jwt_secret: String,

    /// Access token lifetime
    pub access_token_ttl_secs: u64,

    /// Authorization code lifetime
    pub authorization_code_ttl_secs: u64,

    /// Refresh token lifetime
    pub refresh_token_ttl_secs: u64,

    /// Login session lifetime
    pub session_ttl_secs: u64,

    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,

    /// bcrypt cost for passwords hashed at startup
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_token_ttl_secs: 3600,
            authorization_code_ttl_secs: 600,
            refresh_token_ttl_secs: 30 * 24 * 3600,
            session_ttl_secs: 24 * 3600,
            cookie_secure: false,
            bcrypt_cost: 12,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("authorization_code_ttl_secs", &self.authorization_code_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("cookie_secure", &self.cookie_secure)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    /// Burst size
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            requests_per_second: default_rps(),
            burst_size: default_burst(),
        }
    }
}

/// Replication worker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Run the worker at all
    pub enabled: bool,

    /// Sleep between empty polls
    pub poll_interval_secs: u64,

    /// Jobs claimed per poll
    pub batch_size: usize,

    /// Reset `InProgress` jobs to `Pending` on startup
    pub recover_on_startup: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        ReplicationConfig {
            enabled: true,
            poll_interval_secs: 5,
            batch_size: 5,
            recover_on_startup: true,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (pretty, compact, json)
    pub format: String,

    /// Print the event target (module path) on each line
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
            include_targets: true,
        }
    }
}

/// A storage adapter registered at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterSeed {
    /// Unique adapter name, also used as its id
    pub name: String,

    /// Backend kind (`local`, `s3`, `gdrive`, ...)
    pub kind: String,

    /// Default adapter for auto-provisioned namespaces
    #[serde(default)]
    pub is_default: bool,

    /// Backend-specific settings, passed through untouched
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

/// A namespace created at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceSeed {
    /// Unique namespace name
    pub name: String,

    /// Name of the adapter holding its files
    #[serde(default)]
    pub adapter: Option<String>,

    /// Upper bound on stored bytes
    #[serde(default)]
    pub quota_bytes: Option<u64>,

    /// Client allowed to use it; unowned namespaces are shared
    #[serde(default)]
    pub owner_client: Option<String>,
}

/// An OAuth client registered at startup
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSeed {
    /// Client identifier
    pub client_id: String,

    /// Display name; defaults to the identifier
    #[serde(default)]
    pub name: Option<String>,

    /// Allowed redirect URIs
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Client secret; generated when absent
    #[serde(default)]
    pub secret: Option<String>,
}

impl std::fmt::Debug for ClientSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSeed")
            .field("client_id", &self.client_id)
            .field("name", &self.name)
            .field("redirect_uris", &self.redirect_uris)
            .finish_non_exhaustive()
    }
}

/// A user who can log in
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSeed {
    /// Login name
    pub username: String,

    /// Pre-computed bcrypt hash
    #[serde(default)]
    pub password_hash: Option<String>,

    /// Plain password, hashed at startup
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for UserSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSeed")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn default_rps() -> u32 {
    10
}

fn default_burst() -> u32 {
    20
}
