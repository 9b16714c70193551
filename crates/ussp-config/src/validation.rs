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
//! Configuration validation

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{
    AdapterSeed, AuthConfig, ClientSeed, Config, LoggingConfig, NamespaceSeed, ReplicationConfig,
    ServerConfig, UserSeed,
};
use std::collections::HashSet;
use tracing::warn;

/// Adapter kind spellings accepted by the storage registry
pub const KNOWN_ADAPTER_KINDS: &[&str] = &[
    "local",
    "filesystem",
    "s3",
    "object_store",
    "objectstore",
    "minio",
    "gdrive",
    "google_drive",
    "cloud_drive",
    "clouddrive",
];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Validate configuration
pub trait Validator {
    /// Check this value, returning the first problem found
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.auth.validate()?;
        self.replication.validate()?;
        self.logging.validate()?;

        if let Some(rate_limit) = &self.rate_limit {
            if rate_limit.requests_per_second == 0 || rate_limit.burst_size == 0 {
                return Err(ConfigError::invalid_value(
                    "rate_limit",
                    "requests_per_second and burst_size must be positive",
                ));
            }
        }

        let mut adapter_names = HashSet::new();
        for adapter in &self.adapters {
            adapter.validate()?;
            if !adapter_names.insert(adapter.name.as_str()) {
                return Err(ConfigError::ConflictingValues(format!(
                    "duplicate adapter name '{}'",
                    adapter.name
                )));
            }
        }

        let defaults = self.adapters.iter().filter(|a| a.is_default).count();
        if defaults > 1 {
            warn!(
                count = defaults,
                "More than one default adapter configured; auto-provisioning picks the first"
            );
        }

        let mut namespace_names = HashSet::new();
        for namespace in &self.namespaces {
            namespace.validate()?;
            if !namespace_names.insert(namespace.name.as_str()) {
                return Err(ConfigError::ConflictingValues(format!(
                    "duplicate namespace name '{}'",
                    namespace.name
                )));
            }
            if let Some(adapter) = &namespace.adapter {
                if !adapter_names.contains(adapter.as_str()) {
                    return Err(ConfigError::ConflictingValues(format!(
                        "namespace '{}' references unknown adapter '{}'",
                        namespace.name, adapter
                    )));
                }
            }
        }

        let mut client_ids = HashSet::new();
        for client in &self.clients {
            client.validate()?;
            if !client_ids.insert(client.client_id.as_str()) {
                return Err(ConfigError::ConflictingValues(format!(
                    "duplicate client_id '{}'",
                    client.client_id
                )));
            }
        }

        let mut usernames = HashSet::new();
        for user in &self.users {
            user.validate()?;
            if !usernames.insert(user.username.as_str()) {
                return Err(ConfigError::ConflictingValues(format!(
                    "duplicate username '{}'",
                    user.username
                )));
            }
        }

        Ok(())
    }
}

impl Validator for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingRequired("server.host".to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::invalid_value(
                "server.port",
                "port must be between 1 and 65535",
            ));
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be positive",
            ));
        }

        Ok(())
    }
}

impl Validator for AuthConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingRequired("auth.jwt_secret".to_string()));
        }

        let lifetimes = [
            ("auth.access_token_ttl_secs", self.access_token_ttl_secs),
            ("auth.authorization_code_ttl_secs", self.authorization_code_ttl_secs),
            ("auth.refresh_token_ttl_secs", self.refresh_token_ttl_secs),
            ("auth.session_ttl_secs", self.session_ttl_secs),
        ];
        for (field, value) in lifetimes {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "lifetime must be positive"));
            }
        }

        // bcrypt accepts costs 4 through 31
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::invalid_value(
                "auth.bcrypt_cost",
                format!("must be between 4 and 31, got {}", self.bcrypt_cost),
            ));
        }

        Ok(())
    }
}

impl Validator for ReplicationConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "replication.poll_interval_secs",
                "must be positive",
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value(
                "replication.batch_size",
                "must be positive",
            ));
        }
        Ok(())
    }
}

impl Validator for LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.level",
                format!("must be one of: {}", LOG_LEVELS.join(", ")),
            ));
        }
        if !LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "logging.format",
                format!("must be one of: {}", LOG_FORMATS.join(", ")),
            ));
        }
        Ok(())
    }
}

impl Validator for AdapterSeed {
    fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingRequired("adapters[].name".to_string()));
        }
        if !KNOWN_ADAPTER_KINDS.contains(&self.kind.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                format!("adapters[{}].kind", self.name),
                format!("unknown adapter kind '{}'", self.kind),
            ));
        }
        Ok(())
    }
}

impl Validator for NamespaceSeed {
    fn validate(&self) -> ConfigResult<()> {
        if self.name.is_empty() {
            return Err(ConfigError::MissingRequired("namespaces[].name".to_string()));
        }
        if self.name.starts_with('.') || self.name.contains(['/', '\\']) {
            return Err(ConfigError::invalid_value(
                format!("namespaces[{}].name", self.name),
                "must not start with '.' or contain path separators",
            ));
        }
        Ok(())
    }
}

impl Validator for ClientSeed {
    fn validate(&self) -> ConfigResult<()> {
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingRequired("clients[].client_id".to_string()));
        }
        for uri in &self.redirect_uris {
            if !(uri.starts_with("https://") || uri.starts_with("http://")) {
                return Err(ConfigError::invalid_value(
                    format!("clients[{}].redirect_uris", self.client_id),
                    format!("'{}' is not an absolute http(s) URL", uri),
                ));
            }
        }
        Ok(())
    }
}

impl Validator for UserSeed {
    fn validate(&self) -> ConfigResult<()> {
        if self.username.is_empty() {
            return Err(ConfigError::MissingRequired("users[].username".to_string()));
        }
        if self.password_hash.is_none() && self.password.is_none() {
            return Err(ConfigError::MissingRequired(format!(
                "users[{}].password_hash or password",
                self.username
            )));
        }
        Ok(())
    }
}
