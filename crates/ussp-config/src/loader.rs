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
//! Configuration file loading and environment overrides

use crate::error::{ConfigError, ConfigResult};
use crate::schema::Config;
use crate::validation::Validator;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Loads, overrides and validates [`Config`]
#[derive(Debug)]
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config = Self::parse(content, format)?;
        debug!("Configuration loaded from {}", format.name());

        if self.validate {
            config.validate()?;
        }

        Ok(config)
    }

    /// Load the server configuration
    ///
    /// A missing file (or no path at all) yields defaults. Environment
    /// overrides are applied before validation.
    pub async fn load_server_config(&self, path: Option<&Path>) -> ConfigResult<Config> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let format = ConfigFormat::from_path(path)?;
                let content = fs::read_to_string(path).await?;
                info!("Loaded {} configuration file: {}", format.name(), path.display());
                Self::parse(&content, format)?
            }
            Some(path) => {
                info!(
                    "Configuration file {} not found, using defaults",
                    path.display()
                );
                Config::default()
            }
            None => Config::default(),
        };

        self.apply_env_overrides(&mut config)?;

        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }

        Ok(config)
    }

    fn parse(content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Apply `USSP_*` environment variable overrides
    pub fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        apply_overrides(config, |name| std::env::var(name).ok())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply overrides from an arbitrary variable source
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("USSP_HOST") {
        config.server.host = value;
    }
    if let Some(value) = lookup("USSP_PORT") {
        config.server.port = value.parse().map_err(|_| {
            ConfigError::env_var_parsing_error(
                "USSP_PORT",
                &value,
                "expected valid port number (1-65535)",
            )
        })?;
    }

    // Never echo the secret back in an error
    if let Some(value) = lookup("USSP_JWT_SECRET") {
        config.auth.jwt_secret = value;
    }
    if let Some(value) = lookup("USSP_COOKIE_SECURE") {
        config.auth.cookie_secure = parse_bool("USSP_COOKIE_SECURE", &value)?;
    }

    if let Some(value) = lookup("USSP_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Some(value) = lookup("USSP_LOG_FORMAT") {
        config.logging.format = value;
    }

    if let Some(value) = lookup("USSP_REPLICATION_ENABLED") {
        config.replication.enabled = parse_bool("USSP_REPLICATION_ENABLED", &value)?;
    }
    if let Some(value) = lookup("USSP_REPLICATION_POLL_INTERVAL_SECS") {
        config.replication.poll_interval_secs = value.parse().map_err(|_| {
            ConfigError::env_var_parsing_error(
                "USSP_REPLICATION_POLL_INTERVAL_SECS",
                &value,
                "expected a whole number of seconds",
            )
        })?;
    }

    Ok(())
}

fn parse_bool(variable: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(ConfigError::env_var_parsing_error(
            variable,
            value,
            "expected 'true', 'false', 'yes', 'no', '1', '0', 'on', or 'off'",
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.yaml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
    }

    #[test]
    fn test_format_detection_error() {
        assert!(ConfigFormat::from_path("config.xml").is_err());
        assert!(ConfigFormat::from_path("config").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "YES").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(parse_bool("X", "on").unwrap());
        assert!(!parse_bool("X", "false").unwrap());
        assert!(!parse_bool("X", "no").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("USSP_HOST", "0.0.0.0"),
                ("USSP_PORT", "9090"),
                ("USSP_JWT_SECRET", "from-env"),
                ("USSP_LOG_FORMAT", "json"),
                ("USSP_COOKIE_SECURE", "yes"),
                ("USSP_REPLICATION_ENABLED", "off"),
                ("USSP_REPLICATION_POLL_INTERVAL_SECS", "30"),
            ]),
        )
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:9090");
        assert_eq!(config.auth.jwt_secret, "from-env");
        assert_eq!(config.logging.format, "json");
        assert!(config.auth.cookie_secure);
        assert!(!config.replication.enabled);
        assert_eq!(config.replication.poll_interval_secs, 30);
    }

    #[test]
    fn test_bad_port_override() {
        let mut config = Config::default();
        let err = apply_overrides(&mut config, lookup_from(&[("USSP_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarParsingError { .. }));
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new();
        let toml = r#"
        [server]
        port = 9000

        [[adapters]]
        name = "primary"
        kind = "local"
        is_default = true
        config = { base_path = "/srv/ussp" }
        "#;
        let config = loader.load_from_string(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.adapters[0].config["base_path"], "/srv/ussp");
    }

    #[test]
    fn test_parse_yaml() {
        let loader = ConfigLoader::new();
        let yaml = r#"
logging:
  level: debug
  format: compact
users:
  - username: alice
    password: wonderland
"#;
        let config = loader.load_from_string(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.users[0].username, "alice");
    }

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new();
        let json = r#"{"replication": {"batch_size": 10}}"#;
        let config = loader.load_from_string(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.replication.batch_size, 10);
        assert_eq!(config.replication.poll_interval_secs, 5);
    }

    #[test]
    fn test_loader_without_validation() {
        let loader = ConfigLoader::without_validation();
        let json = r#"{"server": {"port": 0}}"#;
        assert!(loader.load_from_string(json, ConfigFormat::Json).is_ok());
        assert!(ConfigLoader::new()
            .load_from_string(json, ConfigFormat::Json)
            .is_err());
    }
}
