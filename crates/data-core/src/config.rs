//! Data Core configuration
//!
//! Loaded from a JSON, YAML or TOML file (picked by extension), then
//! overridden by `DATA_CORE_*` environment variables. Every field has a
//! default so an empty file is a valid simulator configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::contracts::TaskType;
use crate::error::{ConfigError, Result};

/// Default session name
pub const DEFAULT_SESSION_NAME: &str = "llm-data-core";

/// Default per-request timeout for subsystem calls
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default number of post-validation tasks kept in the status table
pub const DEFAULT_MAX_TRACKED_TASKS: usize = 10_000;

/// One remote subsystem endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub timeout_ms: u64,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Endpoints of the three persistence subsystems
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsystemEndpoints {
    pub graph: EndpointConfig,
    pub store: EndpointConfig,
    pub registry: EndpointConfig,
}

/// Lineage fan-out targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    pub memory_graph_url: String,
    pub registry_url: String,
    pub data_vault_url: String,
    pub timeout_ms: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            memory_graph_url: "http://localhost:8081".to_string(),
            registry_url: "http://localhost:8082".to_string(),
            data_vault_url: "http://localhost:8083".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCoreConfig {
    /// Name given to each session span
    pub name: String,
    /// Use in-memory subsystems instead of the HTTP endpoints
    pub simulator: bool,
    pub subsystems: SubsystemEndpoints,
    pub fanout: FanoutConfig,
    /// Tasks scheduled after every accepted persistence
    pub post_validation: Vec<TaskType>,
    pub max_tracked_tasks: usize,
    pub server: ServerConfig,
}

impl Default for DataCoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SESSION_NAME.to_string(),
            simulator: true,
            subsystems: SubsystemEndpoints::default(),
            fanout: FanoutConfig::default(),
            post_validation: vec![TaskType::Index, TaskType::Audit],
            max_tracked_tasks: DEFAULT_MAX_TRACKED_TASKS,
            server: ServerConfig::default(),
        }
    }
}

impl DataCoreConfig {
    /// Load a config file, picking the format from its extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let parse_error = |message: String| ConfigError::Parse {
            path: display.clone(),
            message,
        };

        let config: Self = match extension.as_str() {
            "json" => serde_json::from_str(&content)
                .map_err(|e| parse_error(format!("Invalid JSON: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| parse_error(format!("Invalid YAML: {}", e)))?,
            "toml" => toml::from_str(&content)
                .map_err(|e| parse_error(format!("Invalid TOML: {}", e)))?,
            _ => {
                return Err(parse_error(format!(
                    "Unsupported file format: {}. Supported formats: json, yaml, yml, toml",
                    extension
                ))
                .into())
            }
        };

        Ok(config)
    }

    /// Load from an optional file, apply environment overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DATA_CORE_*` overrides from `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("DATA_CORE_NAME") {
            self.name = name;
        }
        if let Some(simulator) = lookup("DATA_CORE_SIMULATOR") {
            self.simulator = matches!(simulator.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = lookup("DATA_CORE_GRAPH_URL") {
            self.subsystems.graph.url = url;
        }
        if let Some(url) = lookup("DATA_CORE_STORE_URL") {
            self.subsystems.store.url = url;
        }
        if let Some(url) = lookup("DATA_CORE_REGISTRY_URL") {
            self.subsystems.registry.url = url;
        }
        if let Some(host) = lookup("DATA_CORE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DATA_CORE_PORT") {
            self.server.port = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("DATA_CORE_PORT is not a valid port: {}", port))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.max_tracked_tasks == 0 {
            return Err(invalid("max_tracked_tasks must be at least 1"));
        }
        if self.post_validation.is_empty() {
            return Err(invalid("post_validation must name at least one task"));
        }
        if !self.simulator {
            for (subsystem, endpoint) in [
                ("graph", &self.subsystems.graph),
                ("store", &self.subsystems.store),
                ("registry", &self.subsystems.registry),
            ] {
                if endpoint.url.is_empty() {
                    return Err(invalid(format!(
                        "subsystems.{}.url is required when simulator is off",
                        subsystem
                    )));
                }
                check_http_url(&format!("subsystems.{}.url", subsystem), &endpoint.url)?;
                if endpoint.timeout_ms == 0 {
                    return Err(invalid(format!(
                        "subsystems.{}.timeout_ms must be positive",
                        subsystem
                    )));
                }
            }
        }
        for (field, url) in [
            ("fanout.memory_graph_url", &self.fanout.memory_graph_url),
            ("fanout.registry_url", &self.fanout.registry_url),
            ("fanout.data_vault_url", &self.fanout.data_vault_url),
        ] {
            check_http_url(field, url)?;
        }
        if self.fanout.timeout_ms == 0 {
            return Err(invalid("fanout.timeout_ms must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> crate::error::DataCoreError {
    ConfigError::Invalid(message.into()).into()
}

fn check_http_url(field: &str, url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| invalid(format!("{} is not a valid URL ({}): {}", field, url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(invalid(format!(
            "{} must use http or https, got {}",
            field, scheme
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(extension: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", extension))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = DataCoreConfig::default();
        assert!(config.simulator);
        assert_eq!(config.post_validation, vec![TaskType::Index, TaskType::Audit]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let file = write_config(
            "yaml",
            r#"
name: nightly
simulator: false
subsystems:
  graph: { url: "http://graph:9000" }
  store: { url: "http://store:9000", timeout_ms: 250 }
  registry: { url: "http://registry:9000" }
post_validation: [index, notify]
"#,
        );

        let config = DataCoreConfig::from_file(file.path()).unwrap();

        assert_eq!(config.name, "nightly");
        assert!(!config.simulator);
        assert_eq!(config.subsystems.store.timeout_ms, 250);
        assert_eq!(config.subsystems.graph.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.post_validation, vec![TaskType::Index, TaskType::Notify]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml() {
        let file = write_config(
            "toml",
            r#"
max_tracked_tasks = 16

[server]
host = "127.0.0.1"
port = 9090
"#,
        );

        let config = DataCoreConfig::from_file(file.path()).unwrap();

        assert_eq!(config.max_tracked_tasks, 16);
        assert_eq!(config.server.bind_address(), "127.0.0.1:9090");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config("ini", "name = x");
        let err = DataCoreConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported file format"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_missing_endpoint_rejected_without_simulator() {
        let mut config = DataCoreConfig::default();
        config.simulator = false;
        config.subsystems.graph.url = "http://graph".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("subsystems.store.url"));
    }

    #[test]
    fn test_empty_post_validation_rejected() {
        let config = DataCoreConfig {
            post_validation: vec![],
            ..DataCoreConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("post_validation"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_zero_subsystem_timeout_rejected() {
        let mut config = DataCoreConfig::default();
        config.simulator = false;
        config.subsystems.graph = EndpointConfig::new("http://graph");
        config.subsystems.store = EndpointConfig {
            url: "http://store".to_string(),
            timeout_ms: 0,
        };
        config.subsystems.registry = EndpointConfig::new("http://registry");

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("subsystems.store.timeout_ms"));
    }

    #[test]
    fn test_zero_fanout_timeout_rejected() {
        let mut config = DataCoreConfig::default();
        config.fanout.timeout_ms = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fanout.timeout_ms"));
    }

    #[test]
    fn test_non_http_subsystem_url_rejected() {
        let mut config = DataCoreConfig::default();
        config.simulator = false;
        config.subsystems.graph = EndpointConfig::new("http://graph");
        config.subsystems.store = EndpointConfig::new("ftp://store");
        config.subsystems.registry = EndpointConfig::new("http://registry");

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("subsystems.store.url must use http or https"));

        config.subsystems.store = EndpointConfig::new("store:9000");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_fanout_url_rejected() {
        let mut config = DataCoreConfig::default();
        config.fanout.data_vault_url = "localhost:8083".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fanout.data_vault_url"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATA_CORE_SIMULATOR", "false"),
            ("DATA_CORE_PORT", "7070"),
            ("DATA_CORE_GRAPH_URL", "http://g"),
        ]
        .into_iter()
        .collect();

        let mut config = DataCoreConfig::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert!(!config.simulator);
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.subsystems.graph.url, "http://g");

        let bad: HashMap<&str, &str> = [("DATA_CORE_PORT", "not-a-port")].into_iter().collect();
        assert!(config
            .apply_env_overrides(|key| bad.get(key).map(|v| v.to_string()))
            .is_err());
    }
}
