//! Service catalog loading and lookup.
//!
//! The catalog is read once at startup into an immutable [`GlobalConfig`] and
//! shared by reference (`Arc`) with the provisioner, the registry and the
//! role runner. There is no mutation API after load.
//!
//! Layering (later wins):
//! 1. the config file (`json` or `yaml`)
//! 2. environment variables prefixed with `ROLEHOST__` (`__` separates nested keys)
//!
//! The environment layer is meant for scalar sections (`logging`, `tracing`,
//! `provisioning`, `nsq`); the `services` list is only read from the file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use figment::Figment;
use figment::providers::{Env, Format, Json, Yaml};
use serde::{Deserialize, Serialize};

use crate::bootstrap::logging::LoggingConfig;
use crate::provision::ProvisioningConfig;
use crate::telemetry::TracingConfig;

/// Prefix for environment overrides, e.g. `ROLEHOST__LOGGING__LEVEL=debug`.
pub const ENV_PREFIX: &str = "ROLEHOST__";

/// Configuration error. Every variant is fatal at startup.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file does not exist: {}", path.display())]
    Missing { path: PathBuf },
    #[error("failed to parse config '{origin}': {source}")]
    Parse {
        origin: String,
        #[source]
        source: Box<figment::Error>,
    },
    #[error("invalid config: {reason}")]
    Invalid { reason: String },
    #[error("unsupported config type '{0}' (expected json or yaml)")]
    UnsupportedFormat(String),
}

/// On-disk format of the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Infer the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(ConfigError::UnsupportedFormat(other.to_owned())),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        })
    }
}

/// One deployable service as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceDescriptor {
    /// Unique key of the service; also its role name.
    pub name: String,
    /// Listen address, `host:port` or the `:port` shorthand for all interfaces.
    #[serde(rename = "listen_port", alias = "listen")]
    pub listen_addr: String,
    /// Cache/store address. Parsed and handed to the service, never dialed by the core.
    #[serde(rename = "redis", default, skip_serializing_if = "String::is_empty")]
    pub cache_addr: String,
    /// Database DSN. Empty means the service gets no database handle.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database: String,
    /// Pool size; applied to both max-open and max-idle.
    #[serde(default)]
    pub pool_conns: u32,
}

impl ServiceDescriptor {
    /// Database DSN, if one is declared.
    #[must_use]
    pub fn database_dsn(&self) -> Option<&str> {
        let dsn = self.database.trim();
        (!dsn.is_empty()).then_some(dsn)
    }

    /// Cache address, if one is declared.
    #[must_use]
    pub fn cache_addr(&self) -> Option<&str> {
        let addr = self.cache_addr.trim();
        (!addr.is_empty()).then_some(addr)
    }

    /// Address suitable for `TcpListener::bind`: `:9001` becomes `0.0.0.0:9001`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        let addr = self.listen_addr.trim();
        if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_owned()
        }
    }
}

/// Messaging broker connection parameters (NSQ-style). Parsed, not dialed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "lookupaddr", default, skip_serializing_if = "Option::is_none")]
    pub lookup_addr: Option<String>,
}

/// The whole catalog plus process-wide sections.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(rename = "nsq", default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<BrokerConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
    #[serde(default)]
    pub provisioning: ProvisioningConfig,
}

impl GlobalConfig {
    /// Render the effective configuration as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashMap::with_capacity(self.services.len());
        for (idx, svc) in self.services.iter().enumerate() {
            if svc.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("services[{idx}] has an empty name"),
                });
            }
            if svc.listen_addr.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("service '{}' has an empty listen_port", svc.name),
                });
            }
            if let Some(first) = seen.insert(svc.name.as_str(), idx) {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "service '{}' is declared twice (services[{first}] and services[{idx}])",
                        svc.name
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Read-only view over a loaded [`GlobalConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    global: Arc<GlobalConfig>,
    index: HashMap<String, usize>,
    origin: String,
}

impl ConfigStore {
    /// Load the catalog from `path`.
    ///
    /// `format` overrides detection by extension; JSON is the fallback.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file is missing, cannot be parsed or fails validation.
    pub fn load(path: &Path, format: Option<ConfigFormat>) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        let format = format
            .or_else(|| ConfigFormat::from_path(path))
            .unwrap_or_default();

        let figment = match format {
            ConfigFormat::Json => Figment::from(Json::file(path)),
            ConfigFormat::Yaml => Figment::from(Yaml::file(path)),
        };
        let mut store = Self::extract(figment, &path.display().to_string())?;
        store.origin = format!("{} ({format})", path.display());
        Ok(store)
    }

    /// Parse the catalog from an in-memory document (no environment layer).
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the document cannot be parsed or fails validation.
    pub fn from_str_with(doc: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        let figment = match format {
            ConfigFormat::Json => Figment::from(Json::string(doc)),
            ConfigFormat::Yaml => Figment::from(Yaml::string(doc)),
        };
        let global = figment.extract().map_err(|e| ConfigError::Parse {
            origin: "<inline>".to_owned(),
            source: Box::new(e),
        })?;
        Self::from_config(global)
    }

    /// Wrap an already-built configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if validation fails.
    pub fn from_config(global: GlobalConfig) -> Result<Self, ConfigError> {
        global.validate()?;
        let index = global
            .services
            .iter()
            .enumerate()
            .map(|(idx, svc)| (svc.name.clone(), idx))
            .collect();
        Ok(Self {
            global: Arc::new(global),
            index,
            origin: "<inline>".to_owned(),
        })
    }

    fn extract(figment: Figment, origin: &str) -> Result<Self, ConfigError> {
        let global: GlobalConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Parse {
                origin: origin.to_owned(),
                source: Box::new(e),
            })?;
        Self::from_config(global)
    }

    /// Where the catalog came from: `path (format)` for files, `<inline>` otherwise.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Log what was loaded. Loading runs before the subscriber exists, so the
    /// host calls this once logging is up.
    pub fn log_summary(&self) {
        let names: Vec<&str> = self.names().collect();
        tracing::info!(
            origin = %self.origin,
            services = ?names,
            broker = self.global.broker.is_some(),
            "Service catalog loaded"
        );
    }

    /// Descriptor declared under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.index.get(name).map(|&idx| &self.global.services[idx])
    }

    /// Declared service names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.global.services.iter().map(|s| s.name.as_str())
    }

    /// Broker section, if declared.
    #[must_use]
    pub fn broker(&self) -> Option<&BrokerConfig> {
        self.global.broker.as_ref()
    }

    /// Shared handle to the immutable configuration.
    #[must_use]
    pub fn global(&self) -> Arc<GlobalConfig> {
        Arc::clone(&self.global)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing_test::traced_test;

    const CATALOG: &str = r#"{
        "services": [
            {"name": "chat", "listen_port": ":9001"},
            {"name": "login", "listen_port": "127.0.0.1:9002",
             "database": "mysql://app:pw@127.0.0.1/login", "pool_conns": 5,
             "redis": "127.0.0.1:6379"}
        ],
        "nsq": {"address": "127.0.0.1:4150", "lookupaddr": "127.0.0.1:4161"}
    }"#;

    #[test]
    fn lookup_returns_declared_fields() {
        let store = ConfigStore::from_str_with(CATALOG, ConfigFormat::Json).unwrap();

        let chat = store.lookup("chat").unwrap();
        assert_eq!(chat.listen_addr, ":9001");
        assert_eq!(chat.database_dsn(), None);
        assert_eq!(chat.cache_addr(), None);
        assert_eq!(chat.pool_conns, 0);

        let login = store.lookup("login").unwrap();
        assert_eq!(login.listen_addr, "127.0.0.1:9002");
        assert_eq!(login.database_dsn(), Some("mysql://app:pw@127.0.0.1/login"));
        assert_eq!(login.cache_addr(), Some("127.0.0.1:6379"));
        assert_eq!(login.pool_conns, 5);

        assert!(store.lookup("gateway").is_none());
        assert!(store.lookup("").is_none());
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["chat", "login"]);
    }

    #[test]
    fn broker_section_is_parsed() {
        let store = ConfigStore::from_str_with(CATALOG, ConfigFormat::Json).unwrap();
        let broker = store.broker().unwrap();
        assert_eq!(broker.address.as_deref(), Some("127.0.0.1:4150"));
        assert_eq!(broker.lookup_addr.as_deref(), Some("127.0.0.1:4161"));
    }

    #[test]
    fn yaml_catalog_matches_json() {
        let yaml = "services:\n  - name: chat\n    listen_port: \":9001\"\n";
        let store = ConfigStore::from_str_with(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(store.lookup("chat").unwrap().listen_addr, ":9001");
        assert!(store.broker().is_none());
    }

    #[test]
    fn bind_addr_expands_port_shorthand() {
        let store = ConfigStore::from_str_with(CATALOG, ConfigFormat::Json).unwrap();
        assert_eq!(store.lookup("chat").unwrap().bind_addr(), "0.0.0.0:9001");
        assert_eq!(store.lookup("login").unwrap().bind_addr(), "127.0.0.1:9002");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let doc = r#"{"services": [
            {"name": "chat", "listen_port": ":1"},
            {"name": "chat", "listen_port": ":2"}
        ]}"#;
        let err = ConfigStore::from_str_with(doc, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn empty_listen_address_is_rejected() {
        let doc = r#"{"services": [{"name": "chat", "listen_port": ""}]}"#;
        let err = ConfigStore::from_str_with(doc, ConfigFormat::Json).unwrap_err();
        assert!(err.to_string().contains("chat"));
    }

    #[test]
    fn negative_pool_size_fails_to_parse() {
        let doc = r#"{"services": [{"name": "a", "listen_port": ":1", "pool_conns": -1}]}"#;
        let err = ConfigStore::from_str_with(doc, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigStore::load(&dir.path().join("nope.json"), None).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
    }

    #[test]
    fn load_malformed_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(b"{\"services\": [").unwrap();
        let err = ConfigStore::load(file.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_detects_yaml_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(b"services:\n  - name: room\n    listen_port: \"127.0.0.1:0\"\n")
            .unwrap();
        let store = ConfigStore::load(file.path(), None).unwrap();
        assert!(store.lookup("room").is_some());
    }

    #[test]
    #[traced_test]
    fn summary_names_origin_and_services() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(b"services:\n  - name: room\n    listen_port: \":9100\"\n")
            .unwrap();
        let store = ConfigStore::load(file.path(), None).unwrap();
        assert_eq!(store.origin(), format!("{} (yaml)", file.path().display()));
        assert!(!logs_contain("Service catalog loaded"));

        store.log_summary();
        assert!(logs_contain("Service catalog loaded"));
        assert!(logs_contain("room"));
        assert!(logs_contain("(yaml)"));

        let inline = ConfigStore::from_str_with(CATALOG, ConfigFormat::Json).unwrap();
        assert_eq!(inline.origin(), "<inline>");
    }

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<ConfigFormat>().unwrap(), ConfigFormat::Json);
        assert_eq!("yml".parse::<ConfigFormat>().unwrap(), ConfigFormat::Yaml);
        assert!("toml".parse::<ConfigFormat>().is_err());
    }
}
