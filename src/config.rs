use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StrataConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    /// Local schema state. Absent means the node has no schema manager, which
    /// is fatal at startup.
    pub schema: Option<SchemaConfig>,
    pub contextionary: ContextionaryConfig,
    /// Absent means the node runs solo.
    pub network: Option<NetworkConfig>,
    pub batch: BatchConfig,
    pub auth: AuthConfig,
    pub lock: LockConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Public hostname of this node, written into key references.
    pub hostname: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchemaConfig {
    pub state_dir: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ContextionaryConfig {
    pub knn_file: Option<String>,
    pub idx_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub genesis_url: String,
    pub public_url: String,
    pub peer_name: String,
    pub ping_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub keys: Vec<ApiKey>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiKey {
    pub key: Uuid,
    pub token: String,
    #[serde(default = "default_true")]
    pub write: bool,
    /// Milliseconds since the epoch; -1 never expires.
    #[serde(default = "never_expires")]
    pub expires_unix: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LockConfig {
    pub schema_getter_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn never_expires() -> i64 {
    -1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            log_level: "info".into(),
            hostname: "localhost".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_strata_dir()
            .join("objects.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        let state_dir = default_strata_dir()
            .join("schema")
            .to_string_lossy()
            .into_owned();
        Self { state_dir }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            genesis_url: String::new(),
            public_url: String::new(),
            peer_name: String::new(),
            ping_interval_secs: 30,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 64,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            schema_getter_timeout_ms: 2000,
        }
    }
}

/// Returns `~/.strata/`
pub fn default_strata_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".strata")
}

/// Returns the default config file path: `~/.strata/config.toml`
pub fn default_config_path() -> PathBuf {
    default_strata_dir().join("config.toml")
}

impl StrataConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StrataConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (STRATA_DB, STRATA_LOG_LEVEL,
    /// STRATA_PORT, STRATA_SCHEMA_DIR).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("STRATA_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("STRATA_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("STRATA_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid STRATA_PORT"),
            }
        }
        if let Ok(val) = std::env::var("STRATA_SCHEMA_DIR") {
            self.schema = Some(SchemaConfig { state_dir: val });
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the schema state directory, if one is configured.
    pub fn resolved_schema_dir(&self) -> Option<PathBuf> {
        self.schema.as_ref().map(|s| expand_tilde(&s.state_dir))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StrataConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.hostname, "localhost");
        assert_eq!(config.batch.max_concurrency, 64);
        assert!(config.storage.db_path.ends_with("objects.db"));
        assert!(config.schema.is_none());
        assert!(config.network.is_none());
        assert!(config.auth.keys.is_empty());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
port = 9090

[storage]
db_path = "/tmp/test.db"

[schema]
state_dir = "/tmp/schema"

[contextionary]
knn_file = "/tmp/c.knn"
idx_file = "/tmp/c.idx"

[network]
genesis_url = "http://genesis:8111"
public_url = "http://node:8080"
peer_name = "node-a"

[[auth.keys]]
key = "0191a6c2-7d3e-7b1a-9c40-6f1e2d3c4b5a"
token = "secret"
"#;
        let config: StrataConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.schema.unwrap().state_dir, "/tmp/schema");
        assert_eq!(config.contextionary.knn_file.as_deref(), Some("/tmp/c.knn"));
        let network = config.network.unwrap();
        assert_eq!(network.peer_name, "node-a");
        // defaults still apply for unset fields
        assert_eq!(network.ping_interval_secs, 30);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.auth.keys.len(), 1);
        assert!(config.auth.keys[0].write);
        assert_eq!(config.auth.keys[0].expires_unix, -1);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = StrataConfig::default();
        std::env::set_var("STRATA_DB", "/tmp/override.db");
        std::env::set_var("STRATA_LOG_LEVEL", "trace");
        std::env::set_var("STRATA_PORT", "7000");
        std::env::set_var("STRATA_SCHEMA_DIR", "/tmp/env-schema");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.server.port, 7000);
        assert_eq!(
            config.resolved_schema_dir(),
            Some(PathBuf::from("/tmp/env-schema"))
        );

        // Clean up
        std::env::remove_var("STRATA_DB");
        std::env::remove_var("STRATA_LOG_LEVEL");
        std::env::remove_var("STRATA_PORT");
        std::env::remove_var("STRATA_SCHEMA_DIR");
    }
}
