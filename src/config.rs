use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Environment variable prefix for config overrides, e.g.
/// `SPANWATCH_CAPTURE_INTERFACE=eth1`.
const ENV_PREFIX: &str = "SPANWATCH_";

/// Config file probed when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

const KNOWN_PROTOCOLS: &[&str] = &["arp", "dhcp", "http", "https", "dns", "smb", "mdns"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub parser: ParserConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub alerting: AlertingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub interface: String,
    pub snap_len: i32,
    pub promiscuous: bool,
    #[serde(with = "duration_format")]
    pub timeout: Duration,
    pub buffer_size: i32,
    pub workers: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            interface: String::new(),
            snap_len: 65536,
            promiscuous: true,
            timeout: Duration::from_secs(30),
            buffer_size: 2 * 1024 * 1024,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub enabled_protocols: Vec<String>,
    /// Per-worker packet cap; 0 means unbounded.
    pub max_packets: u64,
    /// Minutes without sightings before an asset is marked inactive.
    pub asset_timeout: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            enabled_protocols: KNOWN_PROTOCOLS.iter().map(|s| s.to_string()).collect(),
            max_packets: 0,
            asset_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    File,
    Elasticsearch,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(StorageKind::File),
            "elasticsearch" => Ok(StorageKind::Elasticsearch),
            "memory" => Ok(StorageKind::Memory),
            other => Err(format!(
                "unknown storage type {other:?}, expected file, elasticsearch or memory"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    pub file: FileStorageConfig,
    pub elasticsearch: ElasticsearchConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            kind: StorageKind::File,
            file: FileStorageConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileStorageConfig {
    pub output_dir: PathBuf,
    pub format: String,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        FileStorageConfig {
            output_dir: PathBuf::from("./output"),
            format: "json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
}

/// Reserved for the embedded query API; parsed but not served yet.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub email_to: Vec<String>,
    pub alert_rules: Vec<String>,
}

impl Config {
    /// Load configuration: YAML file (explicit path, or `config.yaml`
    /// when present), then environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Config::default()
                }
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_var("CAPTURE_INTERFACE") {
            self.capture.interface = value;
        }
        if let Some(value) = env_var("CAPTURE_SNAP_LEN") {
            self.capture.snap_len = parse_env("capture.snap_len", &value)?;
        }
        if let Some(value) = env_var("CAPTURE_PROMISCUOUS") {
            self.capture.promiscuous = parse_env("capture.promiscuous", &value)?;
        }
        if let Some(value) = env_var("CAPTURE_TIMEOUT") {
            self.capture.timeout =
                humantime::parse_duration(&value).map_err(|e| ConfigError::InvalidValue {
                    key: "capture.timeout".to_string(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(value) = env_var("CAPTURE_BUFFER_SIZE") {
            self.capture.buffer_size = parse_env("capture.buffer_size", &value)?;
        }
        if let Some(value) = env_var("CAPTURE_WORKERS") {
            self.capture.workers = parse_env("capture.workers", &value)?;
        }

        if let Some(value) = env_var("PARSER_ENABLED_PROTOCOLS") {
            self.parser.enabled_protocols = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(value) = env_var("PARSER_MAX_PACKETS") {
            self.parser.max_packets = parse_env("parser.max_packets", &value)?;
        }
        if let Some(value) = env_var("PARSER_ASSET_TIMEOUT") {
            self.parser.asset_timeout = parse_env("parser.asset_timeout", &value)?;
        }

        if let Some(value) = env_var("STORAGE_TYPE") {
            self.storage.kind = parse_env("storage.type", &value)?;
        }
        if let Some(value) = env_var("STORAGE_FILE_OUTPUT_DIR") {
            self.storage.file.output_dir = PathBuf::from(value);
        }
        if let Some(value) = env_var("STORAGE_ELASTICSEARCH_URLS") {
            self.storage.elasticsearch.urls = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(value) = env_var("STORAGE_ELASTICSEARCH_INDEX") {
            self.storage.elasticsearch.index = value;
        }

        if let Some(value) = env_var("ALERTING_ENABLED") {
            self.alerting.enabled = parse_env("alerting.enabled", &value)?;
        }
        if let Some(value) = env_var("ALERTING_WEBHOOK_URL") {
            self.alerting.webhook_url = Some(value);
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.snap_len <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "capture.snap_len".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.parser.asset_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "parser.asset_timeout".to_string(),
                reason: "must be at least one minute".to_string(),
            });
        }

        let known: HashSet<&str> = KNOWN_PROTOCOLS.iter().copied().collect();
        for protocol in &self.parser.enabled_protocols {
            if !known.contains(protocol.as_str()) {
                warn!("unknown protocol {:?} in parser.enabled_protocols", protocol);
            }
        }

        Ok(())
    }

    /// Worker count, resolving 0 to the machine's parallelism.
    pub fn worker_count(&self) -> usize {
        if self.capture.workers > 0 {
            self.capture.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

fn env_var(suffix: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

mod duration_format {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
