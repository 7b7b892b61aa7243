use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::model::Identity;
use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: Identity,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Stream metadata, session and telemetry endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// The download service that pulls shared files onto the encoder host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_acquisition_url")]
    pub base_url: String,
    /// Sent verbatim in the `Authorization` header.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Directory on the encoder host where media files live.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    /// Without the dot.
    #[serde(default = "default_media_extension")]
    pub media_extension: String,
    #[serde(default = "default_share_hosts")]
    pub share_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Whether "start now" is allowed on a STOPPED stream without editing it
    /// first.
    #[serde(default)]
    pub allow_restart_stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            base_url: default_acquisition_url(),
            auth_token: None,
            storage_root: default_storage_root(),
            media_extension: default_media_extension(),
            share_hosts: default_share_hosts(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            page_size: default_page_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_acquisition_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_storage_root() -> String {
    "/srv/livecast/videos".to_string()
}

fn default_media_extension() -> String {
    "mp4".to_string()
}

fn default_share_hosts() -> Vec<String> {
    vec!["drive.google.com".to_string(), "docs.google.com".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    50
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_log_file() -> PathBuf {
    platform::data_dir().join("daemon.log")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `path`, writing a default config there first if it is missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Wrote default config to {:?}", path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_file()
    }
}
