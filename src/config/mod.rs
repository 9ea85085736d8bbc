//! Dev service configuration, loaded from `config/microcks.toml`.
//!
//! `DevServiceConfig` is the unit compared between invocations: any field
//! change (env, image, artifacts, ...) means the running container is stale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Image started when `image_name` is not configured.
pub const DEFAULT_IMAGE: &str = "quay.io/microcks/microcks-uber:latest";

/// Name of the dev service managed by default.
pub const DEFAULT_SERVICE_NAME: &str = "default";

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/microcks.toml";

const DEFAULT_HOST_TEST_PORT: u16 = 8081;
const DEFAULT_RELOAD_INTERVAL_SECS: u64 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unknown launch mode '{0}' (expected development, test or normal)")]
    UnknownLaunchMode(String),
}

/// How the host application was launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    #[default]
    Development,
    Test,
    Normal,
}

impl LaunchMode {
    pub fn is_test(&self) -> bool {
        matches!(self, LaunchMode::Test)
    }
}

impl std::str::FromStr for LaunchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(LaunchMode::Development),
            "test" => Ok(LaunchMode::Test),
            "normal" | "prod" => Ok(LaunchMode::Normal),
            other => Err(ConfigError::UnknownLaunchMode(other.to_string())),
        }
    }
}

/// Explicit artifact lists. When present, resource directories are not scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Imported as main artifacts, in order.
    pub primaries: Vec<PathBuf>,
    /// Imported as secondary artifacts after all primaries.
    #[serde(default)]
    pub secondaries: Option<Vec<PathBuf>>,
}

/// Configuration of one Microcks dev service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevServiceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Container image; `DEFAULT_IMAGE` when unset.
    #[serde(default)]
    pub image_name: Option<String>,
    /// Whether a running container labelled with `service_name` may be reused.
    #[serde(default = "default_shared")]
    pub shared: bool,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub container_env: BTreeMap<String, String>,
    #[serde(default)]
    pub startup_timeout_secs: Option<u64>,
    #[serde(default)]
    pub artifacts: Option<ArtifactsConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_shared() -> bool {
    true
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

impl Default for DevServiceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            image_name: None,
            shared: default_shared(),
            service_name: default_service_name(),
            container_env: BTreeMap::new(),
            startup_timeout_secs: None,
            artifacts: None,
        }
    }
}

impl DevServiceConfig {
    pub fn image(&self) -> &str {
        self.image_name.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_secs.map(Duration::from_secs)
    }
}

/// Runtime facts about the invocation that are not part of the compared config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchContext {
    pub mode: LaunchMode,
    /// Docker network shared with other dev services, if any.
    pub shared_network: Option<String>,
    /// Application port the container should be able to reach on the host.
    pub host_test_port: Option<u16>,
}

impl Default for LaunchContext {
    fn default() -> Self {
        Self {
            mode: LaunchMode::Development,
            shared_network: None,
            host_test_port: Some(DEFAULT_HOST_TEST_PORT),
        }
    }
}

/// Top-level file configuration.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    #[serde(default)]
    pub launch_mode: LaunchMode,
    #[serde(default)]
    pub shared_network: Option<String>,
    /// 0 disables host access from the container.
    #[serde(default = "default_host_test_port")]
    pub host_test_port: u16,
    #[serde(default = "default_resource_dirs")]
    pub resource_dirs: Vec<PathBuf>,
    /// Listen address of the status API; disabled when unset.
    #[serde(default)]
    pub status_addr: Option<String>,
    /// 0 disables configuration reload.
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
    #[serde(default)]
    pub devservices: DevServiceConfig,
}

fn default_host_test_port() -> u16 {
    DEFAULT_HOST_TEST_PORT
}

fn default_resource_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("src/main/resources"),
        PathBuf::from("src/test/resources"),
    ]
}

fn default_reload_interval() -> u64 {
    DEFAULT_RELOAD_INTERVAL_SECS
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            launch_mode: LaunchMode::default(),
            shared_network: None,
            host_test_port: default_host_test_port(),
            resource_dirs: default_resource_dirs(),
            status_addr: None,
            reload_interval_secs: default_reload_interval(),
            devservices: DevServiceConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load from `MICROCKS_DEVSERVICE_CONFIG` or `config/microcks.toml`.
    /// `MICROCKS_LAUNCH_MODE` overrides the file's launch mode.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os("MICROCKS_DEVSERVICE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = Self::load_from(&path)?;
        if let Ok(mode) = std::env::var("MICROCKS_LAUNCH_MODE") {
            cfg.launch_mode = mode.parse()?;
        }
        Ok(cfg)
    }

    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn launch_context(&self) -> LaunchContext {
        LaunchContext {
            mode: self.launch_mode,
            shared_network: self.shared_network.clone(),
            host_test_port: (self.host_test_port > 0).then_some(self.host_test_port),
        }
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}
