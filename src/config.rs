//! Configuration management for scaffold-testkit
//!
//! Configuration lives in ~/.scaffold-testkit/config.toml unless a path is
//! given explicitly.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the kind cluster to load images into.
pub const KIND_CLUSTER_ENV: &str = "KIND_CLUSTER";

/// Suite configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Executable names
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Target cluster settings
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// OLM installation
    #[serde(default)]
    pub olm: OlmConfig,

    /// Prometheus operator installation
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// The scaffolding CLI under test
    #[serde(default = "default_sdk_binary")]
    pub sdk_binary: String,

    #[serde(default = "default_kubectl")]
    pub kubectl: String,

    #[serde(default = "default_kind")]
    pub kind: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            sdk_binary: default_sdk_binary(),
            kubectl: default_kubectl(),
            kind: default_kind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// kind cluster name, overridden by $KIND_CLUSTER
    #[serde(default = "default_kind_cluster")]
    pub kind_cluster: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kind_cluster: default_kind_cluster(),
        }
    }
}

impl ClusterConfig {
    /// Cluster name to use, honouring $KIND_CLUSTER.
    pub fn resolved_kind_cluster(&self) -> String {
        match std::env::var(KIND_CLUSTER_ENV) {
            Ok(name) if !name.is_empty() => name,
            _ => self.kind_cluster.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlmConfig {
    /// OLM version installed by the suite
    #[serde(default = "default_olm_version")]
    pub version: String,

    /// Passed through as `--timeout` to `olm install`
    #[serde(default = "default_olm_install_timeout")]
    pub install_timeout: String,
}

impl Default for OlmConfig {
    fn default() -> Self {
        Self {
            version: default_olm_version(),
            install_timeout: default_olm_install_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_prometheus_version")]
    pub version: String,

    /// Bundle manifest URL; `{version}` is substituted
    #[serde(default = "default_prometheus_bundle_url")]
    pub bundle_url: String,

    /// How long to wait for the operator service to appear
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            version: default_prometheus_version(),
            bundle_url: default_prometheus_bundle_url(),
            ready_timeout_secs: default_ready_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl PrometheusConfig {
    /// Bundle URL with the configured version filled in.
    pub fn resolved_bundle_url(&self) -> String {
        self.bundle_url.replace("{version}", &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file, written without ANSI colours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

// Default functions for serde
fn default_sdk_binary() -> String { "operator-sdk".to_string() }
fn default_kubectl() -> String { "kubectl".to_string() }
fn default_kind() -> String { "kind".to_string() }
fn default_kind_cluster() -> String { "kind".to_string() }
fn default_olm_version() -> String { "0.28.0".to_string() }
fn default_olm_install_timeout() -> String { "4m".to_string() }
fn default_prometheus_version() -> String { "v0.51.2".to_string() }
fn default_prometheus_bundle_url() -> String {
    "https://github.com/prometheus-operator/prometheus-operator/releases/download/{version}/bundle.yaml"
        .to_string()
}
fn default_ready_timeout_secs() -> u64 { 180 }
fn default_poll_interval_secs() -> u64 { 1 }
fn default_log_level() -> String { "info".to_string() }

/// Get the default configuration file path
pub fn config_file_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;

    let config_dir = home_dir.join(".scaffold-testkit");
    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    Ok(config_dir.join("config.toml"))
}

/// Get the default configuration file content with comments
fn get_default_config_content() -> &'static str {
    r#"# scaffold-testkit configuration
#
# Values here are used by the e2e helpers and the scaffold-testkit CLI.

[tools]
# The scaffolding CLI under test
sdk_binary = "operator-sdk"
kubectl = "kubectl"
kind = "kind"

[cluster]
# kind cluster images are loaded into; $KIND_CLUSTER takes precedence
kind_cluster = "kind"

[olm]
# OLM version installed when the cluster does not already provide it
version = "0.28.0"
install_timeout = "4m"

[prometheus]
# Prometheus operator installed when ServiceMonitor is not already served
version = "v0.51.2"
bundle_url = "https://github.com/prometheus-operator/prometheus-operator/releases/download/{version}/bundle.yaml"
ready_timeout_secs = 180
poll_interval_secs = 1

[logging]
# Default level when RUST_LOG is unset: error, warn, info, debug, trace
level = "info"
# Mirror logs into a file (optional)
#file = "/tmp/scaffold-testkit.log"
"#
}

/// Save the default commented configuration file
pub fn save_default_config() -> Result<()> {
    write_default_config(&config_file_path()?)
}

fn write_default_config(config_path: &Path) -> Result<()> {
    fs::write(config_path, get_default_config_content())
        .with_context(|| format!("Failed to write default config file: {}", config_path.display()))?;

    Ok(())
}

/// Load configuration from the default location, creating it if needed
///
/// A malformed file is moved aside to `config.toml.bak` and replaced by the
/// default template; a warning is printed to stderr since logging is not set
/// up until the configuration is known.
pub fn load_config() -> Result<SuiteConfig> {
    let (config, notice) = load_or_restore(&config_file_path()?)?;
    if let Some(notice) = notice {
        eprintln!("warning: {}", notice);
    }
    Ok(config)
}

/// Read `config_path`, restoring defaults if it is missing or malformed.
///
/// Returns the configuration and, when a malformed file was replaced, a
/// message saying so.
fn load_or_restore(config_path: &Path) -> Result<(SuiteConfig, Option<String>)> {
    if !config_path.exists() {
        write_default_config(config_path)?;
    }

    let config_str = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    match toml::from_str(&config_str) {
        Ok(config) => Ok((config, None)),
        Err(e) => {
            let backup = config_path.with_extension("toml.bak");
            fs::rename(config_path, &backup)
                .with_context(|| format!("Failed to back up config file: {}", config_path.display()))?;
            write_default_config(config_path)?;
            let notice = format!(
                "config {} is malformed ({}); moved it to {} and restored defaults",
                config_path.display(),
                e.message(),
                backup.display()
            );
            Ok((SuiteConfig::default(), Some(notice)))
        }
    }
}

/// Load configuration from an explicit path
///
/// Unlike [`load_config`], a missing or malformed file is an error.
pub fn load_config_from(path: &Path) -> Result<SuiteConfig> {
    let config_str = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Serialize configuration to TOML
pub fn to_toml(config: &SuiteConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize config")
}

/// Validate configuration values
pub fn validate_config(config: &SuiteConfig) -> Result<()> {
    for (name, value) in [
        ("tools.sdk_binary", &config.tools.sdk_binary),
        ("tools.kubectl", &config.tools.kubectl),
        ("tools.kind", &config.tools.kind),
        ("cluster.kind_cluster", &config.cluster.kind_cluster),
        ("olm.version", &config.olm.version),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("Invalid {}: must not be empty", name);
        }
    }

    let prometheus = &config.prometheus;
    if prometheus.poll_interval_secs == 0 {
        anyhow::bail!("Invalid prometheus.poll_interval_secs: must be at least 1");
    }
    if prometheus.poll_interval_secs > prometheus.ready_timeout_secs {
        anyhow::bail!(
            "Invalid prometheus.poll_interval_secs: {} exceeds ready_timeout_secs {}",
            prometheus.poll_interval_secs,
            prometheus.ready_timeout_secs
        );
    }
    if !prometheus.bundle_url.contains("://") {
        anyhow::bail!("Invalid prometheus.bundle_url: {} (expected a URL)", prometheus.bundle_url);
    }

    if !["error", "warn", "info", "debug", "trace"].contains(&config.logging.level.as_str()) {
        anyhow::bail!(
            "Invalid logging.level: {} (must be error, warn, info, debug or trace)",
            config.logging.level
        );
    }

    Ok(())
}
