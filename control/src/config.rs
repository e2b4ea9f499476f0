//! Configuration for the route exporter
//!
//! Loaded from a YAML file, then overridden by environment variables.

use crate::error::ExporterError;
use common::Labels;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default location of the config file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/openshift-route-exporter/config.yml";

/// Exporter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Exporter implementation (only "prometheus" exists)
    #[serde(default = "default_exporter")]
    pub exporter: String,

    /// Directory the scraper reads file_sd targets from
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Substring of the executable path of the process to reload
    #[serde(default = "default_reload_process")]
    pub reload_process: String,

    /// Quiet period before a reload is sent (default: 50ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Wait between failed connection attempts (default: 1s)
    #[serde(default = "default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,

    /// Bind address for the /metrics endpoint, disabled when unset
    #[serde(default)]
    pub metrics_addr: Option<String>,

    /// One entry per cluster connection
    #[serde(default)]
    pub targets: Vec<SourceConfig>,
}

/// One watched cluster
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Path to a kubeconfig file; empty means infer (KUBECONFIG, ~/.kube/config, in-cluster)
    #[serde(default)]
    pub kubeconfig: String,

    /// Kubeconfig context, current context when unset
    #[serde(default)]
    pub context: Option<String>,

    /// Routes in namespaces matching this regex are ignored
    #[serde(default, rename = "namespace_blacklist_regex")]
    pub namespace_exclude: Option<String>,

    /// Static labels added to every target of this cluster
    #[serde(default)]
    pub labels: Labels,
}

fn default_exporter() -> String {
    "prometheus".to_string()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("/etc/prometheus/kube.d/")
}

fn default_reload_process() -> String {
    "prometheus".to_string()
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_reconnect_backoff_secs() -> u64 {
    1
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            exporter: default_exporter(),
            export_dir: default_export_dir(),
            reload_process: default_reload_process(),
            debounce_ms: default_debounce_ms(),
            reconnect_backoff_secs: default_reconnect_backoff_secs(),
            metrics_addr: None,
            targets: Vec::new(),
        }
    }
}

impl SourceConfig {
    pub fn new(kubeconfig: impl Into<String>) -> Self {
        Self {
            kubeconfig: kubeconfig.into(),
            ..Default::default()
        }
    }

    /// Compile the namespace exclusion pattern; `None` excludes nothing
    pub fn exclusion_pattern(&self) -> Result<Option<Regex>, ExporterError> {
        match self.namespace_exclude.as_deref() {
            None | Some("") => Ok(None),
            Some(pattern) => Ok(Some(Regex::new(pattern)?)),
        }
    }

    /// Human readable name for logs and metric labels
    pub fn name(&self) -> String {
        let path = if self.kubeconfig.is_empty() {
            "default"
        } else {
            self.kubeconfig.as_str()
        };
        match &self.context {
            Some(context) => format!("{}@{}", context, path),
            None => path.to_string(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ExporterError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ExporterError::io(path, e))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ExporterError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Resolve the config file, load it if present and apply environment overrides
    pub fn from_env() -> Result<Self, ExporterError> {
        let path = env::var("ROUTE_EXPORTER_CONFIG")
            .or_else(|_| env::var("CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = PathBuf::from(path);

        let mut config = if path.exists() {
            info!(path = %path.display(), "Loading config file");
            Self::load(&path)?
        } else {
            info!(path = %path.display(), "No config file, using environment only");
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("EXPORT_DIR") {
            self.export_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("EXPORTER") {
            self.exporter = val;
        }

        if let Some(val) = lookup("RELOAD_PROCESS") {
            self.reload_process = val;
        }

        // Semicolon separated kubeconfig list replaces configured targets
        if let Some(val) = lookup("KUBE_CONFIG") {
            let targets: Vec<SourceConfig> = val
                .split(';')
                .map(str::trim)
                .filter(|kc| !kc.is_empty())
                .map(SourceConfig::new)
                .collect();
            if !targets.is_empty() {
                debug!(count = targets.len(), "Targets taken from KUBE_CONFIG");
                self.targets = targets;
            }
        }

        if self.targets.is_empty() {
            self.targets.push(SourceConfig::default());
        }
    }

    /// Startup checks; any failure here is fatal
    pub fn validate(&self) -> Result<(), ExporterError> {
        let unwritable = |reason: &dyn std::fmt::Display| {
            ExporterError::config(format!(
                "unable to open {} for writing: {}",
                self.export_dir.display(),
                reason
            ))
        };

        if !self.export_dir.is_dir() {
            return Err(unwritable(&"not a directory"));
        }

        // Removed again when the handle drops
        tempfile::Builder::new()
            .prefix(".route-exporter-check")
            .tempfile_in(&self.export_dir)
            .map_err(|e| unwritable(&e))?;

        if self.targets.is_empty() {
            return Err(ExporterError::config("no targets configured"));
        }

        for target in &self.targets {
            target.exclusion_pattern()?;
        }

        if self.debounce_ms == 0 {
            return Err(ExporterError::config("debounce_ms must be greater than 0"));
        }

        Ok(())
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}
