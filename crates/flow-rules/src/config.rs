//! Controller configuration
//!
//! Settings come from three places, later ones winning:
//!
//! 1. Built-in defaults (local controller, `onos`/`rocks`, `device:s1`)
//! 2. A JSON or YAML file (`ControllerConfig::load`)
//! 3. `FLOWCTL_*` environment variables (`ControllerConfig::apply_env`)
//!
//! An environment file can seed the process environment first:
//!
//! ```no_run
//! use flow_rules::config::{load_environment, ControllerConfig};
//!
//! load_environment();
//! let config = ControllerConfig::load_default().unwrap().apply_env();
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::device::DeviceId;
use crate::options::{DEFAULT_PRIORITY, DEFAULT_TIMEOUT};
use crate::resolver::AmbiguityPolicy;

/// Environment file search order
pub const ENV_FILE_PATHS: &[&str] = &["/etc/flowctl/environment", ".env"];

/// Config file search order for `load_default`
pub const CONFIG_FILE_PATHS: &[&str] = &[
    "/etc/flowctl/config.yaml",
    "/etc/flowctl/config.json",
    "flowctl.yaml",
    "flowctl.json",
];

pub const ENV_URL: &str = "FLOWCTL_URL";
pub const ENV_USERNAME: &str = "FLOWCTL_USERNAME";
pub const ENV_PASSWORD: &str = "FLOWCTL_PASSWORD";
pub const ENV_DEVICE_ID: &str = "FLOWCTL_DEVICE_ID";
pub const ENV_SWITCH_TYPE: &str = "FLOWCTL_SWITCH_TYPE";
pub const ENV_REQUEST_TIMEOUT: &str = "FLOWCTL_REQUEST_TIMEOUT";
pub const ENV_CONNECT_TIMEOUT: &str = "FLOWCTL_CONNECT_TIMEOUT";
pub const ENV_AMBIGUITY: &str = "FLOWCTL_AMBIGUITY";

/// Connection and session settings for one controller/device pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// REST base URL, up to and including the API version
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Appended to `device_id` (e.g. `bmv2`)
    #[serde(default)]
    pub switch_type: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// What to do when several installed flows match one delete request
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,

    #[serde(default = "default_priority")]
    pub default_priority: u32,

    #[serde(default = "default_timeout")]
    pub default_timeout: u32,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8181/onos/v1".to_string()
}

fn default_username() -> String {
    "onos".to_string()
}

fn default_password() -> String {
    "rocks".to_string()
}

fn default_device_id() -> String {
    "device:s1".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: default_username(),
            password: default_password(),
            device_id: default_device_id(),
            switch_type: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            ambiguity: AmbiguityPolicy::default(),
            default_priority: default_priority(),
            default_timeout: default_timeout(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a JSON or YAML file (by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).with_context(|| "Failed to parse JSON config")?
        };

        info!("Loaded controller config from {}", path.display());
        Ok(config)
    }

    /// Load from the first config file that exists, or fall back to defaults
    pub fn load_default() -> Result<Self> {
        for path in CONFIG_FILE_PATHS {
            if Path::new(path).exists() {
                return Self::load(path);
            }
        }

        debug!("No controller config found, using defaults");
        Ok(Self::default())
    }

    /// Override settings from `FLOWCTL_*` environment variables
    pub fn apply_env(self) -> Self {
        self.apply_overrides(get_config_opt)
    }

    /// Override settings from any key lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL) {
            self.base_url = url;
        }
        if let Some(user) = lookup(ENV_USERNAME) {
            self.username = user;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.password = password;
        }
        if let Some(device) = lookup(ENV_DEVICE_ID) {
            self.device_id = device;
        }
        if let Some(switch_type) = lookup(ENV_SWITCH_TYPE) {
            self.switch_type = Some(switch_type);
        }
        if let Some(secs) = parse_override(&lookup, ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = secs;
        }
        if let Some(secs) = parse_override(&lookup, ENV_CONNECT_TIMEOUT) {
            self.connect_timeout_secs = secs;
        }
        if let Some(policy) = lookup(ENV_AMBIGUITY) {
            match policy.parse() {
                Ok(p) => self.ambiguity = p,
                Err(e) => warn!("Ignoring {}: {}", ENV_AMBIGUITY, e),
            }
        }
        self
    }

    /// The device this configuration targets, switch-type suffix included
    pub fn device(&self) -> DeviceId {
        let device = DeviceId::new(self.device_id.clone());
        match &self.switch_type {
            Some(suffix) => device.with_switch_type(suffix),
            None => device,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Create a builder for programmatic configuration
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }
}

fn parse_override<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}: not a number of seconds: {}", key, raw);
            None
        }
    }
}

/// Builder for ControllerConfig
#[derive(Default)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    pub fn base_url(mut self, url: &str) -> Self {
        self.config.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.config.username = username.to_string();
        self.config.password = password.to_string();
        self
    }

    pub fn device_id(mut self, device: &str) -> Self {
        self.config.device_id = device.to_string();
        self
    }

    pub fn switch_type(mut self, switch_type: &str) -> Self {
        self.config.switch_type = Some(switch_type.to_string());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn ambiguity(mut self, policy: AmbiguityPolicy) -> Self {
        self.config.ambiguity = policy;
        self
    }

    pub fn build(self) -> ControllerConfig {
        self.config
    }
}

/// Seed the process environment from the first environment file found.
///
/// `$FLOWCTL_ENV_FILE` is tried before `ENV_FILE_PATHS`. Variables already
/// set in the environment win over the file.
pub fn load_environment() -> Option<PathBuf> {
    let custom = std::env::var_os("FLOWCTL_ENV_FILE").map(PathBuf::from);
    let path = custom
        .into_iter()
        .chain(ENV_FILE_PATHS.iter().map(PathBuf::from))
        .find(|p| p.is_file())?;

    match apply_env_file(&path) {
        Ok(count) => {
            info!("Applied {} variables from {}", count, path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Skipping environment file {}: {}", path.display(), e);
            None
        }
    }
}

/// Set every unset variable named in `path`. Returns how many were set.
fn apply_env_file(path: &Path) -> std::io::Result<usize> {
    let content = fs::read_to_string(path)?;
    let fresh: Vec<(String, String)> = content
        .lines()
        .filter_map(parse_env_line)
        .filter(|(key, _)| std::env::var_os(key).is_none())
        .collect();
    for (key, value) in &fresh {
        std::env::set_var(key, value);
    }
    Ok(fresh.len())
}

/// `KEY=VALUE` with optional `export` and matching quotes; blanks and `#` lines yield `None`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim().trim_start_matches("export ").trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
        .unwrap_or(value);
    Some((key.to_string(), unquoted.to_string()))
}

/// Get an optional configuration value; empty counts as unset.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8181/onos/v1");
        assert_eq!(config.username, "onos");
        assert_eq!(config.password, "rocks");
        assert_eq!(config.device().as_str(), "device:s1");
        assert_eq!(config.ambiguity, AmbiguityPolicy::FirstMatch);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_load_yaml_with_partial_fields() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "base_url: http://onos:8181/onos/v1").unwrap();
        writeln!(file, "switch_type: bmv2").unwrap();
        writeln!(file, "ambiguity: reject_ambiguous").unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.base_url, "http://onos:8181/onos/v1");
        assert_eq!(config.device().as_str(), "device:s1bmv2");
        assert_eq!(config.ambiguity, AmbiguityPolicy::RejectAmbiguous);
        assert_eq!(config.username, "onos");
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"device_id": "device:s2", "request_timeout_secs": 3}}"#).unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.device_id, "device:s2");
        assert_eq!(config.request_timeout_secs, 3);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "not json").unwrap();
        assert!(ControllerConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_URL, "http://10.0.0.9:8181/onos/v1"),
            (ENV_SWITCH_TYPE, "bmv2"),
            (ENV_REQUEST_TIMEOUT, "not-a-number"),
            (ENV_AMBIGUITY, "reject_ambiguous"),
        ]
        .into_iter()
        .collect();

        let config = ControllerConfig::default()
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.base_url, "http://10.0.0.9:8181/onos/v1");
        assert_eq!(config.device().as_str(), "device:s1bmv2");
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.ambiguity, AmbiguityPolicy::RejectAmbiguous);
    }

    #[test]
    fn test_builder() {
        let config = ControllerConfig::builder()
            .base_url("http://localhost:9000/onos/v1/")
            .credentials("admin", "secret")
            .device_id("device:s3")
            .build();
        assert_eq!(config.base_url, "http://localhost:9000/onos/v1");
        assert_eq!(config.username, "admin");
        assert_eq!(config.device().as_str(), "device:s3");
    }

    #[test]
    fn test_builder_sets_both_timeouts() {
        let config = ControllerConfig::builder()
            .request_timeout_secs(30)
            .connect_timeout_secs(2)
            .build();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_env_line() {
        assert_eq!(
            parse_env_line("FOO=bar"),
            Some(("FOO".to_string(), "bar".to_string()))
        );
        assert_eq!(
            parse_env_line("export FOO=\"bar baz\""),
            Some(("FOO".to_string(), "bar baz".to_string()))
        );
        assert_eq!(
            parse_env_line("FOO='bar'"),
            Some(("FOO".to_string(), "bar".to_string()))
        );
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
        assert!(parse_env_line("# FOO=bar").is_none());
    }

    #[test]
    fn test_env_file_keeps_existing_variables() {
        std::env::set_var("FLOWCTL_TEST_PRESET", "kept");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# controller").unwrap();
        writeln!(file, "FLOWCTL_TEST_PRESET=replaced").unwrap();
        writeln!(file, "export FLOWCTL_TEST_FRESH='fresh value'").unwrap();

        assert_eq!(apply_env_file(file.path()).unwrap(), 1);
        assert_eq!(std::env::var("FLOWCTL_TEST_PRESET").unwrap(), "kept");
        assert_eq!(std::env::var("FLOWCTL_TEST_FRESH").unwrap(), "fresh value");
    }
}
