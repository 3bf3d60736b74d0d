//! Configuration types for dynfw
//!
//! This module defines all configuration structures used throughout the workspace.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default IP-echo endpoint (returns `{"ip": "..."}`)
pub const DEFAULT_IP_SOURCE_URL: &str = "https://api.ipify.org?format=json";

/// Default location of the persisted IP history
pub const DEFAULT_STATE_PATH: &str = "./ip_addresses.json";

/// Default location of the service-account key
pub const DEFAULT_CREDENTIALS_PATH: &str = "/secrets/gcp-credentials.json";

/// Compute Engine v1 REST base
pub const DEFAULT_COMPUTE_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

/// Wait between two cycles of the control loop
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 180;

/// Longest rule name the Compute API accepts
const MAX_RULE_NAME_LEN: usize = 63;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// IP source configuration
    #[serde(default)]
    pub ip_source: IpSourceConfig,

    /// Credential configuration
    #[serde(default)]
    pub credentials: CredentialConfig,

    /// Firewall API configuration
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Firewall rules to keep updated, in update order
    pub rules: Vec<String>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl UpdaterConfig {
    /// Create a configuration with defaults for the given rules
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ip_source: IpSourceConfig::default(),
            credentials: CredentialConfig::default(),
            firewall: FirewallConfig::default(),
            state_store: StateStoreConfig::default(),
            rules: rules.into_iter().map(Into::into).collect(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.rules.is_empty() {
            return Err(crate::Error::config("No firewall rules configured"));
        }

        for rule in &self.rules {
            validate_rule_name(rule)?;
        }

        self.ip_source.validate()?;
        self.firewall.validate()?;
        self.state_store.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Check that a firewall rule name is safe to place in an API path
///
/// Accepts letters, digits, `-` and `_`, up to 63 characters.
pub fn validate_rule_name(name: &str) -> Result<(), crate::Error> {
    if name.is_empty() {
        return Err(crate::Error::config("Firewall rule name cannot be empty"));
    }

    if name.len() > MAX_RULE_NAME_LEN {
        return Err(crate::Error::config(format!(
            "Firewall rule name too long: {} chars (max {}). Got: {}",
            name.len(),
            MAX_RULE_NAME_LEN,
            name
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(crate::Error::config(format!(
            "Invalid firewall rule name: '{}'. Valid: letters, digits, '-' and '_'",
            name
        )));
    }

    Ok(())
}

fn validate_http_url(field: &str, url: &str) -> Result<(), crate::Error> {
    if url.is_empty() {
        return Err(crate::Error::config(format!("{} cannot be empty", field)));
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(crate::Error::config(format!(
            "{} must use HTTP or HTTPS scheme. Got: {}",
            field, url
        )));
    }
    Ok(())
}

fn validate_timeout(field: &str, secs: u64) -> Result<(), crate::Error> {
    if !(1..=300).contains(&secs) {
        return Err(crate::Error::config(format!(
            "{} must be between 1 and 300 seconds. Got: {}",
            field, secs
        )));
    }
    Ok(())
}

/// IP source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpSourceConfig {
    /// URL of the IP-echo endpoint
    #[serde(default = "default_ip_source_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_ip_timeout_secs")]
    pub timeout_secs: u64,
}

impl IpSourceConfig {
    /// Validate the IP source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_http_url("IP source URL", &self.url)?;
        validate_timeout("IP source timeout", self.timeout_secs)
    }
}

impl Default for IpSourceConfig {
    fn default() -> Self {
        Self {
            url: default_ip_source_url(),
            timeout_secs: default_ip_timeout_secs(),
        }
    }
}

/// Where the firewall credential comes from
///
/// Handed to the credential loader explicitly; nothing is read from or
/// written to the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Path to a service-account key file
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

/// Firewall API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// REST base of the Compute API
    #[serde(default = "default_compute_api_base")]
    pub api_base: String,

    /// Project owning the rules (defaults to the credential's project)
    #[serde(default)]
    pub project_id: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_firewall_timeout_secs")]
    pub timeout_secs: u64,
}

impl FirewallConfig {
    /// Validate the firewall configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_http_url("Compute API base", &self.api_base)?;
        if let Some(project) = &self.project_id
            && project.trim().is_empty()
        {
            return Err(crate::Error::config("Project ID cannot be empty"));
        }
        validate_timeout("Firewall API timeout", self.timeout_secs)
    }
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            api_base: default_compute_api_base(),
            project_id: None,
            timeout_secs: default_firewall_timeout_secs(),
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: PathBuf,
    },

    /// In-memory state store (not persistent)
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let StateStoreConfig::File { path } = self
            && path.as_os_str().is_empty()
        {
            return Err(crate::Error::config("State file path cannot be empty"));
        }
        Ok(())
    }
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        StateStoreConfig::File {
            path: PathBuf::from(DEFAULT_STATE_PATH),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wait between the end of one cycle and the start of the next (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !(10..=86_400).contains(&self.poll_interval_secs) {
            return Err(crate::Error::config(format!(
                "Poll interval must be between 10 and 86400 seconds. Got: {}",
                self.poll_interval_secs
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_ip_source_url() -> String {
    DEFAULT_IP_SOURCE_URL.to_string()
}

fn default_ip_timeout_secs() -> u64 {
    10
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(DEFAULT_CREDENTIALS_PATH)
}

fn default_compute_api_base() -> String {
    DEFAULT_COMPUTE_API_BASE.to_string()
}

fn default_firewall_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_event_channel_capacity() -> usize {
    100
}
