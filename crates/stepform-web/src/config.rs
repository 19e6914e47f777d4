use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STEP_TTL_SECS: u64 = 30 * 60;
pub const DEFAULT_MAX_DELEGATIONS: usize = 16;
pub const DEFAULT_NOTIFY_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    #[serde(default = "default_site_title")]
    pub site_title: String,
    #[serde(default)]
    pub stylesheet: Option<String>,
    #[serde(default)]
    pub step_ttl_secs: u64,
    #[serde(default)]
    pub max_delegations: usize,
    /// Sender of control-information mail.
    #[serde(default = "default_supervisor_address")]
    pub supervisor_address: String,
    /// Externally visible base URL, used in mailed links.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Show outgoing mail on the page instead of sending it.
    #[serde(default)]
    pub local_debug: bool,
    #[serde(default)]
    pub notify_retries: u32,
}

fn default_site_title() -> String {
    "Stepform".to_string()
}

fn default_supervisor_address() -> String {
    "civs@localhost".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

impl SiteConfig {
    pub fn minimal() -> Self {
        Self {
            site_title: default_site_title(),
            stylesheet: None,
            step_ttl_secs: DEFAULT_STEP_TTL_SECS,
            max_delegations: DEFAULT_MAX_DELEGATIONS,
            supervisor_address: default_supervisor_address(),
            public_url: default_public_url(),
            local_debug: false,
            notify_retries: DEFAULT_NOTIFY_RETRIES,
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let cfg = serde_json::from_str::<SiteConfig>(content)?;
        Ok(cfg.normalized())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Zero means "unset" for the numeric limits.
    fn normalized(mut self) -> Self {
        if self.step_ttl_secs == 0 {
            self.step_ttl_secs = DEFAULT_STEP_TTL_SECS;
        }
        if self.max_delegations == 0 {
            self.max_delegations = DEFAULT_MAX_DELEGATIONS;
        }
        if self.notify_retries == 0 {
            self.notify_retries = DEFAULT_NOTIFY_RETRIES;
        }
        while self.public_url.ends_with('/') {
            self.public_url.pop();
        }
        self
    }

    pub fn step_ttl(&self) -> Duration {
        Duration::from_secs(self.step_ttl_secs)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self::minimal()
    }
}
