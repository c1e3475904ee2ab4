//! Startup configuration for the syscall filter
//!
//! ```json
//! {
//!   "platform": "kvm",
//!   "unrestricted_fs": false,
//!   "console": true,
//!   "host_network": false,
//!   "violation": "report"
//! }
//! ```
//!
//! Every field is optional. Missing fields take the most restrictive value,
//! except `platform`, which defaults to `"auto"` (detect KVM, else ptrace).

use crate::filter::{BackendKind, TrustFlags, ViolationMode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Error type for loading a `FilterConfig`
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Filter-related startup settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Backend name: "ptrace", "kvm" or "auto"
    pub platform: String,
    pub unrestricted_fs: bool,
    pub console: bool,
    pub host_network: bool,
    pub violation: ViolationMode,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            platform: "auto".to_string(),
            unrestricted_fs: false,
            console: false,
            host_network: false,
            violation: ViolationMode::Report,
        }
    }
}

impl FilterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Resolve `platform`; may probe /dev/kvm when set to "auto"
    pub fn backend(&self) -> BackendKind {
        BackendKind::from_name(&self.platform)
    }

    pub fn trust_flags(&self) -> TrustFlags {
        TrustFlags {
            unrestricted_fs: self.unrestricted_fs,
            console: self.console,
            host_network: self.host_network,
        }
    }
}
