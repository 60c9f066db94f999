//! Configuration management for receipt-watch
//!
//! Settings come from built-in defaults, an optional TOML file and
//! `RECEIPT_WATCH_*` environment variables, applied in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Global configuration for receipt-watch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptWatchConfig {
    /// Receipt backend (REST) configuration
    pub backend: BackendConfig,
    /// Object storage configuration
    pub cloud: CloudConfig,
    /// NFC tag writer configuration
    pub tag: TagConfig,
    /// Failure policy of the receipt pipeline
    pub pipeline: PipelineConfig,
    /// Directory watcher configuration
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    /// Send `Bearer: <token>` as the existing backend expects, instead of `Bearer <token>`
    pub legacy_bearer_colon: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Upload endpoint; `{cloud_name}` is substituted
    pub upload_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagArgFormat {
    /// Four big-endian bytes as decimal arguments
    DecimalBytes,
    /// Four big-endian bytes as hex arguments
    HexBytes,
    /// The receipt id as a single decimal argument
    Integer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub enabled: bool,
    pub interpreter: String,
    pub write_script: PathBuf,
    pub clear_script: Option<PathBuf>,
    pub arg_format: TagArgFormat,
    /// How long the id stays on the tag before the clear script runs
    pub hold_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub continue_on_upload_failure: bool,
    pub halt_on_backend_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// How often a blocked watch wakes up to check for interruption
    pub poll_interval_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://digital-receipt-production.herokuapp.com".to_string(),
            email: String::new(),
            password: String::new(),
            legacy_bearer_colon: true,
            timeout_secs: 30,
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            upload_url: "https://api.cloudinary.com/v1_1/{cloud_name}/auto/upload".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Where the kiosk image installs the tag scripts.
const TAG_SCRIPT_DIR: &str = "/home/pi/Desktop/Digital Receipt/raspberrypi/python";

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: "python3".to_string(),
            write_script: PathBuf::from(format!("{}/receipt__write_tag.py", TAG_SCRIPT_DIR)),
            clear_script: Some(PathBuf::from(format!("{}/receipt__clear_tag.py", TAG_SCRIPT_DIR))),
            arg_format: TagArgFormat::HexBytes,
            hold_secs: 30,
            timeout_secs: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continue_on_upload_failure: true,
            halt_on_backend_error: true,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CloudConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn endpoint(&self) -> String {
        self.upload_url.replace("{cloud_name}", &self.cloud_name)
    }
}

impl TagConfig {
    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ReceiptWatchConfig {
    /// Load configuration from `path` (or defaults), then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override settings with environment variables if present
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(val) = var("RECEIPT_WATCH_API_URL") {
            self.backend.base_url = val;
        }
        if let Some(val) = var("RECEIPT_WATCH_EMAIL") {
            self.backend.email = val;
        }
        if let Some(val) = var("RECEIPT_WATCH_PASSWORD") {
            self.backend.password = val;
        }
        if let Some(val) = var("RECEIPT_WATCH_CLOUD_NAME") {
            self.cloud.cloud_name = val;
        }
        if let Some(val) = var("RECEIPT_WATCH_CLOUD_API_KEY") {
            self.cloud.api_key = val;
        }
        if let Some(val) = var("RECEIPT_WATCH_CLOUD_API_SECRET") {
            self.cloud.api_secret = val;
        }
        if let Some(val) = var("RECEIPT_WATCH_TAG_SCRIPT") {
            self.tag.write_script = PathBuf::from(val);
        }
        if let Some(val) = var("RECEIPT_WATCH_TAG_CLEAR_SCRIPT") {
            // An empty value turns the clear step off
            self.tag.clear_script = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.backend.base_url.is_empty() {
            return Err("backend.base_url must not be empty".to_string());
        }

        if self.backend.email.is_empty() || self.backend.password.is_empty() {
            return Err("backend credentials are required (RECEIPT_WATCH_EMAIL / RECEIPT_WATCH_PASSWORD)".to_string());
        }

        if self.cloud.cloud_name.is_empty() || self.cloud.api_key.is_empty() || self.cloud.api_secret.is_empty() {
            return Err("cloud credentials are required (cloud_name, api_key, api_secret)".to_string());
        }

        if self.backend.timeout_secs == 0 || self.cloud.timeout_secs == 0 || self.tag.timeout_secs == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}
