//! Configuration loading and validation
//!
//! The broker section keeps the key names of the broker's developer
//! console so an existing `configs/config.json` can be reused as-is.

use crate::error::{AppError, Result};
use crate::storage::write_atomic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "configs/config.json";
pub const DEFAULT_CONTRACT_FILES_URL: &str = "https://api.iiflcapital.com/v1/contractfiles";

/// Upper bound on `fetch.history_days` (about a century)
pub const MAX_HISTORY_DAYS: i64 = 36_500;

const OPTIONAL_SECTIONS: [&str; 3] = ["risk", "fetch", "paths"];

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "ClientId")]
    pub client_id: String,

    #[serde(rename = "AppSecret")]
    pub app_secret: String,

    #[serde(rename = "AuthCode", default, skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,

    #[serde(rename = "IIFL_BASE_URL")]
    pub base_url: String,

    #[serde(rename = "GET_USER_SESSION_ENDPOINT")]
    pub session_endpoint: String,

    #[serde(rename = "HOLDINGS_ENDPOINT")]
    pub holdings_endpoint: String,

    #[serde(rename = "HISTORICAL_DATA_ENDPOINT")]
    pub historical_data_endpoint: String,

    #[serde(rename = "CONTRACT_FILES_URL", default = "default_contract_files_url")]
    pub contract_files_url: String,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    /// Keys this crate does not interpret, kept so saving does not drop them
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    #[serde(skip)]
    source: Option<PathBuf>,

    /// Defaulted sections that were absent from the file; saving leaves them out
    #[serde(skip)]
    absent_sections: Vec<&'static str>,
}

/// ATR / trailing-stop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub atr_period: usize,
    pub atr_multiplier: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            atr_multiplier: 2.5,
        }
    }
}

/// Candle fetch parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_concurrent_requests: usize,
    pub request_timeout_secs: u64,
    /// Calendar days of history requested (about 3 years and 3 months)
    pub history_days: i64,
    pub exchange: String,
    pub interval: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 8,
            request_timeout_secs: 30,
            history_days: 3 * 365 + 90,
            exchange: "NSEEQ".to_string(),
            interval: "1 day".to_string(),
        }
    }
}

/// Where generated files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("files"),
            static_dir: PathBuf::from("static"),
            log_dir: PathBuf::from("log"),
        }
    }
}

impl PathsConfig {
    pub fn holdings_file(&self) -> PathBuf {
        self.data_dir.join("holding.json")
    }

    pub fn report_file(&self) -> PathBuf {
        self.data_dir.join("atr.json")
    }

    pub fn auth_token_file(&self) -> PathBuf {
        self.data_dir.join("auth_token.txt")
    }

    pub fn candle_cache_file(&self) -> PathBuf {
        self.data_dir.join("candles.duckdb")
    }

    pub fn contract_file(&self, exchange: &str) -> PathBuf {
        self.static_dir.join(format!("{}.json", exchange))
    }

    /// Read only the `paths` section of a config file.
    ///
    /// Credentials and URLs are not looked at. A missing file gives the
    /// default paths; unreadable JSON is still an error.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Config file {:?} not found, using default paths", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::Config(format!(
                    "Failed to read config file {:?}: {}",
                    path, e
                )))
            }
        };

        #[derive(Deserialize)]
        struct PathsOnly {
            #[serde(default)]
            paths: PathsConfig,
        }

        let parsed: PathsOnly = serde_json::from_str(&data).map_err(|e| {
            AppError::Config(format!("Error decoding JSON from {:?}: {}", path, e))
        })?;
        Ok(parsed.paths)
    }
}

fn default_contract_files_url() -> String {
    DEFAULT_CONTRACT_FILES_URL.to_string()
}

impl AppConfig {
    /// Load configuration from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let data = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let raw: Value = serde_json::from_str(&data).map_err(|e| {
            AppError::Config(format!("Error decoding JSON from {:?}: {}", path, e))
        })?;
        let absent_sections = OPTIONAL_SECTIONS
            .into_iter()
            .filter(|section| raw.get(*section).is_none())
            .collect();

        let mut config: AppConfig = serde_json::from_value(raw).map_err(|e| {
            AppError::Config(format!("Invalid config in {:?}: {}", path, e))
        })?;

        config.source = Some(path.to_path_buf());
        config.absent_sections = absent_sections;
        config.validate()?;

        Ok(config)
    }

    /// Write the configuration back to the file it was loaded from
    pub fn save(&self) -> Result<()> {
        let path = self
            .source
            .as_ref()
            .ok_or_else(|| AppError::Config("Config has no source file to save to".to_string()))?;

        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            for section in &self.absent_sections {
                map.remove(*section);
            }
        }

        let data = serde_json::to_string_pretty(&value)?;
        write_atomic(path, data.as_bytes())?;

        info!("Config saved successfully to {:?}", path);
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AppError::Config("ClientId is required".to_string()));
        }
        if self.app_secret.trim().is_empty() {
            return Err(AppError::Config("AppSecret is required".to_string()));
        }

        url::Url::parse(&self.base_url)
            .map_err(|e| AppError::Config(format!("Invalid IIFL_BASE_URL '{}': {}", self.base_url, e)))?;
        url::Url::parse(&self.contract_files_url).map_err(|e| {
            AppError::Config(format!(
                "Invalid CONTRACT_FILES_URL '{}': {}",
                self.contract_files_url, e
            ))
        })?;

        if self.risk.atr_period == 0 {
            return Err(AppError::Config("risk.atr_period must be positive".to_string()));
        }
        if !self.risk.atr_multiplier.is_finite() || self.risk.atr_multiplier < 0.0 {
            return Err(AppError::Config(
                "risk.atr_multiplier must be a non-negative number".to_string(),
            ));
        }

        if !(1..=64).contains(&self.fetch.max_concurrent_requests) {
            return Err(AppError::Config(
                "fetch.max_concurrent_requests must be between 1 and 64".to_string(),
            ));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "fetch.request_timeout_secs must be positive".to_string(),
            ));
        }
        if !(1..=MAX_HISTORY_DAYS).contains(&self.fetch.history_days) {
            return Err(AppError::Config(format!(
                "fetch.history_days must be between 1 and {}",
                MAX_HISTORY_DAYS
            )));
        }

        Ok(())
    }

    pub fn session_url(&self) -> String {
        format!("{}{}", self.base_url, self.session_endpoint)
    }

    pub fn holdings_url(&self) -> String {
        format!("{}{}", self.base_url, self.holdings_endpoint)
    }

    pub fn historical_data_url(&self) -> String {
        format!("{}{}", self.base_url, self.historical_data_endpoint)
    }
}
