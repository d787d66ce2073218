//! Service configuration.
//!
//! Everything has a default, so the service runs without a config file.
//! Precedence: defaults < YAML file < environment < command line.

use crate::wait::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub browser: BrowserConfig,
    pub navigation: NavigationConfig,
    pub extraction: ExtractionConfig,
    pub cache: CacheConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// The MGM page and backend API for the fixed location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Province forecast page that renders the data client-side
    pub url: String,
    /// Host of the JSON API the page calls
    pub api_host: String,
    /// Forecast center id (current conditions and daily forecast)
    pub center_id: u32,
    /// Observation station number (hourly forecast)
    pub station_id: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://www.mgm.gov.tr/tahmin/il-ve-ilceler.aspx?il=Karaman".to_string(),
            api_host: "servis.mgm.gov.tr".to_string(),
            center_id: 97001,
            station_id: 17246,
        }
    }
}

impl SourceConfig {
    fn api_base(&self) -> String {
        format!("https://{}/web", self.api_host.trim_end_matches('/'))
    }

    pub fn current_url(&self) -> String {
        format!("{}/sondurumlar?merkezid={}", self.api_base(), self.center_id)
    }

    pub fn hourly_url(&self) -> String {
        format!(
            "{}/tahminler/saatlik?istno={}",
            self.api_base(),
            self.station_id
        )
    }

    pub fn daily_url(&self) -> String {
        format!("{}/tahminler/gunluk?istno={}", self.api_base(), self.center_id)
    }
}

/// Chrome launch options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    pub user_agent: String,
    pub accept_language: Option<String>,
    pub referer: Option<String>,
    pub origin: Option<String>,
    /// Constrained serverless runtime (single process, no /dev/shm)
    pub serverless: bool,
    /// Extra command line flags passed to Chrome
    pub args: Vec<String>,
    pub launch_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: Some("tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7".to_string()),
            referer: Some("https://www.mgm.gov.tr/".to_string()),
            origin: Some("https://www.mgm.gov.tr".to_string()),
            serverless: false,
            args: Vec::new(),
            launch_timeout_secs: 20,
        }
    }
}

impl BrowserConfig {
    /// Chrome flags for this environment, on top of the sandbox flags the
    /// launcher always adds.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.serverless {
            args.extend(
                [
                    "--single-process",
                    "--no-zygote",
                    "--disable-dev-shm-usage",
                    "--disable-gpu",
                ]
                .map(String::from),
            );
        }
        args.extend(self.args.iter().cloned());
        args
    }
}

/// When navigation counts as finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitUntil {
    /// At most 2 requests in flight for 500ms
    #[default]
    NetworkIdle2,
    /// No requests in flight for 500ms
    NetworkIdle0,
    /// Initial HTML parsed
    DomContentLoaded,
}

impl WaitUntil {
    /// Maximum in-flight requests tolerated, `None` when not network based.
    pub fn max_inflight(&self) -> Option<usize> {
        match self {
            Self::NetworkIdle2 => Some(2),
            Self::NetworkIdle0 => Some(0),
            Self::DomContentLoaded => None,
        }
    }
}

/// Navigation and settle behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub wait_until: WaitUntil,
    /// Navigation budget; defaults to 60s, or 30s when serverless
    pub timeout_secs: Option<u64>,
    /// How long the network must stay quiet to count as idle
    pub idle_quiet_ms: u64,
    /// Fixed delay after navigation
    pub settle_delay_ms: u64,
    /// Element whose text must become non-empty before extraction
    pub ready_selector: Option<String>,
    pub ready_wait: WaitPolicy,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            wait_until: WaitUntil::default(),
            timeout_secs: None,
            idle_quiet_ms: 500,
            settle_delay_ms: 0,
            ready_selector: Some(".anlik-sicaklik-deger".to_string()),
            ready_wait: WaitPolicy::default(),
        }
    }
}

/// Which extraction technique the service uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// AngularJS scope read, DOM scraping when it has no current data
    #[default]
    #[serde(alias = "angular")]
    Scope,
    /// DOM scraping only
    Dom,
    /// Capture the page's own API responses during load
    #[serde(alias = "network")]
    Intercept,
    /// Call the API endpoints from inside the loaded page
    #[serde(alias = "fetch")]
    Direct,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scope => "scope",
            Self::Dom => "dom",
            Self::Intercept => "intercept",
            Self::Direct => "direct",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scope" | "angular" => Ok(Self::Scope),
            "dom" => Ok(Self::Dom),
            "intercept" | "network" => Ok(Self::Intercept),
            "direct" | "fetch" => Ok(Self::Direct),
            other => Err(ConfigError::ValidationError(format!(
                "unknown strategy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub strategy: Strategy,
    /// Polling for intercepted responses after navigation
    pub capture_wait: WaitPolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            capture_wait: WaitPolicy::fixed(500, 5_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: crate::cache::DEFAULT_TTL.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`.
    ///
    /// `PORT` sets the listen port, `VERCEL`/`SERVERLESS` enable serverless
    /// mode, `CHROME_PATH` points at the browser, `MGM_STRATEGY` picks the
    /// extraction strategy.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("PORT must be a port number, got '{}'", port))
            })?;
        }
        if ["VERCEL", "SERVERLESS"]
            .iter()
            .filter_map(|key| lookup(key))
            .any(|v| is_truthy(&v))
        {
            self.browser.serverless = true;
        }
        if let Some(path) = lookup("CHROME_PATH").filter(|p| !p.trim().is_empty()) {
            self.browser.executable = Some(PathBuf::from(path.trim()));
        }
        if let Some(strategy) = lookup("MGM_STRATEGY") {
            self.extraction.strategy = strategy.parse()?;
        }
        Ok(())
    }

    /// Check values that cannot be expressed through types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.source.url.starts_with("http://") || self.source.url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "source.url must be an http(s) URL, got '{}'",
                self.source.url
            )));
        }
        if self.source.api_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "source.api_host must not be empty".to_string(),
            ));
        }
        if self.navigation.timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "navigation.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.browser.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "browser.user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective navigation budget.
    pub fn navigation_timeout(&self) -> Duration {
        let secs = self
            .navigation
            .timeout_secs
            .unwrap_or(if self.browser.serverless { 30 } else { 60 });
        Duration::from_secs(secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

fn is_truthy(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
