use crate::global;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Prefix marking a config value that is read from the environment.
const ENV_PREFIX: &str = "env:";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub zoom: ZoomConfig,
    pub listing: ListingConfig,
    pub delivery: DeliveryConfig,
    pub session: SessionConfig,
    pub display: DisplayConfig,
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token, usually `env:TOKEN`.
    pub token: String,
    /// Bot API server. Point this at a local `telegram-bot-api` instance to
    /// lift the 50 MB upload limit.
    pub api_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: "env:TOKEN".to_string(),
            api_url: None,
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomConfig {
    pub oauth_url: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            oauth_url: "https://zoom.us/oauth/token".to_string(),
            api_base_url: "https://api.zoom.us/v2".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ZoomConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingConfig {
    /// How far back `/recs` looks, in days.
    pub lookback_days: i64,
    pub page_size: u32,
    /// Extra listing attempts when the vendor reports no recordings.
    /// Zero reports "no recordings" straight away.
    pub empty_retry_attempts: u32,
    pub empty_retry_delay_secs: u64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            page_size: 300,
            empty_retry_attempts: 0,
            empty_retry_delay_secs: 30,
        }
    }
}

impl ListingConfig {
    /// Listing range ending on `today`, starting no earlier than the
    /// first representable date.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let lookback = Days::new(self.lookback_days.max(0).unsigned_abs());
        let start = today.checked_sub_days(lookback).unwrap_or(NaiveDate::MIN);
        (start, today)
    }

    pub fn empty_retry_delay(&self) -> Duration {
        Duration::from_secs(self.empty_retry_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub downloads_dir: Option<PathBuf>,
    pub download_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            downloads_dir: None,
            download_timeout_secs: 3600,
        }
    }
}

impl DeliveryConfig {
    pub fn downloads_dir(&self) -> Result<PathBuf> {
        match &self.downloads_dir {
            Some(dir) => Ok(dir.clone()),
            None => global::recordings_dir(),
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_sessions: usize,
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            ttl_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// IANA time zone used for meeting display keys.
    pub timezone: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Moscow".to_string(),
        }
    }
}

impl DisplayConfig {
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow!("Invalid display timezone '{}': {}", self.timezone, e))
    }
}

/// One Zoom account and the Telegram channel its recordings are posted to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub channel_id: String,
    pub thread_id: Option<String>,
    pub index_file: Option<PathBuf>,
}

impl Config {
    /// Loads the config from `path`, or from the default location.
    ///
    /// A `.env` file in the working directory is applied to the process
    /// environment first so `env:` values can refer to it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(dotenv) = dotenvy::dotenv() {
            info!("Loaded environment from {:?}", dotenv);
        }

        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config = Self::parse(&content)?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}

/// Resolves a config value, reading `env:NAME` values from the environment.
pub fn resolve_value(raw: &str) -> Result<String> {
    match raw.strip_prefix(ENV_PREFIX) {
        Some(var) => {
            let var = var.trim();
            std::env::var(var).with_context(|| format!("Environment variable {} is not set", var))
        }
        None => Ok(raw.to_string()),
    }
}

/// Like [`resolve_value`] but rejects empty results.
pub fn resolve_required(field: &str, raw: &str) -> Result<String> {
    let value = resolve_value(raw)?;
    if value.trim().is_empty() {
        bail!("{} must not be empty", field);
    }
    Ok(value)
}
