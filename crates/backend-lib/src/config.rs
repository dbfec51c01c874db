// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `LMS_PEPPER`
pub const ENV_PREFIX: &str = "LMS_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MIN_PEPPER_LEN: usize = 16;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Log level
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
    /// Server-wide secret mixed into every password hash
    pub pepper: String,
    /// Origin used when building links sent by email
    pub public_base_url: String,
    /// Largest JSON body accepted, in bytes
    pub max_body_bytes: usize,
    /// Global per-ip rate limiting
    pub rate_limit: RateLimitSettings,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Length of a window in seconds
    pub window_secs: u64,
    /// Requests allowed per window
    pub max_requests: u32,
    /// How often expired windows are swept, in seconds
    pub sweep_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            database_path: PathBuf::from("lms.sqlite"),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            pepper: String::new(),
            public_base_url: "http://localhost:8000".to_string(),
            max_body_bytes: 5_000_000,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_secs: 10,
            max_requests: 100,
            sweep_interval_secs: 30 * 60,
        }
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Settings {
    /// Load settings from `config.toml` and `LMS_*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load settings from a specific TOML file (missing files are skipped)
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings: Settings = Self::figment(path).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject settings the server cannot safely run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }
        if self.log_format != "pretty" && self.log_format != "json" {
            bail!("invalid log format: {}", self.log_format);
        }
        if self.pepper.len() < MIN_PEPPER_LEN {
            bail!("pepper must be at least {MIN_PEPPER_LEN} bytes (set {ENV_PREFIX}PEPPER)");
        }
        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be greater than zero");
        }
        if self.rate_limit.window_secs == 0
            || self.rate_limit.max_requests == 0
            || self.rate_limit.sweep_interval_secs == 0
        {
            bail!("rate limit window, max_requests and sweep interval must be non-zero");
        }
        Ok(())
    }
}
