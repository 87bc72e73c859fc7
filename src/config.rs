use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::model::Airline;

/// How long a scraped schedule stays fresh (10 minutes).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 10 * 60;

/// Interval between background sweeps of expired cache entries.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Hard upper bound for one scrape operation, retries included.
pub const DEFAULT_SCRAPE_TIMEOUT_SECS: u64 = 30;

/// Total attempts for a scrape that keeps failing with network errors.
pub const DEFAULT_NETWORK_ATTEMPTS: u32 = 3;

/// Base delay of the exponential backoff between network retries.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Delay used when a rate-limited portal response carries no `Retry-After`.
pub const DEFAULT_RATE_LIMIT_DELAY_SECS: u64 = 2;

/// Upper bound on any `Retry-After` delay we are willing to honor.
pub const MAX_RATE_LIMIT_DELAY_SECS: u64 = 30;

/// Timeout for each individual HTTP request to a crew portal.
pub const DEFAULT_PORTAL_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Requests allowed per client IP within one rate-limit window.
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: usize = 100;

/// Length of the per-client rate-limit window.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

pub const DEFAULT_ABX_PORTAL_URL: &str = "https://crew.abxair.com/nlcrew/api/";
pub const DEFAULT_ATI_PORTAL_URL: &str = "https://crew.airtransport.cc/nlcrew/api/";

/// Top-level configuration for the scrape service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub scrape: ScrapeConfig,
    pub portals: PortalConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: IpAddr,
    /// Listening port; `0` picks a free port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Bounds a whole scrape, including every retry and backoff sleep.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_SCRAPE_TIMEOUT_SECS),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub network_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    pub rate_limit_retries: u32,
    #[serde(with = "humantime_serde")]
    pub default_rate_limit_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_rate_limit_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network_attempts: DEFAULT_NETWORK_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            rate_limit_retries: 1,
            default_rate_limit_delay: Duration::from_secs(DEFAULT_RATE_LIMIT_DELAY_SECS),
            max_rate_limit_delay: Duration::from_secs(MAX_RATE_LIMIT_DELAY_SECS),
        }
    }
}

/// Remote portal endpoints. Credentials are never part of configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub abx_base_url: String,
    pub ati_base_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl PortalConfig {
    pub fn base_url(&self, airline: Airline) -> &str {
        match airline {
            Airline::Abx => &self.abx_base_url,
            Airline::Ati => &self.ati_base_url,
        }
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            abx_base_url: DEFAULT_ABX_PORTAL_URL.to_string(),
            ati_base_url: DEFAULT_ATI_PORTAL_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_PORTAL_REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break cache or retry invariants.
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl.is_zero() {
            return Err(anyhow!("cache.ttl must be > 0"));
        }
        if self.cache.sweep_interval.is_zero() {
            return Err(anyhow!("cache.sweep_interval must be > 0"));
        }
        if self.scrape.timeout.is_zero() {
            return Err(anyhow!("scrape.timeout must be > 0"));
        }
        if self.scrape.retry.network_attempts == 0 {
            return Err(anyhow!("scrape.retry.network_attempts must be > 0"));
        }
        if self.rate_limit.max_requests == 0 || self.rate_limit.window.is_zero() {
            return Err(anyhow!("rate_limit.max_requests and rate_limit.window must be > 0"));
        }
        for airline in Airline::ALL {
            if self.portals.base_url(airline).trim().is_empty() {
                return Err(anyhow!("portal base url for {} is empty", airline));
            }
        }
        Ok(())
    }
}
