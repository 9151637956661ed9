use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

use crate::cache::CachePolicy;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FrankfurterProviderConfig {
    pub latest_url: String,
    pub historical_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FixerProviderConfig {
    pub latest_url: String,
    pub timeseries_url: String,
    pub access_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub frankfurter: Option<FrankfurterProviderConfig>,
    pub fixer: Option<FixerProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            frankfurter: Some(FrankfurterProviderConfig {
                latest_url: "https://api.frankfurter.dev/v1/latest".to_string(),
                historical_url: "https://api.frankfurter.dev/v1/".to_string(),
            }),
            fixer: Some(FixerProviderConfig {
                latest_url: "https://data.fixer.io/api/latest".to_string(),
                timeseries_url: "https://data.fixer.io/api/timeseries".to_string(),
                access_key: String::new(),
            }),
        }
    }
}

/// Fixed-window limiter guarding the inbound HTTP routes.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct InboundRateLimitConfig {
    pub permit_limit: usize,
    pub window_secs: u64,
    pub queue_limit: usize,
}

impl Default for InboundRateLimitConfig {
    fn default() -> Self {
        InboundRateLimitConfig {
            permit_limit: 100,
            window_secs: 60,
            queue_limit: 20,
        }
    }
}

/// Token bucket applied separately to each upstream provider.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct OutboundRateLimitConfig {
    pub token_limit: usize,
    pub tokens_per_period: usize,
    pub period_secs: u64,
    pub queue_limit: usize,
}

impl Default for OutboundRateLimitConfig {
    fn default() -> Self {
        OutboundRateLimitConfig {
            token_limit: 10,
            tokens_per_period: 10,
            period_secs: 1,
            queue_limit: 16,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub struct RateLimitsConfig {
    #[serde(default)]
    pub inbound: InboundRateLimitConfig,
    #[serde(default)]
    pub outbound: OutboundRateLimitConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub struct CacheConfig {
    /// Snapshot TTL in seconds. Absent means cached rates never expire.
    pub ttl_secs: Option<u64>,
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        match self.ttl_secs {
            Some(secs) => CachePolicy::ExpireAfter(Duration::from_secs(secs)),
            None => CachePolicy::KeepForever,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "fxmux", "fxmux")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
