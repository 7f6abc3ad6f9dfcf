use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use crate::logging::{LogConfig, LogError, LogFormat};
use crate::settings::{SamplerConfig, SettingsError};

// ─── Environment variables ───────────────────────────────────────

pub const ENV_ADDR: &str = "SCHED_LATENCY_ADDR";
pub const ENV_PERIOD_MS: &str = "SCHED_LATENCY_PERIOD_MS";
pub const ENV_DURATION_MS: &str = "SCHED_LATENCY_DURATION_MS";
pub const ENV_PROBE_MS: &str = "SCHED_LATENCY_PROBE_MS";
pub const ENV_LOG: &str = "SCHED_LATENCY_LOG";
pub const ENV_LOG_FORMAT: &str = "SCHED_LATENCY_LOG_FORMAT";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PROBE_EVERY: Duration = Duration::from_millis(10);

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub addr: SocketAddr,
    /// Initial sampler settings; adjustable at runtime afterwards
    pub sampler: SamplerConfig,
    /// How often the runtime probe spawns a measurement task
    pub probe_every: Duration,
    pub log: LogConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds, got {value:?}")]
    InvalidMillis { var: &'static str, value: String },

    #[error("{var} must be at least 1ms")]
    ZeroMillis { var: &'static str },

    #[error("{var} is not a valid socket address: {value:?}")]
    InvalidAddr { var: &'static str, value: String },

    #[error(transparent)]
    Sampler(#[from] SettingsError),

    #[error(transparent)]
    Log(#[from] LogError),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            sampler: SamplerConfig::default(),
            probe_every: DEFAULT_PROBE_EVERY,
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(value) = lookup(ENV_ADDR) {
            cfg.addr = value.parse().map_err(|_| ConfigError::InvalidAddr {
                var: ENV_ADDR,
                value,
            })?;
        }

        let period = millis(&lookup, ENV_PERIOD_MS)?.unwrap_or(cfg.sampler.period());
        let duration = millis(&lookup, ENV_DURATION_MS)?.unwrap_or(cfg.sampler.duration());
        cfg.sampler = SamplerConfig::new(period, duration)?;

        if let Some(every) = millis(&lookup, ENV_PROBE_MS)? {
            cfg.probe_every = every;
        }

        if let Some(level) = lookup(ENV_LOG) {
            cfg.log.level = level;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            cfg.log.format = format.parse::<LogFormat>()?;
        }

        Ok(cfg)
    }
}

fn millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    let ms: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidMillis { var, value })?;
    if ms == 0 {
        return Err(ConfigError::ZeroMillis { var });
    }
    Ok(Some(Duration::from_millis(ms)))
}
