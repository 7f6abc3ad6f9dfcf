use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

/// Smallest accepted sample period.
pub const MIN_SAMPLE_PERIOD: Duration = Duration::from_millis(1);

/// Smallest accepted sample duration.
pub const MIN_SAMPLE_DURATION: Duration = Duration::from_millis(100);

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(100);
pub const DEFAULT_SAMPLE_DURATION: Duration = Duration::from_millis(2500);

/// Timing parameters for the sampler.
///
/// `period` is how often the scheduler histogram is read; `duration` is the
/// span each published measurement covers. Only validated values can be
/// constructed, including through deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireConfig")]
pub struct SamplerConfig {
    #[serde(rename = "period_ms", serialize_with = "millis::serialize")]
    period: Duration,
    #[serde(rename = "duration_ms", serialize_with = "millis::serialize")]
    duration: Duration,
}

#[derive(Deserialize)]
struct WireConfig {
    #[serde(with = "millis")]
    period_ms: Duration,
    #[serde(with = "millis")]
    duration_ms: Duration,
}

impl TryFrom<WireConfig> for SamplerConfig {
    type Error = SettingsError;

    fn try_from(wire: WireConfig) -> Result<Self, Self::Error> {
        Self::new(wire.period_ms, wire.duration_ms)
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_SAMPLE_PERIOD,
            duration: DEFAULT_SAMPLE_DURATION,
        }
    }
}

impl SamplerConfig {
    pub fn new(period: Duration, duration: Duration) -> Result<Self, SettingsError> {
        validate_period(period)?;
        validate_duration(duration)?;
        Ok(Self { period, duration })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of cumulative snapshots the sliding window holds.
    ///
    /// At least two are needed to diff anything.
    pub fn capacity(&self) -> usize {
        let n = self.duration.as_nanos() / self.period.as_nanos().max(1);
        usize::try_from(n).unwrap_or(usize::MAX).max(2)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("minimum sample period is {min:?}, got {got:?}")]
    PeriodTooSmall { min: Duration, got: Duration },

    #[error("minimum sample duration is {min:?}, got {got:?}")]
    DurationTooSmall { min: Duration, got: Duration },
}

pub fn validate_period(period: Duration) -> Result<(), SettingsError> {
    if period < MIN_SAMPLE_PERIOD {
        return Err(SettingsError::PeriodTooSmall {
            min: MIN_SAMPLE_PERIOD,
            got: period,
        });
    }
    Ok(())
}

pub fn validate_duration(duration: Duration) -> Result<(), SettingsError> {
    if duration < MIN_SAMPLE_DURATION {
        return Err(SettingsError::DurationTooSmall {
            min: MIN_SAMPLE_DURATION,
            got: duration,
        });
    }
    Ok(())
}

/// Live, validated sampler settings with change notification.
///
/// Writers go through the validation gate; values that fail it are never
/// published. Subscribers are woken after every accepted update.
pub struct Settings {
    tx: watch::Sender<SamplerConfig>,
}

impl Settings {
    pub fn new(initial: SamplerConfig) -> Result<Self, SettingsError> {
        let initial = SamplerConfig::new(initial.period, initial.duration)?;
        let (tx, _rx) = watch::channel(initial);
        Ok(Self { tx })
    }

    pub fn get(&self) -> SamplerConfig {
        *self.tx.borrow()
    }

    pub fn set_period(&self, period: Duration) -> Result<SamplerConfig, SettingsError> {
        self.update(Some(period), None)
    }

    pub fn set_duration(&self, duration: Duration) -> Result<SamplerConfig, SettingsError> {
        self.update(None, Some(duration))
    }

    /// Apply either or both values. Nothing is published unless every
    /// supplied value is valid.
    pub fn update(
        &self,
        period: Option<Duration>,
        duration: Option<Duration>,
    ) -> Result<SamplerConfig, SettingsError> {
        if let Some(p) = period {
            validate_period(p)?;
        }
        if let Some(d) = duration {
            validate_duration(d)?;
        }

        self.tx.send_modify(|cfg| {
            if let Some(p) = period {
                cfg.period = p;
            }
            if let Some(d) = duration {
                cfg.duration = d;
            }
        });
        let applied = self.get();
        tracing::info!(
            period_ms = applied.period.as_millis() as u64,
            duration_ms = applied.duration.as_millis() as u64,
            "scheduler latency settings updated"
        );
        Ok(applied)
    }

    /// Receiver that is notified on every accepted update.
    pub fn subscribe(&self) -> watch::Receiver<SamplerConfig> {
        self.tx.subscribe()
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
