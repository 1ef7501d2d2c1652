//! Configuration consumed by the registry and the batch scheduler.
//!
//! [`Settings`] is a plain struct handed over at construction time. The
//! crate never reads files or the environment; hosts that keep their
//! configuration as properties can feed them through
//! [`Settings::from_properties`].
//!
//! | Property | Field | Default |
//! |----------|-------|---------|
//! | `batch.period` (ms) | `batch_period` | 60000 |
//! | `batch.clear-after-collect` | `clear_after_collect` | `false` |
//! | `registry.max-size` | `max_size` | 0 (unbounded) |
//! | `registry.eviction-ratio` | `eviction_ratio` | 0.25 |
//! | `counter.with-exponential-decay` | `exponential_decay` | `false` |
//! | `counter.exponential-decay.alpha` | `decay.alpha` | 0.015 |
//! | `counter.exponential-decay.sampling-size` | `decay.sampling_size` | 1028 |
//! | `counter.exponential-decay.refresh` (ms) | `decay.refresh` | 3600000 |
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::settings::Settings;
//! use std::time::Duration;
//!
//! let settings = Settings::from_properties([
//!     ("batch.period", "1000"),
//!     ("registry.max-size", "5000"),
//! ])
//! .unwrap();
//!
//! assert_eq!(settings.batch_period, Duration::from_secs(1));
//! assert_eq!(settings.max_size, 5000);
//! assert_eq!(settings.eviction_ratio, 0.25);
//! ```

use std::str::FromStr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::counters::decaying::DecaySettings;
use crate::counters::CounterPolicy;
use crate::error::SettingsError;
use crate::key::Role;

/// Settings of the aggregation engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Settings {
    /// Interval between two batch exports.
    pub batch_period: Duration,
    /// Whether the registry is emptied after each collection.
    pub clear_after_collect: bool,
    /// Maximum number of counters before eviction kicks in; 0 disables the bound.
    pub max_size: usize,
    /// Fraction of the counters removed by one eviction pass.
    pub eviction_ratio: f64,
    /// Counters under these roles are never evicted.
    pub non_evictable_roles: Vec<Role>,
    /// Whether new counters use the exponential-decay accumulator.
    pub exponential_decay: bool,
    pub decay: DecaySettings,
}

impl Settings {
    pub const DEFAULT_BATCH_PERIOD: Duration = Duration::from_secs(60);
    pub const DEFAULT_EVICTION_RATIO: f64 = 0.25;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_period(self, batch_period: Duration) -> Self {
        Self {
            batch_period,
            ..self
        }
    }

    pub fn with_clear_after_collect(self, clear_after_collect: bool) -> Self {
        Self {
            clear_after_collect,
            ..self
        }
    }

    /// Bounds the registry to `max_size` counters, evicting `eviction_ratio`
    /// of them whenever the bound is exceeded.
    pub fn with_max_size(self, max_size: usize, eviction_ratio: f64) -> Self {
        Self {
            max_size,
            eviction_ratio,
            ..self
        }
    }

    pub fn with_non_evictable_role(mut self, role: Role) -> Self {
        self.non_evictable_roles.push(role);
        self
    }

    pub fn with_exponential_decay(self, decay: DecaySettings) -> Self {
        Self {
            exponential_decay: true,
            decay,
            ..self
        }
    }

    /// Accumulator policy for new counters.
    pub fn counter_policy(&self) -> CounterPolicy {
        if self.exponential_decay {
            CounterPolicy::ExponentialDecay(self.decay)
        } else {
            CounterPolicy::Exact
        }
    }

    /// Checks that every value is within its allowed range.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.batch_period.is_zero() {
            return Err(SettingsError::Invalid {
                key: "batch.period",
                reason: "must be greater than zero",
            });
        }
        if !(self.eviction_ratio > 0.0 && self.eviction_ratio <= 1.0) {
            return Err(SettingsError::Invalid {
                key: "registry.eviction-ratio",
                reason: "must be in (0, 1]",
            });
        }
        if self.exponential_decay {
            if !(self.decay.alpha.is_finite() && self.decay.alpha > 0.0) {
                return Err(SettingsError::Invalid {
                    key: "counter.exponential-decay.alpha",
                    reason: "must be a positive number",
                });
            }
            if self.decay.sampling_size == 0 {
                return Err(SettingsError::Invalid {
                    key: "counter.exponential-decay.sampling-size",
                    reason: "must be greater than zero",
                });
            }
            if self.decay.refresh.is_zero() {
                return Err(SettingsError::Invalid {
                    key: "counter.exponential-decay.refresh",
                    reason: "must be greater than zero",
                });
            }
        }
        Ok(())
    }

    /// Builds validated settings from `(key, value)` properties.
    ///
    /// Unknown keys are ignored so a host can pass its whole property set.
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Settings::default();
        for (key, value) in properties {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "batch.period" => settings.batch_period = parse_millis(key, value)?,
                "batch.clear-after-collect" => settings.clear_after_collect = parse(key, value)?,
                "registry.max-size" => settings.max_size = parse(key, value)?,
                "registry.eviction-ratio" => settings.eviction_ratio = parse(key, value)?,
                "counter.with-exponential-decay" => {
                    settings.exponential_decay = parse(key, value)?
                }
                "counter.exponential-decay.alpha" => settings.decay.alpha = parse(key, value)?,
                "counter.exponential-decay.sampling-size" => {
                    settings.decay.sampling_size = parse(key, value)?
                }
                "counter.exponential-decay.refresh" => {
                    settings.decay.refresh = parse_millis(key, value)?
                }
                _ => tracing::debug!(key, "ignoring unknown property"),
            }
        }
        settings.validate()?;
        Ok(settings)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| SettingsError::Parse {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, SettingsError> {
    parse::<u64>(key, value).map(Duration::from_millis)
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            batch_period: Self::DEFAULT_BATCH_PERIOD,
            clear_after_collect: false,
            max_size: 0,
            eviction_ratio: Self::DEFAULT_EVICTION_RATIO,
            non_evictable_roles: Vec::new(),
            exponential_decay: false,
            decay: DecaySettings::default(),
        }
    }
}
