//! Counter identity: [`Unit`], [`Role`] and [`Key`].
//!
//! A [`Key`] names one aggregation unit. It pairs a free-form name (usually the
//! instrumented call site, e.g. `"com.acme.OrderService.place"`) with a
//! [`Role`], the semantic category of what is measured together with the
//! [`Unit`] the observations are expressed in.
//!
//! Keys are immutable values compared structurally, so they can be used as
//! map keys and cloned freely: names are stored as `Arc<str>`.
//!
//! # Examples
//!
//! ```rust
//! use contatori_stats::key::{Key, Role, Unit};
//!
//! let key = Key::new(Role::performances(), "checkout");
//! assert_eq!(key.role().unit(), Unit::Nanoseconds);
//! assert_eq!(key, Key::new(Role::new("performances", Unit::Nanoseconds), "checkout"));
//!
//! // 1.5 seconds expressed in milliseconds
//! assert_eq!(Unit::Milliseconds.convert(1.5, Unit::Seconds), Some(1500.0));
//! ```

use std::fmt::{self, Display};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Family a [`Unit`] belongs to. Only units of the same family convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitFamily {
    /// Durations, based on nanoseconds.
    Time,
    /// Sizes, based on bytes (factor 1024).
    Binary,
    /// Plain dimensionless counts.
    Unary,
}

/// Unit of the observations recorded under a [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Unit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Unary,
}

impl Unit {
    /// Returns the family of this unit.
    pub const fn family(self) -> UnitFamily {
        match self {
            Unit::Nanoseconds
            | Unit::Microseconds
            | Unit::Milliseconds
            | Unit::Seconds
            | Unit::Minutes
            | Unit::Hours
            | Unit::Days => UnitFamily::Time,
            Unit::Bytes | Unit::Kilobytes | Unit::Megabytes | Unit::Gigabytes | Unit::Terabytes => {
                UnitFamily::Binary
            }
            Unit::Unary => UnitFamily::Unary,
        }
    }

    /// Number of base units (nanoseconds, bytes or units) in one `self`.
    pub const fn multiplier(self) -> u64 {
        match self {
            Unit::Nanoseconds => 1,
            Unit::Microseconds => 1_000,
            Unit::Milliseconds => 1_000_000,
            Unit::Seconds => 1_000_000_000,
            Unit::Minutes => 60 * 1_000_000_000,
            Unit::Hours => 3_600 * 1_000_000_000,
            Unit::Days => 86_400 * 1_000_000_000,
            Unit::Bytes => 1,
            Unit::Kilobytes => 1 << 10,
            Unit::Megabytes => 1 << 20,
            Unit::Gigabytes => 1 << 30,
            Unit::Terabytes => 1 << 40,
            Unit::Unary => 1,
        }
    }

    /// Returns `true` if values expressed in `other` can be converted to `self`.
    pub fn is_compatible(self, other: Unit) -> bool {
        self.family() == other.family()
    }

    /// Converts `value`, expressed in `from`, into this unit.
    ///
    /// Returns `None` when the two units belong to different families.
    pub fn convert(self, value: f64, from: Unit) -> Option<f64> {
        if !self.is_compatible(from) {
            return None;
        }
        if self == from {
            return Some(value);
        }
        Some(value * from.multiplier() as f64 / self.multiplier() as f64)
    }

    /// Short symbol used when rendering values.
    pub const fn symbol(self) -> &'static str {
        match self {
            Unit::Nanoseconds => "ns",
            Unit::Microseconds => "µs",
            Unit::Milliseconds => "ms",
            Unit::Seconds => "s",
            Unit::Minutes => "min",
            Unit::Hours => "h",
            Unit::Days => "d",
            Unit::Bytes => "B",
            Unit::Kilobytes => "KB",
            Unit::Megabytes => "MB",
            Unit::Gigabytes => "GB",
            Unit::Terabytes => "TB",
            Unit::Unary => "u",
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Semantic category of a counter, e.g. `performances` measured in nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Role {
    name: Arc<str>,
    unit: Unit,
}

impl Role {
    /// Name of the role used for execution times.
    pub const PERFORMANCES: &'static str = "performances";
    /// Name of the role used for failure counts.
    pub const FAILURES: &'static str = "failures";

    /// Creates a new role.
    pub fn new(name: impl Into<Arc<str>>, unit: Unit) -> Self {
        Self {
            name: name.into(),
            unit,
        }
    }

    /// Execution times, in nanoseconds.
    pub fn performances() -> Self {
        Self::new(Self::PERFORMANCES, Unit::Nanoseconds)
    }

    /// Failure counts.
    pub fn failures() -> Self {
        Self::new(Self::FAILURES, Unit::Unary)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.unit)
    }
}

/// Identity of a counter: a [`Role`] and a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Key {
    role: Role,
    name: Arc<str>,
}

impl Key {
    /// Creates a new key.
    pub fn new(role: Role, name: impl Into<Arc<str>>) -> Self {
        Self {
            role,
            name: name.into(),
        }
    }

    /// Shorthand for a key under [`Role::performances`].
    pub fn performance(name: impl Into<Arc<str>>) -> Self {
        Self::new(Role::performances(), name)
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for Key {
    /// Formats the key as `role:name`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role.name, self.name)
    }
}
