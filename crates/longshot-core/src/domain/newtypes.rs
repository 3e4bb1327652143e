//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the values that flow between the device and
//! the server: second-based timestamps, samples, the device prefix and the
//! device credentials.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DomainError;

// ============================================================================
// Timestamp
// ============================================================================

/// A point in time in seconds since the UNIX epoch; fractions are allowed
///
/// All internal state is kept in seconds. The wire protocol speaks
/// milliseconds, see [`Timestamp::from_millis`] and [`Timestamp::as_millis`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Create a timestamp from seconds since the epoch
    #[must_use]
    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Create a timestamp from a wire value in milliseconds
    #[must_use]
    pub fn from_millis(millis: f64) -> Self {
        Self(millis / 1000.0)
    }

    /// The current wall-clock time, with microsecond resolution
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_micros() as f64 / 1_000_000.0)
    }

    /// Seconds since the epoch
    #[must_use]
    pub const fn as_secs(&self) -> f64 {
        self.0
    }

    /// Milliseconds since the epoch, as sent on the wire
    #[must_use]
    pub fn as_millis(&self) -> f64 {
        self.0 * 1000.0
    }

    /// Total ordering usable for sorting (NaN sorts last)
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Sample
// ============================================================================

/// A single `(timestamp, value)` observation of a pathpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: Value,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: Value) -> Self {
        Self { timestamp, value }
    }
}

// ============================================================================
// DevicePrefix
// ============================================================================

/// Single-character namespace token inserted into every registered path
///
/// Several logical devices may share one credential; the prefix keeps their
/// paths apart on the server. `Wtemp` on a device with prefix `l` becomes
/// `Wltemp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DevicePrefix(char);

impl DevicePrefix {
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self(prefix)
    }

    #[must_use]
    pub const fn as_char(&self) -> char {
        self.0
    }

    /// Insert the prefix after the first character of `path`
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidPath`] for an empty path.
    pub fn apply(&self, path: &str) -> Result<String, DomainError> {
        let mut chars = path.chars();
        let first = chars
            .next()
            .ok_or_else(|| DomainError::InvalidPath("path must not be empty".to_string()))?;

        let mut prefixed = String::with_capacity(path.len() + self.0.len_utf8());
        prefixed.push(first);
        prefixed.push(self.0);
        prefixed.push_str(chars.as_str());
        Ok(prefixed)
    }

    /// Remove the prefix from a prefixed path, if it carries this prefix
    pub fn strip(&self, prefixed: &str) -> Option<String> {
        let mut chars = prefixed.chars();
        let first = chars.next()?;
        let rest = chars.as_str().strip_prefix(self.0)?;

        let mut path = String::with_capacity(prefixed.len());
        path.push(first);
        path.push_str(rest);
        Some(path)
    }
}

impl Default for DevicePrefix {
    fn default() -> Self {
        Self('l')
    }
}

impl Display for DevicePrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DevicePrefix {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Self(c)),
            _ => Err(DomainError::InvalidPrefix(s.to_string())),
        }
    }
}

impl TryFrom<String> for DevicePrefix {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DevicePrefix> for String {
    fn from(prefix: DevicePrefix) -> Self {
        prefix.0.to_string()
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Device identity presented to the remote service
///
/// Opaque to the core: it is only forwarded with every remote call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub device_id: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(device_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("device_id", &self.device_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}
