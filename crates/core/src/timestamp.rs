//! Microsecond-precision timestamp with an open-ended sentinel
//!
//! Both temporal dimensions (business time and processing time) and the
//! cache clock use this type.
//!
//! ## Precision
//!
//! Timestamps are stored as microseconds since Unix epoch (1970-01-01 00:00:00 UTC).
//!
//! ## Infinity
//!
//! `Timestamp::INFINITY` marks an interval that is still open ("current").
//! It is the largest representable instant, so ordinary comparisons keep
//! working and `saturating_add` never runs past it.
//!
//! ```
//! use bitemp_core::Timestamp;
//!
//! let from = Timestamp::parse("2002-01-01 00:00:00").unwrap();
//! assert!(from < Timestamp::INFINITY);
//! assert!(Timestamp::INFINITY.is_infinity());
//! ```

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, Result};

/// Text layout accepted by [`Timestamp::parse`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Microsecond-precision timestamp
///
/// ## Invariants
///
/// - Timestamps are always non-negative (u64)
/// - Timestamps are always in microseconds
/// - `INFINITY` compares greater than every finite timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Open-ended sentinel for the `to` bound of a current interval
    pub const INFINITY: Timestamp = Timestamp(u64::MAX);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp for the current moment
    ///
    /// Returns epoch (0) if system clock is before Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
    }

    /// Create a timestamp from microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Parse `"YYYY-MM-DD HH:MM:SS"` as a UTC instant
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidTimestamp`] when the text does not match
    /// [`TIMESTAMP_FORMAT`] or lies before the epoch.
    pub fn parse(text: &str) -> Result<Self> {
        let parsed = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
            .map_err(|e| CacheError::InvalidTimestamp(format!("'{}': {}", text, e)))?;
        let micros = parsed.and_utc().timestamp_micros();
        u64::try_from(micros)
            .map(Timestamp)
            .map_err(|_| CacheError::InvalidTimestamp(format!("'{}' is before the epoch", text)))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get microseconds since Unix epoch
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Whether this is the open-ended sentinel
    #[inline]
    pub const fn is_infinity(&self) -> bool {
        self.0 == u64::MAX
    }

    // =========================================================================
    // Duration Operations
    // =========================================================================

    /// Add a duration to this timestamp
    ///
    /// Saturates at `Timestamp::INFINITY` on overflow, including durations
    /// too long to count in `u64` microseconds.
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_infinity() {
            return f.write_str("infinity");
        }
        match i64::try_from(self.0)
            .ok()
            .and_then(DateTime::from_timestamp_micros)
        {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.6f")),
            None => write!(f, "{}us", self.0),
        }
    }
}
