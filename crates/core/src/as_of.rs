//! Temporal dimensions
//!
//! A dated record carries one `[from, to)` interval per as-of attribute,
//! typically business time and processing time. `AsOfAttribute` knows
//! which columns hold the bounds and how a point in time matches them.
//!
//! ## Matching rules
//!
//! - An as-of date of `INFINITY` asks for the current segment: it matches
//!   only intervals whose `to` is `INFINITY`.
//! - Otherwise the interval is half-open: `from <= as_of < to`.
//! - With `to_is_inclusive` the interval is `(from, to]` instead.
//!
//! As an [`Extractor`], the attribute's value on a stored record is its
//! `from` bound. Probes carry their as-of date in the `from` column, and
//! `probe_matches` tests that date against the stored interval.

use crate::error::{CacheError, Result};
use crate::extractor::Extractor;
use crate::record::Record;
use crate::timestamp::Timestamp;
use crate::value::Value;

/// One temporal dimension of a dated record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsOfAttribute {
    name: String,
    from_column: usize,
    to_column: usize,
    to_is_inclusive: bool,
}

impl AsOfAttribute {
    /// Half-open dimension reading `[from_column, to_column)`
    pub fn new(name: impl Into<String>, from_column: usize, to_column: usize) -> Self {
        Self {
            name: name.into(),
            from_column,
            to_column,
            to_is_inclusive: false,
        }
    }

    /// Treat the upper bound as inclusive: `(from, to]`
    pub fn with_inclusive_to(mut self) -> Self {
        self.to_is_inclusive = true;
        self
    }

    /// Attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column holding the lower bound
    pub fn from_column(&self) -> usize {
        self.from_column
    }

    /// Column holding the upper bound
    pub fn to_column(&self) -> usize {
        self.to_column
    }

    /// Whether the upper bound is inclusive
    pub fn to_is_inclusive(&self) -> bool {
        self.to_is_inclusive
    }

    /// Lower bound stored in `record`
    #[inline]
    pub fn from_of(&self, record: &Record) -> Option<Timestamp> {
        record.timestamp(self.from_column)
    }

    /// Upper bound stored in `record`
    #[inline]
    pub fn to_of(&self, record: &Record) -> Option<Timestamp> {
        record.timestamp(self.to_column)
    }

    /// Both bounds, if both columns hold timestamps
    pub fn interval_of(&self, record: &Record) -> Option<(Timestamp, Timestamp)> {
        Some((self.from_of(record)?, self.to_of(record)?))
    }

    /// Bounds of `record`, rejecting missing or empty intervals
    ///
    /// # Errors
    ///
    /// [`CacheError::MissingAsOfValue`] when either bound is absent and
    /// [`CacheError::InvalidInterval`] when `from >= to`.
    pub fn validate_interval(&self, record: &Record) -> Result<(Timestamp, Timestamp)> {
        let (from, to) = self
            .interval_of(record)
            .ok_or_else(|| CacheError::MissingAsOfValue(self.name.clone()))?;
        if from >= to {
            return Err(CacheError::InvalidInterval {
                attribute: self.name.clone(),
                from,
                to,
            });
        }
        Ok((from, to))
    }

    /// Whether the interval stored in `record` contains `as_of`
    pub fn data_matches(&self, record: &Record, as_of: Timestamp) -> bool {
        let Some((from, to)) = self.interval_of(record) else {
            return false;
        };
        if as_of.is_infinity() {
            return to.is_infinity();
        }
        if self.to_is_inclusive {
            from < as_of && as_of <= to
        } else {
            from <= as_of && as_of < to
        }
    }

    /// Whether the interval stored in `record` overlaps `[start, end)`
    pub fn has_range_overlap(&self, record: &Record, start: Timestamp, end: Timestamp) -> bool {
        match self.interval_of(record) {
            Some((from, to)) => !(end <= from || start >= to),
            None => false,
        }
    }

    /// Whether the intervals stored in two records overlap
    pub fn intervals_overlap(&self, a: &Record, b: &Record) -> bool {
        match self.interval_of(b) {
            Some((start, end)) => self.has_range_overlap(a, start, end),
            None => false,
        }
    }
}

impl Extractor for AsOfAttribute {
    fn attribute_name(&self) -> &str {
        &self.name
    }

    fn value_of<'a>(&self, record: &'a Record) -> &'a Value {
        record.get(self.from_column)
    }

    fn probe_matches(&self, stored: &Record, probe: &Record) -> bool {
        match self.from_of(probe) {
            Some(as_of) => self.data_matches(stored, as_of),
            None => false,
        }
    }

    fn as_of_attribute(&self) -> Option<&AsOfAttribute> {
        Some(self)
    }
}
