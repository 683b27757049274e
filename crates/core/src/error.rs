//! Error types for the bitemporal cache
//!
//! Misses are never errors: lookups return `None`, empty lists or `false`.
//! Everything here is either a configuration fault (the caller wired the
//! cache up wrongly) or an invariant violation (the caller asked for a
//! mutation that would corrupt the indexes). A rejected mutation leaves the
//! cache exactly as it was.

use thiserror::Error;

use crate::timestamp::Timestamp;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error types for the bitemporal cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Lookup against an index reference that was never registered
    #[error("Unknown index reference: {0}")]
    UnknownIndexReference(u32),

    /// An index with this name is already registered
    #[error("Duplicate index name: {0}")]
    DuplicateIndexName(String),

    /// Index or key definition without any extractor
    #[error("Index '{0}' needs at least one extractor")]
    EmptyExtractorList(String),

    /// No unique index covers the requested attribute set
    #[error("No unique index matches attributes [{0}]")]
    NoMatchingIndex(String),

    /// The index does not cover the filter and evaluation was forced
    #[error("Index '{index}' does not cover the filter [{attributes}]")]
    IndexNotApplicable {
        /// Name of the index that was asked
        index: String,
        /// Attribute names in the requested filter
        attributes: String,
    },

    /// Null lookups are only kept by non-unique indexes
    #[error("Index '{0}' is unique and does not track nulls")]
    NullsNotSupported(String),

    /// Wrong number of temporal dimensions or probe dates
    #[error("Expected {expected} as-of dimension(s), got {actual}")]
    AsOfDimensionCount {
        /// Dimensions configured on the cache
        expected: usize,
        /// Dimensions supplied by the caller
        actual: usize,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timestamp text could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A new segment overlaps a resident segment of the same non-temporal key
    #[error("Segment overlaps a resident segment for the same key in index '{index}'")]
    OverlappingSegment {
        /// Index that detected the overlap
        index: String,
    },

    /// A unique index already holds a different entry with the same key
    #[error("Duplicate key in unique index '{index}'")]
    DuplicateUniqueKey {
        /// Name of the unique index
        index: String,
    },

    /// An interval with `from >= to`
    #[error("Invalid interval on '{attribute}': from {from} is not before to {to}")]
    InvalidInterval {
        /// As-of attribute name
        attribute: String,
        /// Lower bound
        from: Timestamp,
        /// Upper bound
        to: Timestamp,
    },

    /// A dated record lacks a timestamp bound for this as-of attribute
    #[error("Missing timestamp bound for as-of attribute '{0}'")]
    MissingAsOfValue(String),

    /// A segment state transition that is not allowed
    #[error("Invalid segment transition: {0}")]
    InvalidTransition(String),

    /// The segment to transition is not resident
    #[error("Segment not found")]
    SegmentNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_unknown_index() {
        let err = CacheError::UnknownIndexReference(7);
        let msg = err.to_string();
        assert!(msg.contains("Unknown index reference"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_error_display_invalid_interval() {
        let err = CacheError::InvalidInterval {
            attribute: "businessDate".to_string(),
            from: Timestamp::from_secs(20),
            to: Timestamp::from_secs(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("businessDate"));
        assert!(msg.contains("not before"));
    }

    #[test]
    fn test_error_display_dimension_count() {
        let err = CacheError::AsOfDimensionCount {
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "Expected 2 as-of dimension(s), got 1");
    }

    #[test]
    fn test_error_pattern_matching() {
        let err = CacheError::DuplicateUniqueKey {
            index: "byAccount".to_string(),
        };
        match err {
            CacheError::DuplicateUniqueKey { index } => assert_eq!(index, "byAccount"),
            _ => panic!("Wrong error variant"),
        }
    }
}
