//! Core types for the bitemporal cache
//!
//! This crate defines the vocabulary shared by every index and cache:
//! - Timestamp: Microsecond instant with an `INFINITY` sentinel
//! - Value / Record: Attribute values and positional record snapshots
//! - Extractor: Accessors that read, hash and compare one attribute
//! - AsOfAttribute: A temporal dimension and its matching rules
//! - ExtractorHashStrategy: Compound-key hashing over extractor lists
//! - Filter: Predicates for bulk removal, including retained-dates pruning
//! - RelationshipHashStrategy: Probe-free lookups from a related object
//! - CacheError: Error type shared by all crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod as_of;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod hash_strategy;
pub mod record;
pub mod relationship;
pub mod timestamp;
pub mod value;

pub use as_of::AsOfAttribute;
pub use error::{CacheError, Result};
pub use extractor::{attribute, AttributeExtractor, Extractor, ExtractorRef, ShiftedHashExtractor};
pub use filter::{Filter, RetainDatesFilter};
pub use hash_strategy::{combine_hash, join_names, ExtractorHashStrategy};
pub use record::Record;
pub use relationship::{RelatedAttributes, RelationshipHashStrategy};
pub use timestamp::{Timestamp, TIMESTAMP_FORMAT};
pub use value::Value;
