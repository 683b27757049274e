//! Bitemp - in-memory bitemporal object cache
//!
//! Caches business objects keyed by primary key, or by a non-temporal key
//! plus one or two as-of dimensions (business time, processing time).
//!
//! # Quick Start
//!
//! ```
//! use bitemp::{attribute, AsOfAttribute, DatedCache, Record, Timestamp, Value};
//!
//! // [id, businessFrom, businessTo, processingFrom, processingTo]
//! let cache = DatedCache::full(
//!     vec![attribute("id", 0)],
//!     vec![
//!         AsOfAttribute::new("businessDate", 1, 2),
//!         AsOfAttribute::new("processingDate", 3, 4),
//!     ],
//! )?;
//!
//! let segment = Record::new(vec![
//!     Value::Int(1),
//!     Value::Timestamp(Timestamp::parse("2024-01-01 00:00:00")?),
//!     Value::Timestamp(Timestamp::INFINITY),
//!     Value::Timestamp(Timestamp::EPOCH),
//!     Value::Timestamp(Timestamp::INFINITY),
//! ]);
//! let object = cache.get_object_from_data(segment.clone(), None)?;
//!
//! let as_of = [Timestamp::parse("2024-06-01 00:00:00")?, Timestamp::INFINITY];
//! let found = cache.get_semi_unique_from_data(&segment, &as_of)?;
//! assert!(std::sync::Arc::ptr_eq(&object, &found.unwrap()));
//! # Ok::<(), bitemp::CacheError>(())
//! ```
//!
//! # Architecture
//!
//! - `bitemp-core`: values, records, extractors, as-of attributes, errors
//! - `bitemp-cache`: indexes, the two cache kinds, TTL and configuration

pub use bitemp_cache::*;
pub use bitemp_core::*;
