//! In-memory bitemporal object caches
//!
//! This crate provides:
//! - NonDatedCache: one business object per primary key
//! - DatedCache: temporal segments per non-temporal key, one or two
//!   as-of dimensions
//! - Unique, non-unique and semi-unique dated indexes usable on their own
//! - TTL expiry driven by an injectable clock
//!
//! Each cache guards all of its indexes with one `parking_lot::RwLock`, so
//! every mutation is atomic across indexes and readers always see a
//! consistent state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod business_object;
pub mod clock;
pub mod config;
pub mod dated;
pub mod index;
pub mod non_dated;
pub mod ttl;

pub use business_object::{BusinessObject, CacheEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use dated::DatedCache;
pub use index::{CacheIndex, IndexEntry, IndexRef, NonUniqueIndex, SemiUniqueDatedIndex, UniqueIndex};
pub use non_dated::NonDatedCache;
pub use ttl::{Access, TtlPolicy};
