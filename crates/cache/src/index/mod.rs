//! Index structures
//!
//! Three kinds of index share one capability trait:
//! - UniqueIndex: at most one entry per key
//! - NonUniqueIndex: any number of entries per key, nulls tracked
//! - SemiUniqueDatedIndex: many temporal segments per non-temporal key,
//!   never overlapping on every dimension at once
//!
//! Tables are `FxHashMap`s keyed by the compound extractor hash. A bucket
//! holds every entry whose key hashes there, so equal hashes from distinct
//! keys are resolved by extractor equality on every lookup.

pub mod non_unique;
pub mod registry;
pub mod semi_unique;
pub mod unique;

use std::sync::Arc;

use bitemp_core::{CacheError, ExtractorHashStrategy, Record, Result};

pub use non_unique::NonUniqueIndex;
pub use registry::IndexRef;
pub use semi_unique::SemiUniqueDatedIndex;
pub use unique::UniqueIndex;

/// Something an index can hold
///
/// Entries are cheap handles. Identity decides which stored entry a
/// removal targets; the record decides where the entry is hashed.
pub trait IndexEntry: Clone + Send + Sync + 'static {
    /// Snapshot the entry is indexed under
    fn record(&self) -> &Record;

    /// Whether two handles denote the same stored entry
    fn same_identity(&self, other: &Self) -> bool;
}

impl IndexEntry for Arc<Record> {
    #[inline]
    fn record(&self) -> &Record {
        self
    }

    #[inline]
    fn same_identity(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

/// Operations every index kind supports
///
/// Mutations through this trait are split in two: `check_insert` reports
/// whether an insert would break the index's invariant without touching
/// it, and `insert` applies an entry that has been checked. Callers that
/// maintain several indexes check all of them before inserting into any.
pub trait CacheIndex<E: IndexEntry>: Send + Sync {
    /// Registered name
    fn name(&self) -> &str;

    /// Key extractors that drive hashing
    fn key(&self) -> &ExtractorHashStrategy;

    /// Whether a key maps to at most one live entry
    fn is_unique(&self) -> bool;

    /// Number of entries held
    fn len(&self) -> usize;

    /// Whether the index holds nothing
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `entry` could be inserted without violating the index
    fn check_insert(&self, entry: &E) -> Result<()>;

    /// Insert an entry that passed `check_insert`
    fn insert(&mut self, entry: E);

    /// Remove the stored entry with the same identity as `entry`
    fn remove_entry(&mut self, entry: &E) -> bool;

    /// Entries whose key equals the probe's
    fn lookup(&self, probe: &Record, out: &mut Vec<E>);

    /// Every entry stored under a key hash, equal keys or not
    fn lookup_hash(&self, hash: u64, out: &mut Vec<E>);

    /// Entries with a null key attribute
    fn nulls(&self, _out: &mut Vec<E>) -> Result<()> {
        Err(CacheError::NullsNotSupported(self.name().to_string()))
    }

    /// Visit every entry
    fn for_each(&self, f: &mut dyn FnMut(&E));

    /// Drop every entry
    fn clear(&mut self);
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use bitemp_core::{attribute, ExtractorRef, Value};

    pub fn row(id: i64, group: &str) -> Arc<Record> {
        Arc::new(Record::new(vec![Value::Int(id), Value::from(group)]))
    }

    pub fn id_key() -> Vec<ExtractorRef> {
        vec![attribute("id", 0)]
    }

    pub fn group_key() -> Vec<ExtractorRef> {
        vec![attribute("group", 1)]
    }
}
