//! Cache-resident identity wrappers
//!
//! Callers hold `Arc<BusinessObject>`; two lookups of the same resident
//! entity return the same allocation (`Arc::ptr_eq`). The wrapper keeps
//! the current data snapshot and the instant it was last written, which
//! drives TTL expiry.
//!
//! Indexes never store the wrapper alone. They store a [`CacheEntry`]
//! pairing the wrapper with the exact snapshot it was indexed under, so an
//! index can always re-hash the entry it holds even after the wrapper has
//! been refreshed.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitemp_core::{Record, Timestamp};

use crate::index::IndexEntry;

/// Identity wrapper handed out by the caches
pub struct BusinessObject {
    data: RwLock<Arc<Record>>,
    cached_at: AtomicU64,
}

impl BusinessObject {
    pub(crate) fn new(data: Arc<Record>, now: Timestamp) -> Self {
        Self {
            data: RwLock::new(data),
            cached_at: AtomicU64::new(now.as_micros()),
        }
    }

    /// Current data snapshot
    pub fn data(&self) -> Arc<Record> {
        Arc::clone(&self.data.read())
    }

    /// When this object was last written to the cache
    pub fn cached_at(&self) -> Timestamp {
        Timestamp::from_micros(self.cached_at.load(Ordering::Acquire))
    }

    pub(crate) fn touch(&self, now: Timestamp) {
        self.cached_at.store(now.as_micros(), Ordering::Release);
    }

    pub(crate) fn set_data(&self, data: Arc<Record>) {
        *self.data.write() = data;
    }
}

impl fmt::Debug for BusinessObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusinessObject")
            .field("data", &*self.data.read())
            .field("cached_at", &self.cached_at())
            .finish()
    }
}

/// An identity wrapper together with the snapshot it is indexed under
#[derive(Debug, Clone)]
pub struct CacheEntry {
    data: Arc<Record>,
    object: Arc<BusinessObject>,
}

impl CacheEntry {
    pub(crate) fn new(data: Arc<Record>, now: Timestamp) -> Self {
        let object = Arc::new(BusinessObject::new(Arc::clone(&data), now));
        Self { data, object }
    }

    /// Same wrapper, new snapshot
    pub(crate) fn with_data(&self, data: Arc<Record>) -> Self {
        Self {
            data,
            object: Arc::clone(&self.object),
        }
    }

    /// Indexed snapshot
    pub fn data(&self) -> &Arc<Record> {
        &self.data
    }

    /// Identity wrapper
    pub fn object(&self) -> &Arc<BusinessObject> {
        &self.object
    }

    pub(crate) fn into_object(self) -> Arc<BusinessObject> {
        self.object
    }
}

impl IndexEntry for CacheEntry {
    #[inline]
    fn record(&self) -> &Record {
        &self.data
    }

    #[inline]
    fn same_identity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.object, &other.object)
    }
}
