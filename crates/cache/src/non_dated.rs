//! Non-dated object cache
//!
//! One business object per primary key. Secondary indexes, unique or not,
//! can be registered at any time and are kept consistent with the primary
//! index under one lock.
//!
//! A cache built with [`NonDatedCache::partial`] expires entries after the
//! configured time-to-live. Expired entries are invisible to every read
//! and are evicted from all indexes once a read has noticed them.
//!
//! ## Locking
//!
//! `get_object_from_data` resolves hits under the shared lock. A miss takes
//! the upgradable lock, checks again, and only then upgrades to insert, so
//! concurrent callers for the same key all receive the one winning object.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::sync::Arc;
use tracing::{debug, trace};

use bitemp_core::{
    join_names, CacheError, ExtractorRef, Filter, Record, RelationshipHashStrategy, Result,
    Timestamp,
};

use crate::business_object::{BusinessObject, CacheEntry};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::index::registry::IndexSet;
use crate::index::{CacheIndex, IndexEntry, IndexRef, NonUniqueIndex, UniqueIndex};
use crate::ttl::{Access, TtlPolicy};

type Indexes = IndexSet<CacheEntry, UniqueIndex<CacheEntry>>;

/// Cache of non-temporal business objects
pub struct NonDatedCache {
    ttl: TtlPolicy,
    clock: Arc<dyn Clock>,
    indexes: RwLock<Indexes>,
}

impl NonDatedCache {
    /// Cache that never expires anything
    pub fn full(primary_key: Vec<ExtractorRef>) -> Result<Self> {
        Self::with_config(primary_key, CacheConfig::default(), Arc::new(SystemClock))
    }

    /// Cache that expires entries per `config`
    pub fn partial(
        primary_key: Vec<ExtractorRef>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_config(primary_key, config, clock)
    }

    /// Cache described by `config`
    pub fn with_config(
        primary_key: Vec<ExtractorRef>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let primary =
            UniqueIndex::with_capacity("primaryKey", primary_key, config.initial_capacity)?;
        debug!(
            target: "bitemp::cache",
            key = %primary.key().attribute_names(),
            partial = config.is_partial(),
            "Created non-dated cache"
        );
        Ok(Self {
            ttl: TtlPolicy::from_config(&config),
            clock,
            indexes: RwLock::new(IndexSet::new(primary)),
        })
    }

    /// Expiry policy in force
    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl
    }

    // =========================================================================
    // Index registration
    // =========================================================================

    /// Register a unique secondary index
    ///
    /// Resident entries are indexed immediately. If two of them share a
    /// key, nothing is registered.
    pub fn add_unique_index(
        &self,
        name: impl Into<String>,
        extractors: Vec<ExtractorRef>,
    ) -> Result<IndexRef> {
        let index = UniqueIndex::new(name, extractors)?;
        self.register(Box::new(index))
    }

    /// Register a non-unique secondary index
    pub fn add_index(
        &self,
        name: impl Into<String>,
        extractors: Vec<ExtractorRef>,
    ) -> Result<IndexRef> {
        let index = NonUniqueIndex::new(name, extractors)?;
        self.register(Box::new(index))
    }

    fn register(&self, index: Box<dyn CacheIndex<CacheEntry>>) -> Result<IndexRef> {
        let name = index.name().to_string();
        let unique = index.is_unique();
        let mut indexes = self.indexes.write();
        let index_ref = indexes.register(index)?;
        debug!(
            target: "bitemp::cache",
            index = %name,
            index_ref = %index_ref,
            unique,
            entries = indexes.len(),
            "Registered index"
        );
        Ok(index_ref)
    }

    /// Best index for a lookup on `extractors`
    pub fn get_best_index_reference(&self, extractors: &[ExtractorRef]) -> Option<IndexRef> {
        self.indexes.read().best_for(extractors, false)
    }

    // =========================================================================
    // Identity and writes
    // =========================================================================

    /// The resident object for `record`'s primary key, inserting one if absent
    ///
    /// A resident object is returned as is; its data is not replaced.
    pub fn get_object_from_data(
        &self,
        record: impl Into<Arc<Record>>,
    ) -> Result<Arc<BusinessObject>> {
        let data = record.into();
        let now = self.clock.now();

        if let Some(hit) = self.live_primary(&self.indexes.read(), &data, now) {
            hit.touch(now);
            return Ok(hit);
        }

        let indexes = self.indexes.upgradable_read();
        if let Some(hit) = self.live_primary(&indexes, &data, now) {
            hit.touch(now);
            return Ok(hit);
        }
        let mut indexes = RwLockUpgradableReadGuard::upgrade(indexes);
        self.evict_primary(&mut indexes, &data, now);
        let entry = CacheEntry::new(data, now);
        indexes.insert(entry.clone())?;
        Ok(entry.into_object())
    }

    /// Insert `record`, or refresh the resident object with its values
    ///
    /// A refresh re-indexes the object in every index. If the new values
    /// would break a unique index, the object keeps its old data.
    pub fn put(&self, record: impl Into<Arc<Record>>) -> Result<Arc<BusinessObject>> {
        let data = record.into();
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        self.evict_primary(&mut indexes, &data, now);

        match indexes.primary().get(&data).cloned() {
            Some(existing) => {
                indexes.replace(&existing, existing.with_data(Arc::clone(&data)))?;
                let object = existing.into_object();
                object.set_data(data);
                object.touch(now);
                Ok(object)
            }
            None => {
                let entry = CacheEntry::new(data, now);
                indexes.insert(entry.clone())?;
                Ok(entry.into_object())
            }
        }
    }

    fn live_primary(
        &self,
        indexes: &Indexes,
        data: &Record,
        now: Timestamp,
    ) -> Option<Arc<BusinessObject>> {
        indexes
            .primary()
            .get(data)
            .filter(|e| !self.ttl.entry_expired(e, now, Access::Direct))
            .map(|e| Arc::clone(e.object()))
    }

    fn evict_primary(&self, indexes: &mut Indexes, data: &Record, now: Timestamp) {
        if let Some(stale) = indexes.primary().get(data).cloned() {
            self.ttl.evict(indexes, &[stale], now);
        }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Objects matching `probe` on every extractor in `extractors`
    ///
    /// When `index_ref` does not cover the extractors the whole cache is
    /// scanned, unless `force_evaluate` is set, which makes the mismatch an
    /// error instead.
    pub fn get(
        &self,
        index_ref: IndexRef,
        probe: &Record,
        extractors: &[ExtractorRef],
        force_evaluate: bool,
    ) -> Result<Vec<Arc<BusinessObject>>> {
        let found = self
            .indexes
            .read()
            .query(index_ref, probe, extractors, force_evaluate)?;
        Ok(self.visible(found, Access::Direct))
    }

    /// The single object matching `probe` through the best unique index
    pub fn get_as_one(
        &self,
        probe: &Record,
        extractors: &[ExtractorRef],
    ) -> Result<Option<Arc<BusinessObject>>> {
        let found = {
            let indexes = self.indexes.read();
            let index_ref = indexes
                .best_for(extractors, true)
                .ok_or_else(|| CacheError::NoMatchingIndex(join_names(extractors)))?;
            indexes.query(index_ref, probe, extractors, false)?
        };
        Ok(self.visible(found, Access::Direct).into_iter().next())
    }

    /// The object on the far side of a relationship
    ///
    /// Hashes straight from `source_data` without building a probe record.
    /// Expiry uses the relationship window.
    pub fn get_as_one_from_related<S: ?Sized>(
        &self,
        index_ref: IndexRef,
        source: &S,
        source_data: &Record,
        strategy: &dyn RelationshipHashStrategy<S>,
    ) -> Result<Option<Arc<BusinessObject>>> {
        let hash = strategy.hash_from_related(source, source_data);
        let mut bucket = Vec::new();
        self.indexes.read().resolve(index_ref)?.lookup_hash(hash, &mut bucket);
        bucket.retain(|e| {
            strategy.equals_for_relationship(
                source,
                source_data,
                e.record(),
                Timestamp::INFINITY,
                Timestamp::INFINITY,
            )
        });
        Ok(self.visible(bucket, Access::Relationship).into_iter().next())
    }

    /// Whether [`get`](Self::get) without forcing would find anything
    pub fn contains(
        &self,
        index_ref: IndexRef,
        probe: &Record,
        extractors: &[ExtractorRef],
    ) -> Result<bool> {
        Ok(!self.get(index_ref, probe, extractors, false)?.is_empty())
    }

    /// Objects with a null key attribute in a non-unique index
    pub fn get_nulls(&self, index_ref: IndexRef) -> Result<Vec<Arc<BusinessObject>>> {
        let found = self.indexes.read().nulls(index_ref)?;
        Ok(self.visible(found, Access::Direct))
    }

    /// Every live object
    pub fn get_all(&self) -> Vec<Arc<BusinessObject>> {
        let mut all = Vec::new();
        self.indexes.read().for_each(&mut |e| all.push(e.clone()));
        self.visible(all, Access::Direct)
    }

    /// Resident entries, including expired ones not yet evicted
    pub fn size(&self) -> usize {
        self.indexes.read().len()
    }

    /// Live entries of `found`; evicts the expired ones after the read lock is gone
    fn visible(&self, found: Vec<CacheEntry>, access: Access) -> Vec<Arc<BusinessObject>> {
        let now = self.clock.now();
        let (live, expired) = self.ttl.split_live(found, now, access);
        if !expired.is_empty() {
            self.ttl.evict(&mut self.indexes.write(), &expired, now);
        }
        live.into_iter().map(CacheEntry::into_object).collect()
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove the object with `record`'s primary key
    ///
    /// Returns `None` when nothing live was removed.
    pub fn remove(&self, record: &Record) -> Option<Arc<BusinessObject>> {
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let entry = indexes.primary().get(record).cloned()?;
        indexes.remove(&entry);
        trace!(target: "bitemp::cache", "Removed entry");
        (!self.ttl.entry_expired(&entry, now, Access::Direct)).then(|| entry.into_object())
    }

    /// Remove every object whose data `filter` selects
    pub fn remove_all(&self, filter: &dyn Filter) -> Vec<Arc<BusinessObject>> {
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let mut selected = Vec::new();
        indexes.for_each(&mut |e| {
            if filter.matches(e.record()) {
                selected.push(e.clone());
            }
        });
        for entry in &selected {
            indexes.remove(entry);
        }
        trace!(target: "bitemp::cache", removed = selected.len(), "Removed matching entries");
        selected
            .into_iter()
            .filter(|e| !self.ttl.entry_expired(e, now, Access::Direct))
            .map(CacheEntry::into_object)
            .collect()
    }

    /// Evict every expired entry now rather than on the next read
    pub fn evict_expired(&self) -> usize {
        if !self.ttl.is_enabled() {
            return 0;
        }
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let mut expired = Vec::new();
        indexes.for_each(&mut |e| {
            if self.ttl.entry_expired(e, now, Access::Direct) {
                expired.push(e.clone());
            }
        });
        self.ttl.evict(&mut indexes, &expired, now)
    }

    /// Drop every entry; registered indexes stay registered
    pub fn clear(&self) {
        let mut indexes = self.indexes.write();
        let dropped = indexes.len();
        indexes.clear();
        debug!(target: "bitemp::cache", dropped, "Cleared non-dated cache");
    }
}

impl std::fmt::Debug for NonDatedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indexes = self.indexes.read();
        f.debug_struct("NonDatedCache")
            .field("ttl", &self.ttl)
            .field("size", &indexes.len())
            .field("indexes", &indexes.index_count())
            .finish()
    }
}
