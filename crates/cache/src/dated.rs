//! Dated object cache
//!
//! Caches the temporal history of business objects. The primary index is a
//! [`SemiUniqueDatedIndex`]: each non-temporal key owns any number of
//! segments, one business object per segment, and no two segments of a key
//! overlap on every as-of dimension at once.
//!
//! Secondary indexes are keyed on the non-temporal attributes only. Any
//! as-of attribute passed to a lookup is evaluated as containment ("the
//! probe's date falls inside the segment"), never as literal equality.
//!
//! Segment transitions ([`shrink_segment`](DatedCache::shrink_segment),
//! [`terminate`](DatedCache::terminate), [`split`](DatedCache::split)) are
//! validated up front and applied across every index under one write lock.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use std::sync::Arc;
use tracing::{debug, trace};

use bitemp_core::{
    join_names, AsOfAttribute, CacheError, ExtractorRef, Filter, Record,
    RelationshipHashStrategy, Result, Timestamp,
};

use crate::business_object::{BusinessObject, CacheEntry};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::index::registry::IndexSet;
use crate::index::{CacheIndex, IndexEntry, IndexRef, NonUniqueIndex, SemiUniqueDatedIndex};
use crate::ttl::{Access, TtlPolicy};

type Indexes = IndexSet<CacheEntry, SemiUniqueDatedIndex<CacheEntry>>;

/// Cache of temporal segments
pub struct DatedCache {
    as_of: Vec<AsOfAttribute>,
    ttl: TtlPolicy,
    clock: Arc<dyn Clock>,
    indexes: RwLock<Indexes>,
}

impl DatedCache {
    /// Cache that never expires anything
    ///
    /// `primary_key` holds the non-temporal key attributes; `as_of` holds
    /// one or two dimensions, business time first.
    pub fn full(primary_key: Vec<ExtractorRef>, as_of: Vec<AsOfAttribute>) -> Result<Self> {
        Self::with_config(
            primary_key,
            as_of,
            CacheConfig::default(),
            Arc::new(SystemClock),
        )
    }

    /// Cache that expires segments per `config`
    pub fn partial(
        primary_key: Vec<ExtractorRef>,
        as_of: Vec<AsOfAttribute>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_config(primary_key, as_of, config, clock)
    }

    /// Cache described by `config`
    pub fn with_config(
        primary_key: Vec<ExtractorRef>,
        as_of: Vec<AsOfAttribute>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let (non_temporal, _) = split_temporal(primary_key);
        let primary = SemiUniqueDatedIndex::with_capacity(
            "primaryKey",
            non_temporal,
            as_of.clone(),
            config.initial_capacity,
        )?;
        debug!(
            target: "bitemp::cache",
            key = %primary.non_temporal_strategy().attribute_names(),
            dimensions = as_of.len(),
            partial = config.is_partial(),
            "Created dated cache"
        );
        Ok(Self {
            as_of,
            ttl: TtlPolicy::from_config(&config),
            clock,
            indexes: RwLock::new(IndexSet::new(primary)),
        })
    }

    /// Temporal dimensions, business time first
    pub fn as_of_attributes(&self) -> &[AsOfAttribute] {
        &self.as_of
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
    /// Unique per point in time: segments sharing the key must not overlap
    /// on every dimension. As-of attributes among `extractors` are ignored.
    pub fn add_unique_index(
        &self,
        name: impl Into<String>,
        extractors: Vec<ExtractorRef>,
    ) -> Result<IndexRef> {
        let (non_temporal, _) = split_temporal(extractors);
        let index = SemiUniqueDatedIndex::new(name, non_temporal, self.as_of.clone())?;
        self.register(Box::new(index))
    }

    /// Register a non-unique secondary index
    pub fn add_index(
        &self,
        name: impl Into<String>,
        extractors: Vec<ExtractorRef>,
    ) -> Result<IndexRef> {
        let (non_temporal, _) = split_temporal(extractors);
        let index = NonUniqueIndex::new(name, non_temporal)?;
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
            segments = indexes.len(),
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

    /// The resident segment object for `record`, inserting one if absent
    ///
    /// The exact segment (same key, same `from` bounds) wins. Otherwise,
    /// when `as_of` dates are given, the segment valid at those dates.
    /// Otherwise `record` becomes a new segment, provided it overlaps none.
    pub fn get_object_from_data(
        &self,
        record: impl Into<Arc<Record>>,
        as_of: Option<&[Timestamp]>,
    ) -> Result<Arc<BusinessObject>> {
        let data = record.into();
        if let Some(dates) = as_of {
            self.check_dates(dates)?;
        }
        let now = self.clock.now();

        if let Some(hit) = self.resident(&self.indexes.read(), &data, as_of, now) {
            hit.touch(now);
            return Ok(hit);
        }

        let indexes = self.indexes.upgradable_read();
        if let Some(hit) = self.resident(&indexes, &data, as_of, now) {
            hit.touch(now);
            return Ok(hit);
        }
        let mut indexes = RwLockUpgradableReadGuard::upgrade(indexes);
        self.evict_group(&mut indexes, &data, now);
        let entry = CacheEntry::new(data, now);
        indexes.insert(entry.clone())?;
        Ok(entry.into_object())
    }

    /// Insert `record` as a segment, or refresh the exact resident segment
    pub fn put(&self, record: impl Into<Arc<Record>>) -> Result<Arc<BusinessObject>> {
        let data = record.into();
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        self.evict_group(&mut indexes, &data, now);

        match exact(&indexes, &data) {
            Some(existing) => refresh(&mut indexes, existing, data, now),
            None => {
                let entry = CacheEntry::new(data, now);
                indexes.insert(entry.clone())?;
                Ok(entry.into_object())
            }
        }
    }

    fn check_dates(&self, dates: &[Timestamp]) -> Result<()> {
        if dates.len() != self.as_of.len() {
            return Err(CacheError::AsOfDimensionCount {
                expected: self.as_of.len(),
                actual: dates.len(),
            });
        }
        Ok(())
    }

    fn resident(
        &self,
        indexes: &Indexes,
        data: &Record,
        as_of: Option<&[Timestamp]>,
        now: Timestamp,
    ) -> Option<Arc<BusinessObject>> {
        let live = |e: &&CacheEntry| !self.ttl.entry_expired(e, now, Access::Direct);
        let primary = indexes.primary();
        let hash = primary.non_temporal_hash(data);
        primary
            .get_from_data(data, hash)
            .filter(live)
            .or_else(|| {
                as_of.and_then(|dates| primary.get_semi_unique_from_data(data, dates).filter(live))
            })
            .map(|e| Arc::clone(e.object()))
    }

    /// Evict the expired segments of `data`'s key before a write decides on overlap
    fn evict_group(&self, indexes: &mut Indexes, data: &Record, now: Timestamp) {
        if !self.ttl.is_enabled() {
            return;
        }
        let group = indexes.primary().get_from_data_for_all_dates(data);
        self.ttl.evict(indexes, &group, now);
    }

    // =========================================================================
    // Segment transitions
    // =========================================================================

    /// Move the `to` bound of `record`'s segment on dimension `dim` back to `new_to`
    ///
    /// # Errors
    ///
    /// `SegmentNotFound` when no exact segment is resident, and
    /// `InvalidTransition` unless `from < new_to < to`.
    pub fn shrink_segment(
        &self,
        record: &Record,
        dim: usize,
        new_to: Timestamp,
    ) -> Result<Arc<BusinessObject>> {
        let attr = self.dimension(dim)?;
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let existing = exact(&indexes, record).ok_or(CacheError::SegmentNotFound)?;
        shrink(&mut indexes, existing, attr, new_to, now)
    }

    /// End an open business segment at `at`
    ///
    /// Only a segment whose business `to` is still infinity can be
    /// terminated.
    pub fn terminate(&self, record: &Record, at: Timestamp) -> Result<Arc<BusinessObject>> {
        let business = self.dimension(0)?;
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let existing = exact(&indexes, record).ok_or(CacheError::SegmentNotFound)?;
        if business.to_of(existing.record()) != Some(Timestamp::INFINITY) {
            return Err(CacheError::InvalidTransition(format!(
                "'{}' is already terminated",
                business.name()
            )));
        }
        shrink(&mut indexes, existing, business, at, now)
    }

    /// Split `record`'s segment in business time at `at`
    ///
    /// The resident segment keeps its identity and now ends at `at`; a new
    /// segment `[at, old_to)` with the same values is inserted. Returns
    /// both objects, earlier first.
    pub fn split(
        &self,
        record: &Record,
        at: Timestamp,
    ) -> Result<(Arc<BusinessObject>, Arc<BusinessObject>)> {
        let business = self.dimension(0)?;
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let existing = exact(&indexes, record).ok_or(CacheError::SegmentNotFound)?;
        let (from, to) = business.validate_interval(existing.record())?;
        if at <= from || at >= to {
            return Err(CacheError::InvalidTransition(format!(
                "cannot split [{}, {}) at {}",
                from, to, at
            )));
        }

        let head = existing.with_data(Arc::new(
            existing.record().with_value(business.to_column(), at),
        ));
        let tail = CacheEntry::new(
            Arc::new(existing.record().with_value(business.from_column(), at)),
            now,
        );
        indexes.replace(&existing, head.clone())?;
        if let Err(e) = indexes.insert(tail.clone()) {
            indexes.replace(&head, existing)?;
            return Err(e);
        }

        let object = head.object();
        object.set_data(Arc::clone(head.data()));
        object.touch(now);
        trace!(target: "bitemp::cache", at = %at, "Split segment");
        Ok((Arc::clone(object), tail.into_object()))
    }

    fn dimension(&self, dim: usize) -> Result<&AsOfAttribute> {
        self.as_of.get(dim).ok_or(CacheError::AsOfDimensionCount {
            expected: self.as_of.len(),
            actual: dim.saturating_add(1),
        })
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The exact segment equal to `record`
    pub fn get_from_data(&self, record: &Record) -> Option<Arc<BusinessObject>> {
        let found = exact(&self.indexes.read(), record);
        self.visible(found.into_iter().collect(), Access::Direct)
            .into_iter()
            .next()
    }

    /// Every segment of `record`'s non-temporal key
    pub fn get_from_data_for_all_dates(&self, record: &Record) -> Vec<Arc<BusinessObject>> {
        let found = self
            .indexes
            .read()
            .primary()
            .get_from_data_for_all_dates(record);
        self.visible(found, Access::Direct)
    }

    /// The segment of `record`'s key valid at `as_of`, one date per dimension
    pub fn get_semi_unique_from_data(
        &self,
        record: &Record,
        as_of: &[Timestamp],
    ) -> Result<Option<Arc<BusinessObject>>> {
        self.check_dates(as_of)?;
        let found = self
            .indexes
            .read()
            .primary()
            .get_semi_unique_from_data(record, as_of)
            .cloned();
        Ok(self
            .visible(found.into_iter().collect(), Access::Direct)
            .into_iter()
            .next())
    }

    /// The segment on the far side of a relationship, valid at `as_of_0`/`as_of_1`
    ///
    /// Expiry uses the relationship window.
    pub fn get_semi_unique_as_one<S: ?Sized>(
        &self,
        source: &S,
        source_data: &Record,
        strategy: &dyn RelationshipHashStrategy<S>,
        as_of_0: Timestamp,
        as_of_1: Timestamp,
    ) -> Option<Arc<BusinessObject>> {
        let hash = strategy.hash_from_related(source, source_data);
        let found = self
            .indexes
            .read()
            .primary()
            .get_semi_unique_as_one(source, source_data, strategy, hash, as_of_0, as_of_1)
            .cloned();
        self.visible(found.into_iter().collect(), Access::Relationship)
            .into_iter()
            .next()
    }

    /// Segments matching `probe` on every extractor in `extractors`
    ///
    /// See [`NonDatedCache::get`](crate::NonDatedCache::get) for
    /// `force_evaluate`.
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

    /// The newest segment matching `probe` through the best unique index
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

    /// Whether [`get`](Self::get) without forcing would find anything
    pub fn contains(
        &self,
        index_ref: IndexRef,
        probe: &Record,
        extractors: &[ExtractorRef],
    ) -> Result<bool> {
        Ok(!self.get(index_ref, probe, extractors, false)?.is_empty())
    }

    /// Segments with a null key attribute in a non-unique index
    pub fn get_nulls(&self, index_ref: IndexRef) -> Result<Vec<Arc<BusinessObject>>> {
        let found = self.indexes.read().nulls(index_ref)?;
        Ok(self.visible(found, Access::Direct))
    }

    /// Every live segment
    pub fn get_all(&self) -> Vec<Arc<BusinessObject>> {
        let mut all = Vec::new();
        self.indexes.read().for_each(&mut |e| all.push(e.clone()));
        self.visible(all, Access::Direct)
    }

    /// Resident segments, including expired ones not yet evicted
    pub fn size(&self) -> usize {
        self.indexes.read().primary().size()
    }

    /// Distinct non-temporal keys with at least one resident segment
    pub fn semi_unique_size(&self) -> usize {
        self.indexes.read().primary().semi_unique_size()
    }

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

    /// Remove the exact segment equal to `record`
    ///
    /// Returns `None` when nothing live was removed.
    pub fn remove(&self, record: &Record) -> Option<Arc<BusinessObject>> {
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let entry = exact(&indexes, record)?;
        indexes.remove(&entry);
        self.live_objects(vec![entry], now).pop()
    }

    /// Remove the segment of `record`'s key valid at `as_of`
    pub fn remove_old_entry(
        &self,
        record: &Record,
        as_of: &[Timestamp],
    ) -> Result<Option<Arc<BusinessObject>>> {
        self.check_dates(as_of)?;
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let Some(entry) = indexes
            .primary()
            .get_semi_unique_from_data(record, as_of)
            .cloned()
        else {
            return Ok(None);
        };
        indexes.remove(&entry);
        Ok(self.live_objects(vec![entry], now).pop())
    }

    /// Remove every segment of `record`'s key that overlaps it on every dimension
    pub fn remove_old_entry_for_range(&self, record: &Record) -> Vec<Arc<BusinessObject>> {
        let now = self.clock.now();
        let mut indexes = self.indexes.write();
        let overlapping: Vec<CacheEntry> = indexes
            .primary()
            .get_from_data_for_all_dates(record)
            .into_iter()
            .filter(|e| self.as_of.iter().all(|a| a.intervals_overlap(e.record(), record)))
            .collect();
        for entry in &overlapping {
            indexes.remove(entry);
        }
        trace!(target: "bitemp::cache", removed = overlapping.len(), "Removed segments for range");
        self.live_objects(overlapping, now)
    }

    /// Remove every segment whose data `filter` selects
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
        trace!(target: "bitemp::cache", removed = selected.len(), "Removed matching segments");
        self.live_objects(selected, now)
    }

    /// Remove the whole history of `record`'s key
    ///
    /// `procedure` sees each removed live object once the lock is released,
    /// so it may call back into this cache. Returns whether anything live
    /// was removed.
    pub fn remove_all_ignoring_date(
        &self,
        record: &Record,
        mut procedure: impl FnMut(Arc<BusinessObject>),
    ) -> bool {
        let now = self.clock.now();
        let removed = {
            let mut indexes = self.indexes.write();
            let group = indexes.primary().get_from_data_for_all_dates(record);
            for entry in &group {
                indexes.remove(entry);
            }
            group
        };
        let live = self.live_objects(removed, now);
        let any = !live.is_empty();
        live.into_iter().for_each(&mut procedure);
        any
    }

    /// Objects of the removed `entries` that had not expired at `now`
    fn live_objects(&self, entries: Vec<CacheEntry>, now: Timestamp) -> Vec<Arc<BusinessObject>> {
        entries
            .into_iter()
            .filter(|e| !self.ttl.entry_expired(e, now, Access::Direct))
            .map(CacheEntry::into_object)
            .collect()
    }

    /// Evict every expired segment now rather than on the next read
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

    /// Drop every segment; registered indexes stay registered
    pub fn clear(&self) {
        let mut indexes = self.indexes.write();
        let dropped = indexes.len();
        indexes.clear();
        debug!(target: "bitemp::cache", dropped, "Cleared dated cache");
    }
}

impl std::fmt::Debug for DatedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indexes = self.indexes.read();
        f.debug_struct("DatedCache")
            .field("as_of", &self.as_of)
            .field("ttl", &self.ttl)
            .field("size", &indexes.primary().size())
            .field("keys", &indexes.primary().semi_unique_size())
            .field("indexes", &indexes.index_count())
            .finish()
    }
}

/// Separate as-of attributes from plain key attributes
fn split_temporal(extractors: Vec<ExtractorRef>) -> (Vec<ExtractorRef>, Vec<ExtractorRef>) {
    extractors
        .into_iter()
        .partition(|e| e.as_of_attribute().is_none())
}

fn exact(indexes: &Indexes, record: &Record) -> Option<CacheEntry> {
    let primary = indexes.primary();
    let hash = primary.non_temporal_hash(record);
    primary.get_from_data(record, hash).cloned()
}

fn shrink(
    indexes: &mut Indexes,
    existing: CacheEntry,
    attr: &AsOfAttribute,
    new_to: Timestamp,
    now: Timestamp,
) -> Result<Arc<BusinessObject>> {
    let (from, to) = attr.validate_interval(existing.record())?;
    if new_to <= from || new_to >= to {
        return Err(CacheError::InvalidTransition(format!(
            "'{}' can only shrink to a point inside [{}, {}), got {}",
            attr.name(),
            from,
            to,
            new_to
        )));
    }
    let shrunk = Arc::new(existing.record().with_value(attr.to_column(), new_to));
    refresh(indexes, existing, shrunk, now)
}

/// Give `existing`'s object new data everywhere, or change nothing
fn refresh(
    indexes: &mut Indexes,
    existing: CacheEntry,
    data: Arc<Record>,
    now: Timestamp,
) -> Result<Arc<BusinessObject>> {
    indexes.replace(&existing, existing.with_data(Arc::clone(&data)))?;
    let object = existing.into_object();
    object.set_data(data);
    object.touch(now);
    Ok(object)
}
