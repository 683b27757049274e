//! Semi-unique dated index
//!
//! Holds the temporal history of many entities. A non-temporal key (for
//! example an account id) owns any number of segments, each covering one
//! slice of business time and processing time.
//!
//! ## Layout
//!
//! - The dated table hashes the non-temporal key together with every
//!   `from` bound. It answers exact-segment questions.
//! - The group table hashes the non-temporal key alone. Each group lists
//!   every segment of one key in insertion order. It answers "as of"
//!   questions and whole-history questions.
//!
//! `size()` counts segments and `semi_unique_size()` counts groups.
//!
//! ## Invariant
//!
//! Two segments of the same key never overlap on every dimension at once.
//! Inserts that would break this are rejected before anything changes.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use bitemp_core::{
    combine_hash, AsOfAttribute, CacheError, Extractor, ExtractorHashStrategy, ExtractorRef,
    Filter, Record, RelationshipHashStrategy, Result, Timestamp,
};

use super::{CacheIndex, IndexEntry};

type Group<E> = Vec<E>;

/// Temporal segments grouped by non-temporal key
pub struct SemiUniqueDatedIndex<E> {
    name: String,
    non_temporal: ExtractorHashStrategy,
    as_of: Vec<AsOfAttribute>,
    dated: FxHashMap<u64, SmallVec<[E; 1]>>,
    groups: FxHashMap<u64, SmallVec<[Group<E>; 1]>>,
    size: usize,
    semi_unique_size: usize,
}

impl<E: IndexEntry> SemiUniqueDatedIndex<E> {
    /// Empty index over `non_temporal` keys and the `as_of` dimensions
    pub fn new(
        name: impl Into<String>,
        non_temporal: Vec<ExtractorRef>,
        as_of: Vec<AsOfAttribute>,
    ) -> Result<Self> {
        Self::with_capacity(name, non_temporal, as_of, 0)
    }

    /// Empty index with room for `capacity` segments
    pub fn with_capacity(
        name: impl Into<String>,
        non_temporal: Vec<ExtractorRef>,
        as_of: Vec<AsOfAttribute>,
        capacity: usize,
    ) -> Result<Self> {
        let name = name.into();
        if non_temporal.is_empty() {
            return Err(CacheError::EmptyExtractorList(name));
        }
        if as_of.is_empty() || as_of.len() > 2 {
            return Err(CacheError::AsOfDimensionCount {
                expected: as_of.len().clamp(1, 2),
                actual: as_of.len(),
            });
        }
        Ok(Self {
            name,
            non_temporal: ExtractorHashStrategy::new(non_temporal),
            as_of,
            dated: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            groups: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            size: 0,
            semi_unique_size: 0,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Non-temporal key strategy
    pub fn non_temporal_strategy(&self) -> &ExtractorHashStrategy {
        &self.non_temporal
    }

    /// Temporal dimensions, business time first
    pub fn as_of_attributes(&self) -> &[AsOfAttribute] {
        &self.as_of
    }

    /// Non-temporal key hash of `record`
    #[inline]
    pub fn non_temporal_hash(&self, record: &Record) -> u64 {
        self.non_temporal.hash_of(record)
    }

    /// Number of stored segments
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of distinct non-temporal keys
    pub fn semi_unique_size(&self) -> usize {
        self.semi_unique_size
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a segment, replacing the exact segment if one is stored
    ///
    /// Returns the replaced segment.
    ///
    /// # Errors
    ///
    /// Rejects empty or missing intervals and segments that overlap another
    /// segment of the same key on every dimension. Nothing changes on error.
    pub fn put(&mut self, entry: E) -> Result<Option<E>> {
        let hash = self.non_temporal_hash(entry.record());
        self.put_with_hash(entry, hash)
    }

    /// [`put`](Self::put) with a precomputed non-temporal hash
    ///
    /// `non_temporal_hash` must equal [`non_temporal_hash`](Self::non_temporal_hash)
    /// of the entry's record.
    pub fn put_with_hash(&mut self, entry: E, non_temporal_hash: u64) -> Result<Option<E>> {
        let existing = self
            .get_from_data(entry.record(), non_temporal_hash)
            .cloned();
        self.check(entry.record(), non_temporal_hash, existing.as_ref())?;
        if let Some(old) = &existing {
            self.unlink(old, non_temporal_hash);
        }
        self.link(entry, non_temporal_hash);
        Ok(existing)
    }

    /// Remove the exact segment equal to `record`
    pub fn remove(&mut self, record: &Record) -> Option<E> {
        let hash = self.non_temporal_hash(record);
        let found = self.get_from_data(record, hash).cloned()?;
        self.unlink(&found, hash);
        Some(found)
    }

    /// Remove the segment of `record`'s key valid at `as_of`
    pub fn remove_old_entry(&mut self, record: &Record, as_of: &[Timestamp]) -> Option<E> {
        let hash = self.non_temporal_hash(record);
        let found = self.get_semi_unique_from_data(record, as_of).cloned()?;
        self.unlink(&found, hash);
        Some(found)
    }

    /// Remove every segment of `record`'s key that overlaps it on every dimension
    pub fn remove_old_entry_for_range(&mut self, record: &Record) -> Vec<E> {
        let hash = self.non_temporal_hash(record);
        let removed: Vec<E> = match self.group(hash, record) {
            Some(group) => group
                .iter()
                .filter(|e| self.overlaps_all(e.record(), record))
                .cloned()
                .collect(),
            None => return Vec::new(),
        };
        for e in &removed {
            self.unlink(e, hash);
        }
        removed
    }

    /// Remove every segment selected by `filter`
    pub fn remove_all(&mut self, filter: &dyn Filter) -> Vec<E> {
        let removed: Vec<E> = self
            .groups
            .values()
            .flatten()
            .flatten()
            .filter(|e| filter.matches(e.record()))
            .cloned()
            .collect();
        for e in &removed {
            let hash = self.non_temporal_hash(e.record());
            self.unlink(e, hash);
        }
        removed
    }

    /// Remove every segment of `record`'s key, calling `procedure` on each
    ///
    /// Returns whether anything was removed.
    pub fn remove_all_ignoring_date(
        &mut self,
        record: &Record,
        mut procedure: impl FnMut(E),
    ) -> bool {
        let removed = self.take_group(record);
        let any = !removed.is_empty();
        removed.into_iter().for_each(&mut procedure);
        any
    }

    /// Detach and return the whole history of `record`'s key
    pub(crate) fn take_group(&mut self, record: &Record) -> Vec<E> {
        let hash = self.non_temporal_hash(record);
        let Some(bucket) = self.groups.get_mut(&hash) else {
            return Vec::new();
        };
        let non_temporal = &self.non_temporal;
        let Some(pos) = bucket
            .iter()
            .position(|g| g.first().is_some_and(|e| non_temporal.equals(e.record(), record)))
        else {
            return Vec::new();
        };
        let group = bucket.remove(pos);
        if bucket.is_empty() {
            self.groups.remove(&hash);
        }
        self.semi_unique_size -= 1;
        for e in &group {
            let dated_hash = self.dated_hash(e.record(), hash);
            remove_identity(&mut self.dated, dated_hash, e);
            self.size -= 1;
        }
        group
    }

    /// Drop every segment
    pub fn clear(&mut self) {
        self.dated.clear();
        self.groups.clear();
        self.size = 0;
        self.semi_unique_size = 0;
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The exact segment equal to `record`: same key, same `from` bounds
    pub fn get_from_data(&self, record: &Record, non_temporal_hash: u64) -> Option<&E> {
        let hash = self.dated_hash(record, non_temporal_hash);
        self.dated
            .get(&hash)?
            .iter()
            .find(|e| self.dated_equals(e.record(), record))
    }

    /// Every segment sharing `record`'s key
    pub fn get_from_data_for_all_dates(&self, record: &Record) -> Vec<E> {
        let hash = self.non_temporal_hash(record);
        self.group(hash, record)
            .map(|g| g.to_vec())
            .unwrap_or_default()
    }

    /// The segment of `record`'s key valid at every `as_of` date
    pub fn get_semi_unique_from_data(&self, record: &Record, as_of: &[Timestamp]) -> Option<&E> {
        let hash = self.non_temporal_hash(record);
        self.group(hash, record)?
            .iter()
            .rev()
            .find(|e| self.matches_dates(e.record(), as_of))
    }

    /// Relationship lookup without a probe record
    ///
    /// `non_temporal_hash` comes from the strategy's `hash_from_related`.
    /// Gives the same answer as building a probe and calling
    /// [`get_semi_unique_from_data`](Self::get_semi_unique_from_data).
    pub fn get_semi_unique_as_one<S: ?Sized>(
        &self,
        source: &S,
        source_data: &Record,
        strategy: &dyn RelationshipHashStrategy<S>,
        non_temporal_hash: u64,
        as_of_0: Timestamp,
        as_of_1: Timestamp,
    ) -> Option<&E> {
        self.groups
            .get(&non_temporal_hash)?
            .iter()
            .flat_map(|g| g.iter().rev())
            .find(|e| {
                strategy.equals_for_relationship(source, source_data, e.record(), as_of_0, as_of_1)
            })
    }

    /// As-of lookup by an explicit key extractor list and dates
    pub fn get_semi_unique_as_one_with_dates(
        &self,
        probe: &Record,
        extractors: &[ExtractorRef],
        as_of: &[Timestamp],
        non_temporal_hash: u64,
    ) -> Option<&E> {
        self.groups
            .get(&non_temporal_hash)?
            .iter()
            .filter(|g| {
                g.first().is_some_and(|e| {
                    extractors.iter().all(|x| x.values_equal(e.record(), probe))
                })
            })
            .flat_map(|g| g.iter().rev())
            .find(|e| self.matches_dates(e.record(), as_of))
    }

    /// Exact lookup by extractor list
    ///
    /// Temporal extractors compare the probe's date with the stored `from`
    /// bound literally.
    pub fn get(&self, probe: &Record, extractors: &[ExtractorRef]) -> Option<&E> {
        let hash = extractors
            .iter()
            .fold(0, |h, e| combine_hash(h, e.hash_of(probe)));
        self.dated
            .get(&hash)?
            .iter()
            .find(|e| extractors.iter().all(|x| x.values_equal(e.record(), probe)))
    }

    /// As-of lookup by extractor list
    ///
    /// Temporal extractors match when the probe's date falls inside the
    /// stored interval.
    pub fn get_from_semi_unique(&self, probe: &Record, extractors: &[ExtractorRef]) -> Option<&E> {
        let (temporal, plain): (Vec<&ExtractorRef>, Vec<&ExtractorRef>) = extractors
            .iter()
            .partition(|e| e.as_of_attribute().is_some());
        let hash = plain
            .iter()
            .fold(0, |h, e| combine_hash(h, e.hash_of(probe)));
        self.groups
            .get(&hash)?
            .iter()
            .filter(|g| {
                g.first()
                    .is_some_and(|e| plain.iter().all(|x| x.values_equal(e.record(), probe)))
            })
            .flat_map(|g| g.iter().rev())
            .find(|e| temporal.iter().all(|x| x.probe_matches(e.record(), probe)))
    }

    /// Whether [`get`](Self::get) finds a segment
    pub fn contains(&self, probe: &Record, extractors: &[ExtractorRef]) -> bool {
        self.get(probe, extractors).is_some()
    }

    /// Whether [`get_from_semi_unique`](Self::get_from_semi_unique) finds a segment
    pub fn contains_in_semi_unique(&self, probe: &Record, extractors: &[ExtractorRef]) -> bool {
        self.get_from_semi_unique(probe, extractors).is_some()
    }

    /// Every stored segment
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.groups.values().flatten().flatten()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn dated_hash(&self, record: &Record, non_temporal_hash: u64) -> u64 {
        self.as_of
            .iter()
            .fold(non_temporal_hash, |h, a| combine_hash(h, a.hash_of(record)))
    }

    fn dated_equals(&self, stored: &Record, record: &Record) -> bool {
        self.non_temporal.equals(stored, record)
            && self.as_of.iter().all(|a| a.values_equal(stored, record))
    }

    fn matches_dates(&self, stored: &Record, as_of: &[Timestamp]) -> bool {
        self.as_of.len() == as_of.len()
            && self
                .as_of
                .iter()
                .zip(as_of)
                .all(|(a, date)| a.data_matches(stored, *date))
    }

    fn overlaps_all(&self, stored: &Record, record: &Record) -> bool {
        self.as_of.iter().all(|a| a.intervals_overlap(stored, record))
    }

    fn group(&self, non_temporal_hash: u64, record: &Record) -> Option<&Group<E>> {
        self.groups.get(&non_temporal_hash)?.iter().find(|g| {
            g.first()
                .is_some_and(|e| self.non_temporal.equals(e.record(), record))
        })
    }

    /// Validate intervals and overlap against the key's other segments
    fn check(&self, record: &Record, non_temporal_hash: u64, exclude: Option<&E>) -> Result<()> {
        for attr in &self.as_of {
            attr.validate_interval(record)?;
        }
        let Some(group) = self.group(non_temporal_hash, record) else {
            return Ok(());
        };
        let clash = group.iter().any(|e| {
            !exclude.is_some_and(|x| x.same_identity(e)) && self.overlaps_all(e.record(), record)
        });
        if clash {
            return Err(CacheError::OverlappingSegment {
                index: self.name.clone(),
            });
        }
        Ok(())
    }

    fn link(&mut self, entry: E, non_temporal_hash: u64) {
        let dated_hash = self.dated_hash(entry.record(), non_temporal_hash);
        self.dated.entry(dated_hash).or_default().push(entry.clone());

        let bucket = self.groups.entry(non_temporal_hash).or_default();
        let non_temporal = &self.non_temporal;
        match bucket.iter_mut().find(|g| {
            g.first()
                .is_some_and(|e| non_temporal.equals(e.record(), entry.record()))
        }) {
            Some(group) => group.push(entry),
            None => {
                bucket.push(vec![entry]);
                self.semi_unique_size += 1;
            }
        }
        self.size += 1;
    }

    fn unlink(&mut self, entry: &E, non_temporal_hash: u64) -> bool {
        let dated_hash = self.dated_hash(entry.record(), non_temporal_hash);
        if !remove_identity(&mut self.dated, dated_hash, entry) {
            return false;
        }
        self.size -= 1;

        if let Some(bucket) = self.groups.get_mut(&non_temporal_hash) {
            let mut emptied = None;
            for (i, group) in bucket.iter_mut().enumerate() {
                if let Some(pos) = group.iter().position(|e| e.same_identity(entry)) {
                    group.remove(pos);
                    if group.is_empty() {
                        emptied = Some(i);
                    }
                    break;
                }
            }
            if let Some(i) = emptied {
                bucket.remove(i);
                self.semi_unique_size -= 1;
            }
            if bucket.is_empty() {
                self.groups.remove(&non_temporal_hash);
            }
        }
        true
    }
}

fn remove_identity<E: IndexEntry>(
    table: &mut FxHashMap<u64, SmallVec<[E; 1]>>,
    hash: u64,
    entry: &E,
) -> bool {
    let Some(bucket) = table.get_mut(&hash) else {
        return false;
    };
    let Some(pos) = bucket.iter().position(|e| e.same_identity(entry)) else {
        return false;
    };
    bucket.remove(pos);
    if bucket.is_empty() {
        table.remove(&hash);
    }
    true
}

impl<E: IndexEntry> CacheIndex<E> for SemiUniqueDatedIndex<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> &ExtractorHashStrategy {
        &self.non_temporal
    }

    fn is_unique(&self) -> bool {
        true
    }

    fn len(&self) -> usize {
        self.size
    }

    fn check_insert(&self, entry: &E) -> Result<()> {
        let hash = self.non_temporal_hash(entry.record());
        self.check(entry.record(), hash, Some(entry))
    }

    fn insert(&mut self, entry: E) {
        let hash = self.non_temporal_hash(entry.record());
        self.link(entry, hash);
    }

    fn remove_entry(&mut self, entry: &E) -> bool {
        let hash = self.non_temporal_hash(entry.record());
        self.unlink(entry, hash)
    }

    fn lookup(&self, probe: &Record, out: &mut Vec<E>) {
        let hash = self.non_temporal_hash(probe);
        if let Some(group) = self.group(hash, probe) {
            out.extend(group.iter().rev().cloned());
        }
    }

    fn lookup_hash(&self, hash: u64, out: &mut Vec<E>) {
        if let Some(bucket) = self.groups.get(&hash) {
            out.extend(bucket.iter().flat_map(|g| g.iter().rev()).cloned());
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(&E)) {
        self.iter().for_each(f);
    }

    fn clear(&mut self) {
        SemiUniqueDatedIndex::clear(self);
    }
}
