//! Index registration and dispatch
//!
//! A cache owns one primary index and any number of secondary indexes
//! registered at setup time. Each registration hands back an [`IndexRef`],
//! an opaque handle that dispatches straight to the index without any name
//! lookup.
//!
//! `IndexSet` also keeps every index consistent: an entry is checked
//! against all indexes before it is inserted into any, so a rejected
//! mutation leaves every index untouched.

use std::fmt;

use bitemp_core::{join_names, CacheError, ExtractorRef, Record, Result};

use super::{CacheIndex, IndexEntry};

/// Handle to a registered index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexRef(u32);

impl IndexRef {
    /// The primary-key index every cache starts with
    pub const PRIMARY: IndexRef = IndexRef(0);

    /// Raw handle value, in registration order
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primary index plus registered secondaries
pub(crate) struct IndexSet<E, P> {
    primary: P,
    secondary: Vec<Box<dyn CacheIndex<E>>>,
}

impl<E, P> IndexSet<E, P>
where
    E: IndexEntry,
    P: CacheIndex<E>,
{
    pub(crate) fn new(primary: P) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
        }
    }

    pub(crate) fn primary(&self) -> &P {
        &self.primary
    }

    /// Index behind `index_ref`
    pub(crate) fn resolve(&self, index_ref: IndexRef) -> Result<&dyn CacheIndex<E>> {
        if index_ref == IndexRef::PRIMARY {
            return Ok(&self.primary);
        }
        self.secondary
            .get(index_ref.0 as usize - 1)
            .map(|b| b.as_ref())
            .ok_or(CacheError::UnknownIndexReference(index_ref.0))
    }

    fn indexes(&self) -> impl Iterator<Item = &dyn CacheIndex<E>> {
        std::iter::once(&self.primary as &dyn CacheIndex<E>)
            .chain(self.secondary.iter().map(|b| b.as_ref()))
    }

    fn refs(&self) -> impl Iterator<Item = (IndexRef, &dyn CacheIndex<E>)> {
        self.indexes()
            .enumerate()
            .map(|(i, index)| (IndexRef(i as u32), index))
    }

    /// Whether a registration could use `name`
    pub(crate) fn check_name(&self, name: &str) -> Result<()> {
        if self.indexes().any(|i| i.name() == name) {
            return Err(CacheError::DuplicateIndexName(name.to_string()));
        }
        Ok(())
    }

    /// Populate `index` from the resident entries and register it
    ///
    /// A unique index that the resident entries would violate is rejected.
    pub(crate) fn register(&mut self, mut index: Box<dyn CacheIndex<E>>) -> Result<IndexRef> {
        self.check_name(index.name())?;
        let mut resident = Vec::with_capacity(self.primary.len());
        self.primary.for_each(&mut |e| resident.push(e.clone()));
        for entry in resident {
            index.check_insert(&entry)?;
            index.insert(entry);
        }
        self.secondary.push(index);
        Ok(IndexRef(self.secondary.len() as u32))
    }

    /// Best index for a lookup on `filter`
    ///
    /// Candidates are indexes whose whole key appears in `filter`. Unique
    /// indexes win, then the fewest filter attributes left to evaluate,
    /// then the earliest registration.
    pub(crate) fn best_for(&self, filter: &[ExtractorRef], unique_only: bool) -> Option<IndexRef> {
        self.refs()
            .filter(|(_, index)| !unique_only || index.is_unique())
            .filter(|(_, index)| index.key().covered_by(filter))
            .min_by_key(|(r, index)| (!index.is_unique(), index.key().uncovered(filter).len(), *r))
            .map(|(r, _)| r)
    }

    /// Entries matching `probe` on every extractor in `filter`
    ///
    /// When `index_ref` does not cover the filter, every resident entry is
    /// evaluated instead, unless `force_evaluate` asks for the index to be
    /// used as given.
    pub(crate) fn query(
        &self,
        index_ref: IndexRef,
        probe: &Record,
        filter: &[ExtractorRef],
        force_evaluate: bool,
    ) -> Result<Vec<E>> {
        let index = self.resolve(index_ref)?;
        let mut out = Vec::new();
        if index.key().covered_by(filter) {
            index.lookup(probe, &mut out);
            let residual = index.key().uncovered(filter);
            if !residual.is_empty() {
                out.retain(|e| residual.iter().all(|x| x.probe_matches(e.record(), probe)));
            }
            return Ok(out);
        }
        if force_evaluate {
            return Err(CacheError::IndexNotApplicable {
                index: index.name().to_string(),
                attributes: join_names(filter),
            });
        }
        self.primary.for_each(&mut |e| {
            if filter.iter().all(|x| x.probe_matches(e.record(), probe)) {
                out.push(e.clone());
            }
        });
        Ok(out)
    }

    /// Entries of a non-unique index with a null key attribute
    pub(crate) fn nulls(&self, index_ref: IndexRef) -> Result<Vec<E>> {
        let mut out = Vec::new();
        self.resolve(index_ref)?.nulls(&mut out)?;
        Ok(out)
    }

    /// Check `entry` against every index
    pub(crate) fn check_insert(&self, entry: &E) -> Result<()> {
        self.indexes().try_for_each(|i| i.check_insert(entry))
    }

    /// Check, then insert into every index
    pub(crate) fn insert(&mut self, entry: E) -> Result<()> {
        self.check_insert(&entry)?;
        for index in &mut self.secondary {
            index.insert(entry.clone());
        }
        self.primary.insert(entry);
        Ok(())
    }

    /// Remove from every index
    pub(crate) fn remove(&mut self, entry: &E) -> bool {
        for index in &mut self.secondary {
            index.remove_entry(entry);
        }
        self.primary.remove_entry(entry)
    }

    /// Swap `old` for `new` everywhere, or change nothing
    pub(crate) fn replace(&mut self, old: &E, new: E) -> Result<()> {
        self.remove(old);
        if let Err(e) = self.check_insert(&new) {
            self.relink(old.clone());
            return Err(e);
        }
        self.relink(new);
        Ok(())
    }

    /// Insert without checking; for entries that were valid a moment ago
    fn relink(&mut self, entry: E) {
        for index in &mut self.secondary {
            index.insert(entry.clone());
        }
        self.primary.insert(entry);
    }

    pub(crate) fn for_each(&self, f: &mut dyn FnMut(&E)) {
        self.primary.for_each(f);
    }

    pub(crate) fn len(&self) -> usize {
        self.primary.len()
    }

    pub(crate) fn index_count(&self) -> usize {
        self.secondary.len() + 1
    }

    pub(crate) fn clear(&mut self) {
        for index in &mut self.secondary {
            index.clear();
        }
        self.primary.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::{group_key, id_key, row};
    use crate::index::{NonUniqueIndex, UniqueIndex};
    use bitemp_core::attribute;
    use std::sync::Arc;

    type Set = IndexSet<Arc<Record>, UniqueIndex<Arc<Record>>>;

    fn set() -> Set {
        IndexSet::new(UniqueIndex::new("primary", id_key()).unwrap())
    }

    #[test]
    fn test_refs_follow_registration_order() {
        let mut set = set();
        let a = set
            .register(Box::new(NonUniqueIndex::new("byGroup", group_key()).unwrap()))
            .unwrap();
        assert_eq!(a.id(), 1);
        assert_eq!(set.resolve(a).unwrap().name(), "byGroup");
        assert_eq!(set.resolve(IndexRef::PRIMARY).unwrap().name(), "primary");
        assert!(matches!(
            set.resolve(IndexRef(9)),
            Err(CacheError::UnknownIndexReference(9))
        ));
        assert_eq!(set.index_count(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut set = set();
        let dup = NonUniqueIndex::new("primary", group_key()).unwrap();
        assert!(matches!(
            set.register(Box::new(dup)),
            Err(CacheError::DuplicateIndexName(_))
        ));
    }

    #[test]
    fn test_unique_registration_checks_residents() {
        let mut set = set();
        set.insert(row(1, "g")).unwrap();
        set.insert(row(2, "g")).unwrap();
        let unique = UniqueIndex::new("byGroup", group_key()).unwrap();
        assert!(matches!(
            set.register(Box::new(unique)),
            Err(CacheError::DuplicateUniqueKey { .. })
        ));
        assert_eq!(set.index_count(), 1);
    }

    #[test]
    fn test_insert_is_all_or_nothing() {
        let mut set = set();
        set.register(Box::new(UniqueIndex::new("byGroup", group_key()).unwrap()))
            .unwrap();
        set.insert(row(1, "g")).unwrap();
        assert!(set.insert(row(2, "g")).is_err());
        assert_eq!(set.len(), 1);
        assert!(set.insert(row(1, "h")).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_replace_rolls_back() {
        let mut set = set();
        set.register(Box::new(UniqueIndex::new("byGroup", group_key()).unwrap()))
            .unwrap();
        let a = row(1, "a");
        let b = row(2, "b");
        set.insert(a.clone()).unwrap();
        set.insert(b.clone()).unwrap();

        assert!(set.replace(&a, row(1, "b")).is_err());
        let by_group = IndexRef(1);
        let found = set.query(by_group, &row(0, "a"), &group_key(), false).unwrap();
        assert_eq!(found.len(), 1);
        assert!(Arc::ptr_eq(&found[0], &a));
    }

    #[test]
    fn test_best_index_prefers_unique_then_narrow() {
        let mut set = set();
        let group = set
            .register(Box::new(NonUniqueIndex::new("byGroup", group_key()).unwrap()))
            .unwrap();
        let unique_group = set
            .register(Box::new(UniqueIndex::new("byGroupU", group_key()).unwrap()))
            .unwrap();

        assert_eq!(set.best_for(&group_key(), false), Some(unique_group));
        assert_eq!(set.best_for(&id_key(), false), Some(IndexRef::PRIMARY));
        let both = vec![attribute("group", 1), attribute("id", 0)];
        assert_eq!(set.best_for(&both, false), Some(IndexRef::PRIMARY));
        assert_eq!(set.best_for(&[attribute("other", 5)], false), None);
        assert_ne!(group, unique_group);
    }

    #[test]
    fn test_query_covered_and_scan() {
        let mut set = set();
        let group = set
            .register(Box::new(NonUniqueIndex::new("byGroup", group_key()).unwrap()))
            .unwrap();
        for i in 0..6 {
            set.insert(row(i, if i < 4 { "a" } else { "b" })).unwrap();
        }
        let both = vec![attribute("group", 1), attribute("id", 0)];
        let hits = set.query(group, &row(2, "a"), &both, false).unwrap();
        assert_eq!(hits.len(), 1);

        // primary key not in the filter: scan, or refuse when forced
        let scan = set
            .query(IndexRef::PRIMARY, &row(0, "a"), &group_key(), false)
            .unwrap();
        assert_eq!(scan.len(), 4);
        assert!(matches!(
            set.query(IndexRef::PRIMARY, &row(0, "a"), &group_key(), true),
            Err(CacheError::IndexNotApplicable { .. })
        ));
    }
}
