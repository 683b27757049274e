//! Allocation-free relationship lookups
//!
//! When traversing a relationship, the caller already holds the source
//! object and its data. A `RelationshipHashStrategy` hashes and matches
//! candidate entries straight from that source, so no probe record has to
//! be built on the hot path.

use crate::as_of::AsOfAttribute;
use crate::extractor::ExtractorRef;
use crate::hash_strategy::combine_hash;
use crate::record::Record;
use crate::timestamp::Timestamp;

/// Hash and match related entries without building a probe
///
/// `hash_from_related` must equal the target index's non-temporal key
/// hash of any matching candidate.
pub trait RelationshipHashStrategy<S: ?Sized> {
    /// Non-temporal key hash derived from the source
    fn hash_from_related(&self, source: &S, source_data: &Record) -> u64;

    /// Whether `candidate` is the related entry valid at the given dates
    ///
    /// `as_of_1` is ignored by targets with a single temporal dimension.
    fn equals_for_relationship(
        &self,
        source: &S,
        source_data: &Record,
        candidate: &Record,
        as_of_0: Timestamp,
        as_of_1: Timestamp,
    ) -> bool;
}

/// Relationship joining source columns to target key extractors
///
/// Each pair maps a column of the source record to the target extractor it
/// must equal. The pairs must be in the target's key order.
#[derive(Debug, Clone)]
pub struct RelatedAttributes {
    pairs: Vec<(usize, ExtractorRef)>,
    as_of: Vec<AsOfAttribute>,
}

impl RelatedAttributes {
    /// Join on `pairs` and match the target's `as_of` dimensions
    pub fn new(pairs: Vec<(usize, ExtractorRef)>, as_of: Vec<AsOfAttribute>) -> Self {
        Self { pairs, as_of }
    }
}

impl<S: ?Sized> RelationshipHashStrategy<S> for RelatedAttributes {
    fn hash_from_related(&self, _source: &S, source_data: &Record) -> u64 {
        self.pairs.iter().fold(0, |h, (column, target)| {
            combine_hash(h, target.hash_of_value(source_data.get(*column)))
        })
    }

    fn equals_for_relationship(
        &self,
        _source: &S,
        source_data: &Record,
        candidate: &Record,
        as_of_0: Timestamp,
        as_of_1: Timestamp,
    ) -> bool {
        let keys_match = self
            .pairs
            .iter()
            .all(|(column, target)| target.value_of(candidate) == source_data.get(*column));
        keys_match
            && self
                .as_of
                .iter()
                .zip([as_of_0, as_of_1])
                .all(|(attr, date)| attr.data_matches(candidate, date))
    }
}
