// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered reservation pool of unmatched resource records.
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::record::ResourceRecord;

/// Records available for binding, ordered by key.
///
/// Removal models a tentative claim and [`reinsert`](Self::reinsert) models
/// returning an unused record. Only key order is guaranteed.
#[derive(Debug, Clone, Default)]
pub struct OfferPool {
    entries: BTreeMap<i64, Arc<ResourceRecord>>,
}

impl OfferPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `record` under its own key, returning any record it replaced.
    pub fn insert(&mut self, record: ResourceRecord) -> Option<Arc<ResourceRecord>> {
        self.insert_shared(Arc::new(record))
    }

    /// Adds an already shared record under its own key.
    pub fn insert_shared(&mut self, record: Arc<ResourceRecord>) -> Option<Arc<ResourceRecord>> {
        self.entries.insert(record.key(), record)
    }

    /// Claims the record under `key`.
    pub fn remove(&mut self, key: i64) -> Option<Arc<ResourceRecord>> {
        self.entries.remove(&key)
    }

    /// Returns a previously claimed record to the pool.
    pub fn reinsert(&mut self, key: i64, record: Arc<ResourceRecord>) {
        debug_assert_eq!(key, record.key(), "record reinserted under a foreign key");
        self.entries.insert(key, record);
    }

    /// First entry strictly after `after`; `None` starts from the smallest key.
    pub fn first_after(&self, after: Option<i64>) -> Option<(i64, &Arc<ResourceRecord>)> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.entries
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(k, r)| (*k, r))
    }

    /// Record under `key`, if present.
    pub fn get(&self, key: i64) -> Option<&Arc<ResourceRecord>> {
        self.entries.get(&key)
    }

    /// Returns `true` when `key` is present.
    pub fn contains(&self, key: i64) -> bool {
        self.entries.contains_key(&key)
    }

    /// Keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.keys().copied()
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceRecord>> {
        self.entries.values()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the pool holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ResourceRecord> for OfferPool {
    fn from_iter<I: IntoIterator<Item = ResourceRecord>>(iter: I) -> Self {
        let mut pool = Self::new();
        for record in iter {
            pool.insert(record);
        }
        pool
    }
}

impl Extend<ResourceRecord> for OfferPool {
    fn extend<I: IntoIterator<Item = ResourceRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}
