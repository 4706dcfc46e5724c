// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON record batches.
//!
//! A batch is an array of `{ "key": 7, "record": { ... } }` entries. `key` is
//! optional and defaults to the entry's position.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use gang_core::{AttributeRecord, ResourceRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct BatchEntry {
    key: Option<i64>,
    record: AttributeRecord,
}

/// A batch entry that could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub key: i64,
    pub reason: String,
}

/// Built records plus the entries that were rejected.
#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<ResourceRecord>,
    pub rejected: Vec<Rejection>,
}

impl Batch {
    /// Reads and builds the batch at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read batch {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse batch {}", path.display()))
    }

    /// Builds every entry of a JSON batch. Malformed JSON is an error; records
    /// that fail construction are collected in `rejected`.
    pub fn parse(text: &str) -> Result<Self> {
        let entries: Vec<BatchEntry> = serde_json::from_str(text)?;
        let mut batch = Self::default();
        let mut seen = BTreeSet::new();
        for (position, entry) in entries.into_iter().enumerate() {
            let key = entry.key.unwrap_or(position as i64);
            if !seen.insert(key) {
                batch.reject(key, "duplicate key".to_owned());
                continue;
            }
            match ResourceRecord::make(key, entry.record) {
                Ok(record) => batch.records.push(record),
                Err(err) => batch.reject(key, err.to_string()),
            }
        }
        debug!(
            accepted = batch.records.len(),
            rejected = batch.rejected.len(),
            "batch built"
        );
        Ok(batch)
    }

    fn reject(&mut self, key: i64, reason: String) {
        warn!(key, %reason, "record rejected");
        self.rejected.push(Rejection { key, reason });
    }

    /// Removes and returns the record keyed `key`.
    pub fn take(&mut self, key: i64) -> Option<ResourceRecord> {
        let index = self.records.iter().position(|r| r.key() == key)?;
        Some(self.records.remove(index))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PORT: &str = r#"{"list": [{"record": {"label": {"lit": "peer"}}}]}"#;

    #[test]
    fn keys_default_to_position_and_bad_records_are_collected() {
        let text = format!(
            r#"[
                {{"record": {{"Ports": {PORT}}}}},
                {{"key": 9, "record": {{"Type": {{"lit": "x"}}}}}},
                {{"key": 0, "record": {{"Ports": {PORT}}}}}
            ]"#
        );
        let mut batch = Batch::parse(&text).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].key(), 0);
        let rejected: Vec<i64> = batch.rejected.iter().map(|r| r.key).collect();
        assert_eq!(rejected, vec![9, 0]);
        assert_eq!(batch.rejected[1].reason, "duplicate key");
        assert!(batch.take(0).is_some());
        assert!(batch.take(0).is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Batch::parse("{").is_err());
    }
}
