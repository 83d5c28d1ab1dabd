use super::events::{EventBus, StoreEvent};
use super::schema::{BankSubmission, ComparisonResult};
use super::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Storage key of the cache blob.
pub const CACHE_KEY: &str = "bank-comparison-cache";

/// Joins sorted bank ids into a cache key.
const KEY_SEPARATOR: &str = "|";

/// A memoized comparison for one unordered set of banks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonCacheEntry {
    pub result: ComparisonResult,
    /// Creation time. No expiry is applied.
    pub timestamp: DateTime<Utc>,
    pub bank_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Order-independent key for a set of bank ids: sorted, deduplicated,
/// `|`-joined.
pub fn canonical_key<S: AsRef<str>>(bank_ids: &[S]) -> String {
    sorted_ids(bank_ids).join(KEY_SEPARATOR)
}

fn sorted_ids<S: AsRef<str>>(bank_ids: &[S]) -> Vec<String> {
    let mut ids: Vec<String> = bank_ids.iter().map(|s| s.as_ref().to_string()).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Digest of the extracted data a comparison was computed from, taken in
/// bank-id order so it matches regardless of selection order.
pub fn fingerprint(banks: &[BankSubmission]) -> String {
    let mut ordered: Vec<&BankSubmission> = banks.iter().collect();
    ordered.sort_by(|a, b| a.bank_id.cmp(&b.bank_id));

    let mut hasher = Sha256::new();
    for bank in ordered {
        hasher.update(bank.bank_id.as_bytes());
        hasher.update([0u8]);
        // BankInfo serializes deterministically: fixed struct order, BTreeMap fields.
        match serde_json::to_vec(&bank.bank_info) {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) => tracing::warn!(error = %e, "failed to encode bank info for fingerprint"),
        }
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Comparison results persisted as one JSON object keyed by canonical key.
pub struct ComparisonCache {
    storage: Arc<dyn KeyValueStore>,
    events: EventBus,
    write_lock: Mutex<()>,
}

impl ComparisonCache {
    pub fn new(storage: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self {
            storage,
            events,
            write_lock: Mutex::new(()),
        }
    }

    pub fn get<S: AsRef<str>>(&self, bank_ids: &[S]) -> Option<ComparisonResult> {
        self.entry(bank_ids).map(|entry| entry.result)
    }

    pub fn entry<S: AsRef<str>>(&self, bank_ids: &[S]) -> Option<ComparisonCacheEntry> {
        self.load().remove(&canonical_key(bank_ids))
    }

    pub fn has<S: AsRef<str>>(&self, bank_ids: &[S]) -> bool {
        self.load().contains_key(&canonical_key(bank_ids))
    }

    pub fn put<S: AsRef<str>>(&self, bank_ids: &[S], result: ComparisonResult) {
        self.insert(bank_ids, result, None);
    }

    pub fn put_with_fingerprint<S: AsRef<str>>(
        &self,
        bank_ids: &[S],
        result: ComparisonResult,
        fingerprint: String,
    ) {
        self.insert(bank_ids, result, Some(fingerprint));
    }

    /// True when an entry exists and was cached from different extracted
    /// data. Entries without a fingerprint are never reported stale.
    pub fn is_stale<S: AsRef<str>>(&self, bank_ids: &[S], current: &str) -> bool {
        self.entry(bank_ids)
            .and_then(|entry| entry.fingerprint)
            .is_some_and(|cached| cached != current)
    }

    pub fn clear(&self) {
        {
            let _guard = self.write_lock.lock();
            if let Err(e) = self.storage.remove_item(CACHE_KEY) {
                tracing::error!(error = %e, "failed to clear comparison cache");
            }
        }
        self.events.publish(StoreEvent::ComparisonCacheCleared);
    }

    /// Canonical keys currently cached, sorted.
    pub fn list_keys(&self) -> Vec<String> {
        self.load().into_keys().collect()
    }

    fn insert<S: AsRef<str>>(
        &self,
        bank_ids: &[S],
        result: ComparisonResult,
        fingerprint: Option<String>,
    ) {
        let bank_ids = sorted_ids(bank_ids);
        let key = bank_ids.join(KEY_SEPARATOR);
        {
            let _guard = self.write_lock.lock();
            let mut entries = self.load();
            entries.insert(
                key.clone(),
                ComparisonCacheEntry {
                    result,
                    timestamp: Utc::now(),
                    bank_ids,
                    fingerprint,
                },
            );
            self.save(&entries);
        }

        tracing::debug!(%key, "cached comparison result");
        self.events.publish(StoreEvent::ComparisonCached { key });
    }

    fn load(&self) -> BTreeMap<String, ComparisonCacheEntry> {
        let raw = match self.storage.get_item(CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                tracing::error!(error = %e, "failed to read comparison cache");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::error!(error = %e, "comparison cache is corrupt, treating as empty");
            BTreeMap::new()
        })
    }

    fn save(&self, entries: &BTreeMap<String, ComparisonCacheEntry>) {
        let json = match serde_json::to_string(entries) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode comparison cache");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(CACHE_KEY, &json) {
            tracing::error!(error = %e, "failed to persist comparison cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mitc::schema::{BankInfo, BankResult, ComparisonRow, ComparisonStatus, StatusCount};
    use crate::mitc::storage::MemoryStorage;

    fn cache() -> ComparisonCache {
        ComparisonCache::new(Arc::new(MemoryStorage::new()), EventBus::new())
    }

    fn sample_result() -> ComparisonResult {
        ComparisonResult {
            comparison_table: vec![ComparisonRow {
                field_name: "tenure".into(),
                bank_results: vec![
                    BankResult {
                        bank_id: "a".into(),
                        bank_name: "Bank A".into(),
                        status: ComparisonStatus::Same,
                        explanation: "Up to 30 years".into(),
                        details: None,
                    },
                    BankResult {
                        bank_id: "b".into(),
                        bank_name: "Bank B".into(),
                        status: ComparisonStatus::Diff,
                        explanation: "Up to 25 years".into(),
                        details: Some("Salaried only".into()),
                    },
                ],
            }],
            summary: vec![StatusCount { status: ComparisonStatus::Diff, count: 1 }],
        }
    }

    #[test]
    fn canonical_key_ignores_order_and_duplicates() {
        assert_eq!(canonical_key(&["b", "a"]), canonical_key(&["a", "b"]));
        assert_eq!(canonical_key(&["c", "a", "b"]), "a|b|c");
        assert_eq!(canonical_key(&["a", "b", "a"]), "a|b");
    }

    #[test]
    fn fresh_cache_misses() {
        let cache = cache();
        assert_eq!(cache.get(&["a", "b"]), None);
        assert!(!cache.has(&["a", "b"]));
        assert!(cache.list_keys().is_empty());
    }

    #[test]
    fn put_then_get_in_any_order() {
        let cache = cache();
        cache.put(&["b", "a", "c"], sample_result());

        for ids in [["a", "b", "c"], ["c", "b", "a"], ["b", "c", "a"]] {
            assert_eq!(cache.get(&ids), Some(sample_result()));
            assert!(cache.has(&ids));
        }
        assert!(!cache.has(&["a", "b"]));
        assert_eq!(cache.list_keys(), vec!["a|b|c".to_string()]);

        let entry = cache.entry(&["c", "a", "b"]).unwrap();
        assert_eq!(entry.bank_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let cache = cache();
        cache.put(&["a", "b"], sample_result());
        let empty = ComparisonResult { comparison_table: vec![], summary: vec![] };
        cache.put(&["b", "a"], empty.clone());
        assert_eq!(cache.get(&["a", "b"]), Some(empty));
        assert_eq!(cache.list_keys().len(), 1);
    }

    #[test]
    fn clear_drops_all_entries() {
        let cache = cache();
        cache.put(&["a", "b"], sample_result());
        cache.clear();
        assert!(!cache.has(&["a", "b"]));
    }

    #[test]
    fn corrupt_cache_reads_as_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(CACHE_KEY, "[]").unwrap();
        let cache = ComparisonCache::new(storage, EventBus::new());
        assert!(cache.list_keys().is_empty());
        cache.put(&["a", "b"], sample_result());
        assert!(cache.has(&["a", "b"]));
    }

    #[test]
    fn fingerprint_detects_changed_bank_data() {
        let a = BankSubmission { bank_id: "a".into(), bank_info: BankInfo::new("Bank A") };
        let b = BankSubmission { bank_id: "b".into(), bank_info: BankInfo::new("Bank B") };
        let original = fingerprint(&[a.clone(), b.clone()]);
        assert_eq!(original, fingerprint(&[b.clone(), a.clone()]));

        let cache = cache();
        cache.put_with_fingerprint(&["a", "b"], sample_result(), original.clone());
        assert!(!cache.is_stale(&["b", "a"], &original));

        let renamed = BankSubmission { bank_id: "b".into(), bank_info: BankInfo::new("Bank B Ltd") };
        let changed = fingerprint(&[a, renamed]);
        assert_ne!(original, changed);
        assert!(cache.is_stale(&["a", "b"], &changed));
    }

    #[tokio::test]
    async fn put_publishes_canonical_key() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let cache = ComparisonCache::new(Arc::new(MemoryStorage::new()), events);
        cache.put(&["z", "y"], sample_result());
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::ComparisonCached { key: "y|z".into() }
        );
    }
}
