use super::cache::{self, ComparisonCache};
use super::client::{ClientError, Comparator, Extractor};
use super::events::{EventBus, StoreEvent};
use super::records::RecordStore;
use super::schema::{
    BankSubmission, ComparisonResult, ExtractionOutcome, FileRecord, FileStatus,
};
use super::storage::KeyValueStore;
use super::upload::UploadFile;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Minimum number of distinct banks a comparison needs.
pub const MIN_COMPARISON_BANKS: usize = 2;

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("select at least {min} banks to compare (got {got})")]
    TooFewBanks { min: usize, got: usize },

    #[error("no uploaded file with id '{0}'")]
    UnknownBank(String),

    #[error("'{filename}' is {status}, only successfully processed files can be compared")]
    NotReady { filename: String, status: FileStatus },

    #[error("comparison failed: {0}")]
    Client(#[from] ClientError),
}

/// Placeholders created for an upload plus the task that fills them in.
pub struct UploadHandle {
    pub records: Vec<FileRecord>,
    pub task: JoinHandle<()>,
}

/// Ties the record store and comparison cache to the remote service.
#[derive(Clone)]
pub struct PolicyDesk {
    records: Arc<RecordStore>,
    cache: Arc<ComparisonCache>,
    extractor: Arc<dyn Extractor>,
    comparator: Arc<dyn Comparator>,
    events: EventBus,
}

impl PolicyDesk {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        extractor: Arc<dyn Extractor>,
        comparator: Arc<dyn Comparator>,
    ) -> Self {
        let events = EventBus::new();
        Self {
            records: Arc::new(RecordStore::new(storage.clone(), events.clone())),
            cache: Arc::new(ComparisonCache::new(storage, events.clone())),
            extractor,
            comparator,
            events,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn cache(&self) -> &ComparisonCache {
        &self.cache
    }

    /// Change notifications for both the record store and the cache.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Create one `Processing` record per file and hand the batch to the
    /// extractor in the background. Must be called inside a tokio runtime.
    ///
    /// Results are matched to records by position. The returned task can be
    /// awaited or dropped; dropping it does not cancel the extraction.
    pub fn upload(&self, files: Vec<UploadFile>) -> UploadHandle {
        let records: Vec<FileRecord> = files
            .iter()
            .map(|f| self.records.create(&f.filename, f.size()))
            .collect();
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        let store = self.records.clone();
        let extractor = self.extractor.clone();
        let task = tokio::spawn(async move {
            process_batch(store, extractor, ids, files).await;
        });

        UploadHandle { records, task }
    }

    /// Compare the given banks, serving from the cache when this exact set
    /// was compared before. A cached result is served even if some of its
    /// banks have since been deleted. `refresh` skips the cache lookup but
    /// still writes the new result through.
    pub async fn compare(
        &self,
        bank_ids: &[String],
        refresh: bool,
    ) -> Result<ComparisonResult, CompareError> {
        let key = cache::canonical_key(bank_ids);
        let mut distinct: Vec<&String> = bank_ids.iter().collect();
        distinct.sort();
        distinct.dedup();
        if distinct.len() < MIN_COMPARISON_BANKS {
            return Err(CompareError::TooFewBanks {
                min: MIN_COMPARISON_BANKS,
                got: distinct.len(),
            });
        }

        if !refresh {
            if let Some(entry) = self.cache.entry(bank_ids) {
                if let (Some(cached), Ok(banks)) =
                    (entry.fingerprint.as_deref(), self.submissions(&distinct))
                {
                    if cached != cache::fingerprint(&banks) {
                        tracing::warn!(%key, "cached comparison predates changes to bank data");
                    }
                }
                tracing::debug!(%key, "comparison served from cache");
                return Ok(entry.result);
            }
        }

        let banks = self.submissions(&distinct)?;
        let fingerprint = cache::fingerprint(&banks);
        let result = self.comparator.compare(banks).await.map_err(|e| {
            tracing::error!(%key, error = %e, "comparison request failed");
            e
        })?;

        let cache = self.cache.clone();
        let ids = bank_ids.to_vec();
        let stored = result.clone();
        let written = tokio::task::spawn_blocking(move || {
            cache.put_with_fingerprint(&ids[..], stored, fingerprint)
        })
        .await;
        if let Err(e) = written {
            tracing::error!(%key, error = %e, "failed to cache comparison");
        }
        Ok(result)
    }

    fn submissions(&self, ids: &[&String]) -> Result<Vec<BankSubmission>, CompareError> {
        let records = self.records.list();
        ids.iter()
            .map(|id| {
                let record = records
                    .iter()
                    .find(|r| &r.id == *id)
                    .ok_or_else(|| CompareError::UnknownBank(id.to_string()))?;
                match (&record.status, &record.bank_info) {
                    (FileStatus::Success, Some(info)) => Ok(BankSubmission {
                        bank_id: record.id.clone(),
                        bank_info: info.clone(),
                    }),
                    _ => Err(CompareError::NotReady {
                        filename: record.filename.clone(),
                        status: record.status,
                    }),
                }
            })
            .collect()
    }
}

async fn process_batch(
    store: Arc<RecordStore>,
    extractor: Arc<dyn Extractor>,
    ids: Vec<String>,
    files: Vec<UploadFile>,
) {
    let updates: Vec<(String, ExtractionOutcome)> = match extractor.submit(files).await {
        Ok(response) => {
            if response.results.len() != ids.len() {
                tracing::warn!(
                    submitted = ids.len(),
                    returned = response.results.len(),
                    "extraction result count does not match submitted files"
                );
            }
            let mut results = response.results.into_iter();
            ids.into_iter()
                .map(|id| {
                    let outcome = match results.next() {
                        Some(entry) => entry.into_outcome(),
                        None => {
                            ExtractionOutcome::Failed("No result returned for file".to_string())
                        }
                    };
                    (id, outcome)
                })
                .collect()
        }
        Err(e) => {
            tracing::error!(error = %e, files = ids.len(), "upload failed");
            let message = format!("Upload failed: {e}");
            ids.into_iter()
                .map(|id| (id, ExtractionOutcome::Failed(message.clone())))
                .collect()
        }
    };

    // Record writes block on file I/O.
    let applied = tokio::task::spawn_blocking(move || {
        for (id, outcome) in updates {
            store.update(&id, outcome);
        }
    })
    .await;
    if let Err(e) = applied {
        tracing::error!(error = %e, "failed to record extraction results");
    }
}
