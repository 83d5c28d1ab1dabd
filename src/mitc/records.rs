use super::events::{EventBus, StoreEvent};
use super::schema::{ExtractionOutcome, FileRecord, FileStatus};
use super::storage::KeyValueStore;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Storage key of the record blob.
pub const RECORDS_KEY: &str = "multi-bank-files";

/// Counts of records per lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub processing: usize,
    pub success: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.processing + self.success + self.failed
    }
}

/// Uploaded-file records persisted as one JSON array, newest first.
///
/// Each mutation reloads the blob, edits it, and writes the whole thing back.
/// The cycle runs under `write_lock`, so completions racing inside this
/// process cannot overwrite each other.
pub struct RecordStore {
    storage: Arc<dyn KeyValueStore>,
    events: EventBus,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self {
            storage,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// All records, most recently created first. Absent or unreadable
    /// storage reads as empty.
    pub fn list(&self) -> Vec<FileRecord> {
        let raw = match self.storage.get_item(RECORDS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::error!(error = %e, "failed to read file records");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "stored file records are corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<FileRecord> {
        self.list().into_iter().find(|r| r.id == id)
    }

    /// Insert a `Processing` placeholder for a freshly submitted document.
    pub fn create(&self, filename: &str, file_size: u64) -> FileRecord {
        let record = FileRecord {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            file_size,
            upload_date: Utc::now(),
            status: FileStatus::Processing,
            bank_info: None,
            error_message: None,
        };

        {
            let _guard = self.write_lock.lock();
            let mut records = self.list();
            records.insert(0, record.clone());
            self.save(&records);
        }

        tracing::debug!(id = %record.id, filename, file_size, "created file record");
        self.events.publish(StoreEvent::RecordCreated { id: record.id.clone() });
        record
    }

    /// Record the extraction outcome. Returns false without touching storage
    /// when the record is gone or already terminal.
    pub fn update(&self, id: &str, outcome: ExtractionOutcome) -> bool {
        let status = outcome.status();
        {
            let _guard = self.write_lock.lock();
            let mut records = self.list();
            let Some(record) = records.iter_mut().find(|r| r.id == id) else {
                tracing::debug!(id, "ignoring result for deleted file record");
                return false;
            };
            if record.status.is_terminal() {
                tracing::warn!(id, current = %record.status, "ignoring result for finished file record");
                return false;
            }
            record.apply(outcome);
            self.save(&records);
        }

        tracing::info!(id, %status, "file record updated");
        self.events.publish(StoreEvent::RecordUpdated {
            id: id.to_string(),
            status,
        });
        true
    }

    /// Remove a record. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        {
            let _guard = self.write_lock.lock();
            let mut records = self.list();
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return false;
            }
            self.save(&records);
        }

        self.events.publish(StoreEvent::RecordDeleted { id: id.to_string() });
        true
    }

    pub fn clear(&self) {
        {
            let _guard = self.write_lock.lock();
            if let Err(e) = self.storage.remove_item(RECORDS_KEY) {
                tracing::error!(error = %e, "failed to clear file records");
            }
        }
        self.events.publish(StoreEvent::RecordsCleared);
    }

    pub fn summary(&self) -> StatusSummary {
        self.list()
            .iter()
            .fold(StatusSummary::default(), |mut acc, r| {
                match r.status {
                    FileStatus::Processing => acc.processing += 1,
                    FileStatus::Success => acc.success += 1,
                    FileStatus::Failed => acc.failed += 1,
                }
                acc
            })
    }

    /// Successfully extracted records that name a bank; the candidates for
    /// comparison.
    pub fn available_banks(&self) -> Vec<FileRecord> {
        self.list()
            .into_iter()
            .filter(|r| r.status == FileStatus::Success && r.bank_name().is_some())
            .collect()
    }

    // Write failures are logged and dropped; callers keep their in-memory value.
    fn save(&self, records: &[FileRecord]) {
        let json = match serde_json::to_string(records) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode file records");
                return;
            }
        };
        if let Err(e) = self.storage.set_item(RECORDS_KEY, &json) {
            tracing::error!(error = %e, "failed to persist file records");
        }
    }
}
