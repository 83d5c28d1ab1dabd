//! MITC: bank policy records and comparisons
//!
//! Keeps uploaded policy documents and their extracted fields in local
//! storage, submits documents to the extraction service, and memoizes
//! bank-to-bank comparisons by the set of banks compared.

pub mod cache;
pub mod client;
pub mod events;
pub mod fields;
pub mod records;
pub mod schema;
pub mod service;
pub mod storage;
pub mod upload;

pub use cache::{canonical_key, ComparisonCache, ComparisonCacheEntry};
pub use client::{ClientError, Comparator, Extractor, HttpBackend};
pub use events::{EventBus, StoreEvent};
pub use fields::{FieldCatalog, FieldSpec};
pub use records::{RecordStore, StatusSummary};
pub use schema::{BankInfo, ComparisonResult, ExtractionOutcome, FileRecord, FileStatus};
pub use service::{CompareError, PolicyDesk, UploadHandle};
pub use storage::{DirectoryStorage, KeyValueStore, MemoryStorage, StorageError};
pub use upload::UploadFile;
