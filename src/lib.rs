//! mitc-compare: bank MITC policy uploads and side-by-side comparisons.
//!
//! Policy PDFs are sent to an extraction service; the extracted fields are
//! kept in a local record store, and bank-to-bank comparisons are memoized
//! by the set of banks compared. See [`mitc::PolicyDesk`] for the entry
//! point.

pub mod config;
pub mod display;
pub mod mitc;

pub use config::Config;
pub use mitc::{
    canonical_key, BankInfo, ComparisonCache, ComparisonResult, DirectoryStorage, FileRecord,
    FileStatus, HttpBackend, KeyValueStore, MemoryStorage, PolicyDesk, RecordStore, StoreEvent,
    UploadFile,
};
