use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processing,
    Success,
    Failed,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, FileStatus::Processing)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Processing => "processing",
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

/// One uploaded policy document and its extraction state.
///
/// Persisted in camelCase. `bank_info` is only present once the record is
/// `Success`, `error_message` only once it is `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub file_size: u64,
    pub upload_date: DateTime<Utc>,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_info: Option<BankInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FileRecord {
    /// Bank name, only for records that extracted successfully.
    pub fn bank_name(&self) -> Option<&str> {
        self.bank_info
            .as_ref()
            .map(|info| info.bank_name.as_str())
            .filter(|name| !name.trim().is_empty())
    }

    pub(crate) fn apply(&mut self, outcome: ExtractionOutcome) {
        match outcome {
            ExtractionOutcome::Success(info) => {
                self.status = FileStatus::Success;
                self.bank_info = Some(info);
                self.error_message = None;
            }
            ExtractionOutcome::Failed(message) => {
                self.status = FileStatus::Failed;
                self.bank_info = None;
                self.error_message = Some(message);
            }
        }
    }
}

/// Terminal result of extracting one document.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Success(BankInfo),
    Failed(String),
}

impl ExtractionOutcome {
    pub fn status(&self) -> FileStatus {
        match self {
            ExtractionOutcome::Success(_) => FileStatus::Success,
            ExtractionOutcome::Failed(_) => FileStatus::Failed,
        }
    }
}

/// Structured fields the service extracted from one policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankInfo {
    pub bank_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid_home_loan_mitc: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,
    /// Every other key is a comparison field.
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldWithEvidence>,
}

impl BankInfo {
    pub fn new(bank_name: impl Into<String>) -> Self {
        Self {
            bank_name: bank_name.into(),
            is_valid_home_loan_mitc: None,
            validation_reason: None,
            effective_date: None,
            updated_date: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, field: FieldWithEvidence) -> Self {
        self.fields.insert(key.into(), field);
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldWithEvidence> {
        self.fields.get(key)
    }

    /// Documents are treated as valid unless the service says otherwise.
    pub fn is_valid_mitc(&self) -> bool {
        self.is_valid_home_loan_mitc.unwrap_or(true)
    }
}

/// A value that is either missing from the document or carries content
/// plus page citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FieldRepr")]
pub struct FieldWithEvidence {
    pub missing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub evidence: Vec<Evidence>,
}

impl FieldWithEvidence {
    pub fn missing() -> Self {
        Self { missing: true, content: None, evidence: Vec::new() }
    }

    pub fn found(content: impl Into<String>, evidence: Vec<Evidence>) -> Self {
        Self { missing: false, content: Some(content.into()), evidence }
    }
}

// Older service builds send plain strings, models occasionally emit null,
// and stray scalar keys show up next to the real fields.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldRepr {
    Full {
        #[serde(default)]
        missing: bool,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        evidence: Option<Vec<Evidence>>,
    },
    Text(String),
    Other(serde_json::Value),
}

impl From<FieldRepr> for FieldWithEvidence {
    fn from(repr: FieldRepr) -> Self {
        match repr {
            FieldRepr::Full { missing, content, evidence } => Self {
                missing,
                content,
                evidence: evidence.unwrap_or_default(),
            },
            FieldRepr::Text(text) if text.trim().is_empty() => Self::missing(),
            FieldRepr::Text(text) => Self::found(text, Vec::new()),
            FieldRepr::Other(serde_json::Value::Null) => Self::missing(),
            FieldRepr::Other(value) => Self::found(value.to_string(), Vec::new()),
        }
    }
}

/// A citation backing an extracted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub line_snippet: String,
}

/// Per-file entry of a `/process-pdfs` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfProcessResult {
    pub filename: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_info: Option<BankInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PdfProcessResult {
    /// Map the wire result onto a record outcome. A "success" without a
    /// payload is treated as a failure.
    pub fn into_outcome(self) -> ExtractionOutcome {
        match (self.status, self.bank_info) {
            (ResultStatus::Success, Some(info)) => ExtractionOutcome::Success(info),
            (ResultStatus::Success, None) => {
                ExtractionOutcome::Failed("Service returned no extracted information".to_string())
            }
            (ResultStatus::Failed, _) => ExtractionOutcome::Failed(
                self.error_message
                    .unwrap_or_else(|| "Extraction failed".to_string()),
            ),
        }
    }
}

/// One per-file entry of a `/process-pdfs` response as received. An entry
/// that does not decode fails its own file and leaves the rest intact.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEntry {
    Parsed(PdfProcessResult),
    Invalid(String),
}

impl ExtractionEntry {
    pub fn parsed(&self) -> Option<&PdfProcessResult> {
        match self {
            ExtractionEntry::Parsed(result) => Some(result),
            ExtractionEntry::Invalid(_) => None,
        }
    }

    pub fn into_outcome(self) -> ExtractionOutcome {
        match self {
            ExtractionEntry::Parsed(result) => result.into_outcome(),
            ExtractionEntry::Invalid(reason) => {
                ExtractionOutcome::Failed(format!("Invalid extraction result: {reason}"))
            }
        }
    }
}

impl From<PdfProcessResult> for ExtractionEntry {
    fn from(result: PdfProcessResult) -> Self {
        ExtractionEntry::Parsed(result)
    }
}

impl<'de> Deserialize<'de> for ExtractionEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match serde_json::from_value::<PdfProcessResult>(value) {
            Ok(result) => ExtractionEntry::Parsed(result),
            Err(e) => ExtractionEntry::Invalid(e.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

/// Body of a `/process-pdfs` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessPdfsResponse {
    pub results: Vec<ExtractionEntry>,
    #[serde(default)]
    pub total_processed: usize,
    #[serde(default)]
    pub successful: usize,
    #[serde(default)]
    pub failed: usize,
}

/// One bank submitted for comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankSubmission {
    pub bank_id: String,
    pub bank_info: BankInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareBanksRequest {
    pub banks: Vec<BankSubmission>,
}

/// Per-cell verdict of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComparisonStatus {
    Same,
    Diff,
    Missing,
    Suspect,
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonStatus::Same => "SAME",
            ComparisonStatus::Diff => "DIFF",
            ComparisonStatus::Missing => "MISSING",
            ComparisonStatus::Suspect => "SUSPECT",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankResult {
    pub bank_id: String,
    pub bank_name: String,
    pub status: ComparisonStatus,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub field_name: String,
    pub bank_results: Vec<BankResult>,
}

impl ComparisonRow {
    pub fn result_for(&self, bank_id: &str) -> Option<&BankResult> {
        self.bank_results.iter().find(|r| r.bank_id == bank_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: ComparisonStatus,
    pub count: usize,
}

/// Body of a `/compare-banks` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub comparison_table: Vec<ComparisonRow>,
    #[serde(default)]
    pub summary: Vec<StatusCount>,
}

impl ComparisonResult {
    pub fn row(&self, field_name: &str) -> Option<&ComparisonRow> {
        self.comparison_table.iter().find(|r| r.field_name == field_name)
    }
}
