//! Plain-text rendering of records and comparisons for the terminal.

use crate::mitc::{
    BankInfo, ComparisonResult, FieldCatalog, FileRecord, FileStatus, StatusSummary,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Write;

pub fn format_file_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

fn format_policy_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Policy date shown in listings: effective date, then updated date, then
/// upload time.
pub fn policy_date_label(record: &FileRecord) -> String {
    if let Some(info) = &record.bank_info {
        if let Some(date) = &info.effective_date {
            return format!("Effective: {}", format_policy_date(date));
        }
        if let Some(date) = &info.updated_date {
            return format!("Updated: {}", format_policy_date(date));
        }
    }
    format_upload_date(&record.upload_date)
}

fn format_upload_date(date: &DateTime<Utc>) -> String {
    date.format("%b %-d, %H:%M").to_string()
}

pub fn record_line(record: &FileRecord) -> String {
    let mut line = format!(
        "{:<36}  {:<10}  {}  {}  {}",
        record.id,
        record.status,
        record.filename,
        format_file_size(record.file_size),
        policy_date_label(record),
    );
    if let Some(name) = record.bank_name() {
        let _ = write!(line, "  [{name}]");
    }
    if let Some(info) = &record.bank_info {
        if !info.is_valid_mitc() {
            let reason = info
                .validation_reason
                .as_deref()
                .unwrap_or("Not a valid home loan MITC document");
            let _ = write!(line, "  (warning: {reason})");
        }
    }
    line
}

pub fn summary_line(summary: &StatusSummary) -> String {
    let mut line = format!(
        "{} files: {} processed, {} failed",
        summary.total(),
        summary.success,
        summary.failed
    );
    if summary.processing > 0 {
        let plural = if summary.processing == 1 { "" } else { "s" };
        let _ = write!(
            line,
            ", {} file{plural} currently being processed",
            summary.processing
        );
    }
    line
}

/// Full view of one record including every extracted field and citation.
pub fn record_detail(record: &FileRecord, fields: &FieldCatalog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File:     {}", record.filename);
    let _ = writeln!(out, "Id:       {}", record.id);
    let _ = writeln!(out, "Size:     {}", format_file_size(record.file_size));
    let _ = writeln!(out, "Uploaded: {}", record.upload_date.to_rfc3339());
    let status = match record.status {
        FileStatus::Processing => "Processing...".to_string(),
        other => other.to_string().to_uppercase(),
    };
    let _ = writeln!(out, "Status:   {status}");

    if let Some(message) = &record.error_message {
        let _ = writeln!(out, "Error:    {message}");
    }
    if let Some(info) = &record.bank_info {
        out.push('\n');
        out.push_str(&bank_info_detail(info, fields));
    }
    out
}

fn bank_info_detail(info: &BankInfo, fields: &FieldCatalog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Bank:     {}", info.bank_name);
    if !info.is_valid_mitc() {
        let _ = writeln!(
            out,
            "Warning:  {}",
            info.validation_reason
                .as_deref()
                .unwrap_or("Not a valid home loan MITC document")
        );
    }

    // Catalogue fields first in their configured order, then anything else
    // the service returned.
    let mut keys: Vec<&str> = fields.keys().filter(|k| info.fields.contains_key(*k)).collect();
    keys.extend(
        info.fields
            .keys()
            .map(String::as_str)
            .filter(|k| fields.get(k).is_none()),
    );

    for key in keys {
        let Some(field) = info.field(key) else { continue };
        let _ = writeln!(out, "\n{}", fields.display_name(key));
        if field.missing {
            let _ = writeln!(out, "  No information found for this field");
            continue;
        }
        if let Some(content) = &field.content {
            for line in content.lines() {
                let _ = writeln!(out, "  {line}");
            }
        }
        for (i, evidence) in field.evidence.iter().enumerate() {
            let page = evidence
                .page_number
                .map(|p| format!(" (page {p})"))
                .unwrap_or_default();
            let _ = writeln!(out, "  #{}{page}: \"{}\"", i + 1, evidence.line_snippet);
        }
    }
    out
}

/// One row per field, one `STATUS` cell per bank, in the order the banks
/// were first selected.
pub fn comparison_table(
    result: &ComparisonResult,
    bank_ids: &[String],
    fields: &FieldCatalog,
) -> String {
    let mut columns: Vec<&String> = Vec::with_capacity(bank_ids.len());
    for id in bank_ids {
        if !columns.contains(&id) {
            columns.push(id);
        }
    }
    let bank_names: Vec<String> = columns
        .iter()
        .map(|id| {
            result
                .comparison_table
                .iter()
                .find_map(|row| row.result_for(id))
                .map(|cell| cell.bank_name.clone())
                .unwrap_or_else(|| id.to_string())
        })
        .collect();

    let label_width = result
        .comparison_table
        .iter()
        .map(|row| fields.display_name(&row.field_name).len())
        .max()
        .unwrap_or(5)
        .max("Field".len());
    let cell_width = bank_names.iter().map(String::len).max().unwrap_or(0).max(8);

    let mut out = String::new();
    let _ = write!(out, "{:<label_width$}", "Field");
    for name in &bank_names {
        let _ = write!(out, "  {name:<cell_width$}");
    }
    out.push('\n');

    for row in &result.comparison_table {
        let _ = write!(out, "{:<label_width$}", fields.display_name(&row.field_name));
        for id in &columns {
            let cell = row
                .result_for(id)
                .map(|c| c.status.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = write!(out, "  {cell:<cell_width$}");
        }
        out.push('\n');
    }

    if !result.summary.is_empty() {
        let parts: Vec<String> = result
            .summary
            .iter()
            .map(|s| format!("{} {}", s.status, s.count))
            .collect();
        let _ = writeln!(out, "\nSummary: {}", parts.join(", "));
    }
    out
}

/// Drill-down into one field: each bank's verdict plus its extracted
/// content and citations.
pub fn comparison_detail(
    result: &ComparisonResult,
    field_key: &str,
    records: &[FileRecord],
    fields: &FieldCatalog,
) -> Option<String> {
    let row = result.row(field_key)?;
    let mut out = String::new();
    let _ = writeln!(out, "{}", fields.display_name(field_key));

    for cell in &row.bank_results {
        let _ = writeln!(out, "\n[{}] {}", cell.status, cell.bank_name);
        if let Some(record) = records.iter().find(|r| r.id == cell.bank_id) {
            let _ = writeln!(out, "  File: {}", record.filename);
        }
        if !cell.explanation.is_empty() {
            let _ = writeln!(out, "  Analysis: {}", cell.explanation);
        }
        if let Some(details) = &cell.details {
            let _ = writeln!(out, "  Details: {details}");
        }

        let field = records
            .iter()
            .find(|r| r.id == cell.bank_id)
            .and_then(|r| r.bank_info.as_ref())
            .and_then(|info| info.field(field_key));
        match field {
            Some(f) if f.missing => {
                let _ = writeln!(out, "  Content: No information found for this field");
            }
            Some(f) => {
                if let Some(content) = &f.content {
                    let _ = writeln!(out, "  Content: {content}");
                }
                for (i, evidence) in f.evidence.iter().enumerate() {
                    let page = evidence
                        .page_number
                        .map(|p| format!("page {p}: "))
                        .unwrap_or_default();
                    let _ = writeln!(out, "  Evidence #{} {page}\"{}\"", i + 1, evidence.line_snippet);
                }
            }
            None => {}
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mitc::schema::{BankResult, ComparisonRow, ComparisonStatus, Evidence, FieldWithEvidence};

    fn record(id: &str, info: Option<BankInfo>) -> FileRecord {
        FileRecord {
            id: id.into(),
            filename: format!("{id}.pdf"),
            file_size: 2 * 1024 * 1024,
            upload_date: Utc::now(),
            status: if info.is_some() { FileStatus::Success } else { FileStatus::Processing },
            bank_info: info,
            error_message: None,
        }
    }

    fn result() -> ComparisonResult {
        ComparisonResult {
            comparison_table: vec![ComparisonRow {
                field_name: "prepayment".into(),
                bank_results: vec![
                    BankResult {
                        bank_id: "a".into(),
                        bank_name: "Bank A".into(),
                        status: ComparisonStatus::Same,
                        explanation: "No charge on floating loans".into(),
                        details: None,
                    },
                    BankResult {
                        bank_id: "b".into(),
                        bank_name: "Bank B".into(),
                        status: ComparisonStatus::Missing,
                        explanation: String::new(),
                        details: None,
                    },
                ],
            }],
            summary: vec![],
        }
    }

    #[test]
    fn file_size_is_megabytes() {
        assert_eq!(format_file_size(2 * 1024 * 1024), "2.00 MB");
        assert_eq!(format_file_size(0), "0.00 MB");
    }

    #[test]
    fn effective_date_wins_over_upload_date() {
        let mut info = BankInfo::new("SBI");
        info.updated_date = Some("2023-01-10".into());
        info.effective_date = Some("2024-04-01".into());
        assert_eq!(policy_date_label(&record("a", Some(info))), "Effective: Apr 1, 2024");

        let mut info = BankInfo::new("SBI");
        info.updated_date = Some("sometime in 2023".into());
        assert_eq!(policy_date_label(&record("a", Some(info))), "Updated: sometime in 2023");
    }

    #[test]
    fn summary_mentions_processing_only_when_pending() {
        let done = StatusSummary { processing: 0, success: 2, failed: 1 };
        assert_eq!(summary_line(&done), "3 files: 2 processed, 1 failed");
        let pending = StatusSummary { processing: 1, success: 0, failed: 0 };
        assert!(summary_line(&pending).ends_with("1 file currently being processed"));
    }

    #[test]
    fn table_follows_selection_order() {
        let table = comparison_table(
            &result(),
            &["b".to_string(), "a".to_string()],
            &FieldCatalog::default(),
        );
        let header = table.lines().next().unwrap();
        assert!(header.find("Bank B").unwrap() < header.find("Bank A").unwrap());
        let row = table.lines().nth(1).unwrap();
        assert!(row.starts_with("Prepayment"));
        assert!(row.find("MISSING").unwrap() < row.find("SAME").unwrap());
    }

    #[test]
    fn repeated_bank_gets_one_column() {
        let ids = ["a".to_string(), "b".to_string(), "a".to_string()];
        let table = comparison_table(&result(), &ids, &FieldCatalog::default());
        let header = table.lines().next().unwrap();
        assert_eq!(header.matches("Bank A").count(), 1);
        let row = table.lines().nth(1).unwrap();
        assert_eq!(row.split_whitespace().count(), 3);
    }

    #[test]
    fn detail_shows_content_and_evidence() {
        let a = BankInfo::new("Bank A").with_field(
            "prepayment",
            FieldWithEvidence::found(
                "Nil for floating rate",
                vec![Evidence { page_number: Some(4), line_snippet: "No prepayment charges".into() }],
            ),
        );
        let b = BankInfo::new("Bank B").with_field("prepayment", FieldWithEvidence::missing());
        let records = vec![record("a", Some(a)), record("b", Some(b))];

        let detail =
            comparison_detail(&result(), "prepayment", &records, &FieldCatalog::default()).unwrap();
        assert!(detail.contains("[SAME] Bank A"));
        assert!(detail.contains("Evidence #1 page 4: \"No prepayment charges\""));
        assert!(detail.contains("No information found for this field"));
        assert!(comparison_detail(&result(), "tenure", &records, &FieldCatalog::default()).is_none());
    }
}
