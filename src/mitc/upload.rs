use anyhow::{Context, Result};
use std::path::Path;

/// A document queued for extraction: its name and raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }

    /// Read a document from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Path has no usable file name: {}", path.display()))?
            .to_string();
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self { filename, data })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn mime_type(&self) -> &'static str {
        guess_mime_type(&self.filename)
    }

    /// The service only extracts from PDFs and rejects anything else per file.
    pub fn looks_like_pdf(&self) -> bool {
        self.mime_type() == "application/pdf"
    }
}

/// Guess MIME type from filename extension.
pub fn guess_mime_type(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn guesses_pdf_case_insensitively() {
        assert_eq!(guess_mime_type("SBI_MITC.PDF"), "application/pdf");
        assert_eq!(guess_mime_type("notes.txt"), "text/plain");
        assert_eq!(guess_mime_type("no_extension"), "application/octet-stream");
    }

    #[test]
    fn from_path_keeps_only_the_file_name() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hdfc.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let file = UploadFile::from_path(&path).unwrap();
        assert_eq!(file.filename, "hdfc.pdf");
        assert_eq!(file.size(), 8);
        assert!(file.looks_like_pdf());
    }

    #[test]
    fn from_path_reports_missing_files() {
        let tmp = TempDir::new().unwrap();
        let err = UploadFile::from_path(&tmp.path().join("missing.pdf")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
