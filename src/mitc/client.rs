//! Typed access to the extraction/comparison service.
//!
//! `POST /process-pdfs` takes a multipart body with one `files` part per
//! document and answers with per-file results; a rejected document is a
//! per-file failure, not an HTTP error. `POST /compare-banks` takes the
//! extracted info of two or more banks and answers with a comparison table.
//! Only transport failures (network, non-2xx, undecodable body) are errors.

use super::schema::{
    BankSubmission, CompareBanksRequest, ComparisonResult, ProcessPdfsResponse,
};
use super::upload::UploadFile;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        source: reqwest::Error,
    },

    #[error("invalid upload part for '{filename}': {source}")]
    InvalidPart {
        filename: String,
        source: reqwest::Error,
    },
}

const PROCESS_PDFS: &str = "/process-pdfs";
const COMPARE_BANKS: &str = "/compare-banks";

/// Submits documents for field extraction.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn submit(&self, files: Vec<UploadFile>) -> Result<ProcessPdfsResponse, ClientError>;
}

/// Compares the extracted info of two or more banks.
#[async_trait]
pub trait Comparator: Send + Sync {
    async fn compare(&self, banks: Vec<BankSubmission>) -> Result<ComparisonResult, ClientError>;
}

/// reqwest-backed client for both endpoints.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|source| ClientError::Transport {
            endpoint: "client setup",
            source,
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        endpoint: &'static str,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| ClientError::Decode { endpoint, source })
    }
}

#[async_trait]
impl Extractor for HttpBackend {
    async fn submit(&self, files: Vec<UploadFile>) -> Result<ProcessPdfsResponse, ClientError> {
        let count = files.len();
        let mut form = Form::new();
        for file in files {
            let mime = file.mime_type();
            let filename = file.filename;
            let part = Part::bytes(file.data)
                .file_name(filename.clone())
                .mime_str(mime)
                .map_err(|source| ClientError::InvalidPart { filename, source })?;
            form = form.part("files", part);
        }

        tracing::info!(files = count, url = %self.url(PROCESS_PDFS), "submitting documents for extraction");
        let response = self
            .client
            .post(self.url(PROCESS_PDFS))
            .multipart(form)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: PROCESS_PDFS,
                source,
            })?;

        let body: ProcessPdfsResponse = Self::read_json(PROCESS_PDFS, response).await?;
        tracing::info!(
            total = body.total_processed,
            successful = body.successful,
            failed = body.failed,
            "extraction finished"
        );
        Ok(body)
    }
}

#[async_trait]
impl Comparator for HttpBackend {
    async fn compare(&self, banks: Vec<BankSubmission>) -> Result<ComparisonResult, ClientError> {
        tracing::info!(banks = banks.len(), url = %self.url(COMPARE_BANKS), "requesting bank comparison");
        let response = self
            .client
            .post(self.url(COMPARE_BANKS))
            .json(&CompareBanksRequest { banks })
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: COMPARE_BANKS,
                source,
            })?;

        let result: ComparisonResult = Self::read_json(COMPARE_BANKS, response).await?;
        tracing::debug!(rows = result.comparison_table.len(), "comparison received");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mitc::schema::{BankInfo, ComparisonStatus, FileStatus, ResultStatus};
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    // Mirrors the service: non-PDFs fail inline, PDFs succeed with the
    // file stem as the bank name.
    async fn process_pdfs(mut multipart: Multipart) -> Json<Value> {
        let mut results = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            assert_eq!(field.name(), Some("files"));
            let filename = field.file_name().unwrap().to_string();
            let content_type = field.content_type().map(str::to_string);
            let _ = field.bytes().await.unwrap();
            if content_type.as_deref() == Some("application/pdf") {
                let bank = filename.trim_end_matches(".pdf").to_string();
                results.push(json!({
                    "filename": filename,
                    "status": "success",
                    "bank_info": {"bank_name": bank, "tenure": {"missing": true}}
                }));
            } else {
                results.push(json!({
                    "filename": filename,
                    "status": "failed",
                    "error_message": "File is not a PDF"
                }));
            }
        }
        let successful = results.iter().filter(|r| r["status"] == "success").count();
        Json(json!({
            "total_processed": results.len(),
            "successful": successful,
            "failed": results.len() - successful,
            "results": results,
        }))
    }

    async fn compare_banks(Json(body): Json<Value>) -> Json<Value> {
        let banks = body["banks"].as_array().unwrap();
        let cells: Vec<Value> = banks
            .iter()
            .map(|b| {
                json!({
                    "bank_id": b["bank_id"],
                    "bank_name": b["bank_info"]["bank_name"],
                    "status": "MISSING",
                    "explanation": "Not stated"
                })
            })
            .collect();
        Json(json!({
            "comparison_table": [{"field_name": "tenure", "bank_results": cells}],
            "summary": [{"status": "MISSING", "count": banks.len()}]
        }))
    }

    #[tokio::test]
    async fn submit_sends_one_part_per_file() {
        let base = spawn_backend(Router::new().route("/process-pdfs", post(process_pdfs))).await;
        let backend = HttpBackend::new(&base, None).unwrap();

        let response = backend
            .submit(vec![
                UploadFile::new("HDFC.pdf", b"%PDF".to_vec()),
                UploadFile::new("notes.txt", b"hello".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(response.total_processed, 2);
        assert_eq!(response.successful, 1);
        let hdfc = response.results[0].parsed().unwrap();
        assert_eq!(hdfc.status, ResultStatus::Success);
        assert_eq!(hdfc.bank_info.as_ref().unwrap().bank_name, "HDFC");
        assert_eq!(
            response.results[1].clone().into_outcome().status(),
            FileStatus::Failed
        );
        assert_eq!(
            response.results[1].parsed().unwrap().error_message.as_deref(),
            Some("File is not a PDF")
        );
    }

    #[tokio::test]
    async fn compare_posts_bank_info() {
        let base = spawn_backend(Router::new().route("/compare-banks", post(compare_banks))).await;
        let backend = HttpBackend::new(&format!("{base}/"), None).unwrap();

        let result = backend
            .compare(vec![
                BankSubmission { bank_id: "1".into(), bank_info: BankInfo::new("SBI") },
                BankSubmission { bank_id: "2".into(), bank_info: BankInfo::new("Axis") },
            ])
            .await
            .unwrap();

        let row = result.row("tenure").unwrap();
        assert_eq!(row.result_for("2").unwrap().bank_name, "Axis");
        assert_eq!(result.summary[0].status, ComparisonStatus::Missing);
        assert_eq!(result.summary[0].count, 2);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let app = Router::new().route(
            "/compare-banks",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded") }),
        );
        let base = spawn_backend(app).await;
        let backend = HttpBackend::new(&base, None).unwrap();

        let err = backend.compare(vec![]).await.unwrap_err();
        match err {
            ClientError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = HttpBackend::new(&format!("http://{addr}"), Some(Duration::from_secs(5))).unwrap();
        let err = backend.submit(vec![UploadFile::new("a.pdf", vec![1])]).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport { .. }));
    }
}
