// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ingestion flow: uploaded bytes become a stored [`Document`].
//!
//! The blob is stored first; a storage failure aborts the upload. Text
//! extraction never fails, an unreadable PDF simply yields a document
//! without text.

use crate::base::{AccountId, DocumentId};
use crate::document::{Document, DocumentStore};
use crate::error::ServiceError;
use crate::extract::TextExtractor;
use crate::storage::BlobStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of an ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingested {
    pub document_id: DocumentId,
    pub has_text: bool,
}

/// Remote file fetched for `upload-by-url`.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    /// Last path segment of the URL, if it looks like a file name.
    pub file_name: Option<String>,
}

pub struct IngestFlow {
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    documents: Arc<dyn DocumentStore>,
    http: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl IngestFlow {
    pub const DEFAULT_NAME: &'static str = "brief.pdf";

    pub fn new(
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        documents: Arc<dyn DocumentStore>,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        Ok(Self {
            blobs,
            extractor,
            documents,
            http,
            max_bytes,
            timeout,
        })
    }

    /// Stores, extracts and records an uploaded file.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] - empty or oversized body.
    /// - [`ServiceError::Storage`] - the blob store failed or timed out.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        original_name: Option<&str>,
        account_id: Option<&str>,
    ) -> Result<Ingested, ServiceError> {
        if bytes.is_empty() {
            return Err(ServiceError::Validation("uploaded file is empty".into()));
        }
        if bytes.len() > self.max_bytes {
            return Err(ServiceError::Validation(format!(
                "uploaded file exceeds {} bytes",
                self.max_bytes
            )));
        }

        let document_id = DocumentId::generate();
        let owner = AccountId::resolve(account_id);
        let original_name = original_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(Self::DEFAULT_NAME)
            .to_string();
        let storage_key = format!("briefs/{}-{}", document_id, sanitize_file_name(&original_name));

        match tokio::time::timeout(
            self.timeout,
            self.blobs.put(&storage_key, bytes, "application/pdf"),
        )
        .await
        {
            Ok(Ok(location)) => debug!("Stored upload at {}", location),
            Ok(Err(e)) => {
                warn!(key = %storage_key, "blob upload failed: {}", e);
                return Err(ServiceError::Storage(e.to_string()));
            }
            Err(_) => {
                warn!(key = %storage_key, "blob upload timed out");
                return Err(ServiceError::Storage(format!(
                    "upload timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        }

        let extracted_text = self.extractor.extract(bytes).await;
        let document = Document {
            document_id: document_id.clone(),
            extracted_text,
            owner_account_id: owner,
            storage_key,
            original_name,
            uploaded_at: Utc::now(),
        };
        let has_text = document.has_text();
        info!(
            document = %document_id,
            account = %document.owner_account_id,
            name = %document.original_name,
            has_text,
            "document ingested"
        );
        if !self.documents.put(document) {
            warn!(document = %document_id, "document id already recorded");
            return Err(ServiceError::Storage(format!(
                "document {document_id} could not be recorded"
            )));
        }

        Ok(Ingested {
            document_id,
            has_text,
        })
    }

    /// Downloads a file for ingestion.
    ///
    /// Only `http` and `https` URLs are fetched. The body is read in chunks
    /// and the download stops as soon as it passes the upload limit.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] - bad URL, unreachable host, non-2xx reply or oversized file.
    /// - [`ServiceError::DownloadTimeout`] - the host did not answer in time.
    pub async fn fetch_remote(&self, file_url: &str) -> Result<FetchedFile, ServiceError> {
        let url = validate_fetch_url(file_url)?;

        let mut response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.download_error(&url, e))?;
        if !response.status().is_success() {
            return Err(ServiceError::Validation(format!(
                "failed to download '{url}': HTTP {}",
                response.status()
            )));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large());
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.download_error(&url, e))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        info!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(FetchedFile {
            bytes,
            file_name: file_name_from_url(&url),
        })
    }

    fn download_error(&self, url: &reqwest::Url, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            warn!(url = %url, "download timed out");
            ServiceError::DownloadTimeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            ServiceError::Validation(format!("failed to download '{url}': {e}"))
        }
    }

    fn too_large(&self) -> ServiceError {
        ServiceError::Validation(format!("remote file exceeds {} bytes", self.max_bytes))
    }
}

/// Parses a download URL, accepting only `http` and `https`.
pub fn validate_fetch_url(file_url: &str) -> Result<reqwest::Url, ServiceError> {
    let trimmed = file_url.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation("fileUrl is required".into()));
    }
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| ServiceError::Validation(format!("invalid fileUrl '{trimmed}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ServiceError::Validation(format!(
            "unsupported URL scheme '{other}', only http and https can be fetched"
        ))),
    }
}

fn file_name_from_url(url: &reqwest::Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|last| !last.is_empty() && last.contains('.'))
        .map(str::to_string)
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        IngestFlow::DEFAULT_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}
