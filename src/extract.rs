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

//! PDF text extraction.
//!
//! Extraction is best effort: encrypted, scanned or corrupt files produce an
//! empty string, never an error.

use futures::future::BoxFuture;
use tracing::{debug, warn};

/// Turns document bytes into plain text.
pub trait TextExtractor: Send + Sync {
    /// Returns the extracted text, or `""` when nothing can be extracted.
    fn extract<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, String>;
}

/// Extractor backed by the `pdf-extract` crate.
///
/// Parsing runs on the blocking pool; a panic inside the parser is caught by
/// the join handle and treated like any other extraction failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Returns true if the bytes start with the PDF magic header.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

impl TextExtractor for PdfTextExtractor {
    fn extract<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, String> {
        Box::pin(async move {
            if !looks_like_pdf(bytes) {
                debug!(len = bytes.len(), "input is not a PDF, skipping extraction");
                return String::new();
            }
            let owned = bytes.to_vec();
            match tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&owned))
                .await
            {
                Ok(Ok(text)) => text.trim().to_string(),
                Ok(Err(e)) => {
                    warn!("PDF text extraction failed: {}", e);
                    String::new()
                }
                Err(e) => {
                    warn!("PDF text extraction aborted: {}", e);
                    String::new()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_magic() {
        assert!(looks_like_pdf(b"%PDF-1.7\n..."));
        assert!(!looks_like_pdf(b"PK\x03\x04"));
        assert!(!looks_like_pdf(b""));
    }

    #[tokio::test]
    async fn non_pdf_bytes_yield_empty_text() {
        let text = PdfTextExtractor::new().extract(b"hello world").await;
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn corrupt_pdf_yields_empty_text() {
        let text = PdfTextExtractor::new()
            .extract(b"%PDF-1.4\nthis is not really a pdf")
            .await;
        assert_eq!(text, "");
    }
}
