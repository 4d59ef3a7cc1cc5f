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

//! Ingestion flow integration tests.

mod common;

use axum::{Router, body::Body, routing::get};
use brief_ledger_rs::{
    AccountId, Document, DocumentId, DocumentStore, InMemoryDocumentStore, IngestFlow,
    LocalBlobStore, PdfTextExtractor, ServiceError,
};
use common::{HeaderStrippingExtractor, MemoryBlobStore, fake_pdf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;

struct Fixture {
    blobs: Arc<MemoryBlobStore>,
    documents: Arc<InMemoryDocumentStore>,
    flow: IngestFlow,
}

fn fixture(max_bytes: usize) -> Fixture {
    fixture_with_timeout(max_bytes, Duration::from_secs(5))
}

fn fixture_with_timeout(max_bytes: usize, timeout: Duration) -> Fixture {
    let blobs = Arc::new(MemoryBlobStore::new());
    let documents = Arc::new(InMemoryDocumentStore::new());
    let flow = IngestFlow::new(
        blobs.clone(),
        Arc::new(HeaderStrippingExtractor),
        documents.clone(),
        max_bytes,
        timeout,
    )
    .unwrap();
    Fixture {
        blobs,
        documents,
        flow,
    }
}

#[tokio::test]
async fn upload_stores_blob_and_document() {
    let f = fixture(1024);
    let bytes = fake_pdf("Petitioner seeks review of the agency order.");

    let ingested = f
        .flow
        .ingest(&bytes, Some("Opening Brief.pdf"), Some("user-1"))
        .await
        .unwrap();

    assert!(ingested.has_text);
    let document = f.documents.get(&ingested.document_id).unwrap();
    assert_eq!(document.owner_account_id, AccountId::new("user-1"));
    assert_eq!(document.original_name, "Opening Brief.pdf");
    assert_eq!(
        document.extracted_text,
        "Petitioner seeks review of the agency order."
    );
    assert_eq!(
        document.storage_key,
        format!("briefs/{}-Opening_Brief.pdf", ingested.document_id)
    );
    assert_eq!(
        f.blobs.blobs.get(&document.storage_key).unwrap().value(),
        &bytes
    );
}

#[tokio::test]
async fn defaults_apply_without_name_or_account() {
    let f = fixture(1024);
    let ingested = f.flow.ingest(&fake_pdf("x"), None, None).await.unwrap();

    let document = f.documents.get(&ingested.document_id).unwrap();
    assert!(document.owner_account_id.is_anonymous());
    assert_eq!(document.original_name, "brief.pdf");
}

#[tokio::test]
async fn unreadable_file_is_stored_without_text() {
    let f = fixture(1024);
    let ingested = f
        .flow
        .ingest(b"GIF89a not a pdf", Some("scan.gif"), None)
        .await
        .unwrap();

    assert!(!ingested.has_text);
    assert_eq!(f.documents.len(), 1);
    assert_eq!(f.blobs.blobs.len(), 1);
}

#[tokio::test]
async fn every_upload_gets_a_fresh_id() {
    let f = fixture(1024);
    let a = f.flow.ingest(&fake_pdf("same"), None, None).await.unwrap();
    let b = f.flow.ingest(&fake_pdf("same"), None, None).await.unwrap();
    assert_ne!(a.document_id, b.document_id);
    assert_eq!(f.documents.len(), 2);
}

#[tokio::test]
async fn empty_and_oversized_uploads_are_rejected() {
    let f = fixture(16);
    assert!(matches!(
        f.flow.ingest(b"", None, None).await,
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        f.flow.ingest(&[b'a'; 17], None, None).await,
        Err(ServiceError::Validation(_))
    ));
    assert!(f.documents.is_empty());
}

#[tokio::test]
async fn storage_failure_aborts_ingestion() {
    let f = fixture(1024);
    f.blobs.fail.store(true, Ordering::SeqCst);

    let result = f.flow.ingest(&fake_pdf("text"), None, None).await;

    assert!(matches!(result, Err(ServiceError::Storage(_))));
    assert!(f.documents.is_empty());
}

/// Store that refuses every document, as if its id were already taken.
struct FullDocumentStore;

impl DocumentStore for FullDocumentStore {
    fn get(&self, _document_id: &DocumentId) -> Option<Arc<Document>> {
        None
    }

    fn put(&self, _document: Document) -> bool {
        false
    }
}

#[tokio::test]
async fn rejected_document_record_fails_ingestion() {
    let flow = IngestFlow::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::new(HeaderStrippingExtractor),
        Arc::new(FullDocumentStore),
        1024,
        Duration::from_secs(5),
    )
    .unwrap();

    let result = flow.ingest(&fake_pdf("text"), None, None).await;

    assert!(matches!(result, Err(ServiceError::Storage(_))));
}

#[tokio::test]
async fn local_blob_store_with_real_extractor() {
    let dir = tempfile::tempdir().unwrap();
    let documents = Arc::new(InMemoryDocumentStore::new());
    let flow = IngestFlow::new(
        Arc::new(LocalBlobStore::new(dir.path())),
        Arc::new(PdfTextExtractor::new()),
        documents.clone(),
        1024,
        Duration::from_secs(5),
    )
    .unwrap();

    let ingested = flow
        .ingest(b"%PDF-1.4 truncated", Some("reply.pdf"), Some("user-1"))
        .await
        .unwrap();

    assert!(!ingested.has_text);
    let document = documents.get(&ingested.document_id).unwrap();
    let on_disk = std::fs::read(dir.path().join(&document.storage_key)).unwrap();
    assert_eq!(on_disk, b"%PDF-1.4 truncated");
}

async fn serve_files() -> String {
    let app = Router::new()
        .route(
            "/files/reply-brief.pdf",
            get(|| async { fake_pdf("Respondent's reply.") }),
        )
        // Chunked body, no Content-Length.
        .route(
            "/files/streamed.pdf",
            get(|| async {
                let chunks = vec![
                    Ok::<_, std::io::Error>(b"%PDF-1.4 ".to_vec()),
                    Ok(b"streamed ".to_vec()),
                    Ok(b"brief".to_vec()),
                ];
                Body::from_stream(futures::stream::iter(chunks))
            }),
        )
        .route(
            "/files/slow.pdf",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                fake_pdf("Late reply.")
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fetch_remote_downloads_and_names_file() {
    let base = serve_files().await;
    let f = fixture(1024);

    let fetched = f
        .flow
        .fetch_remote(&format!("{base}/files/reply-brief.pdf"))
        .await
        .unwrap();

    assert_eq!(fetched.file_name.as_deref(), Some("reply-brief.pdf"));
    assert_eq!(fetched.bytes, fake_pdf("Respondent's reply."));
}

#[tokio::test]
async fn fetch_remote_rejects_missing_files_and_bad_schemes() {
    let base = serve_files().await;
    let f = fixture(1024);

    assert!(matches!(
        f.flow.fetch_remote(&format!("{base}/files/missing.pdf")).await,
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        f.flow.fetch_remote("file:///etc/passwd").await,
        Err(ServiceError::Validation(_))
    ));
}

#[tokio::test]
async fn fetch_remote_respects_size_limit() {
    let base = serve_files().await;
    let f = fixture(8);

    let result = f
        .flow
        .fetch_remote(&format!("{base}/files/reply-brief.pdf"))
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn fetch_remote_reads_streamed_body() {
    let base = serve_files().await;
    let f = fixture(1024);

    let fetched = f
        .flow
        .fetch_remote(&format!("{base}/files/streamed.pdf"))
        .await
        .unwrap();

    assert_eq!(fetched.bytes, b"%PDF-1.4 streamed brief".to_vec());
}

#[tokio::test]
async fn fetch_remote_stops_streamed_body_at_size_limit() {
    let base = serve_files().await;
    let f = fixture(8);

    let result = f
        .flow
        .fetch_remote(&format!("{base}/files/streamed.pdf"))
        .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn fetch_remote_timeout_is_an_upstream_error() {
    let base = serve_files().await;
    let f = fixture_with_timeout(1024, Duration::from_millis(50));

    let result = f.flow.fetch_remote(&format!("{base}/files/slow.pdf")).await;
    assert!(matches!(result, Err(ServiceError::DownloadTimeout { .. })));
}
