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

//! Ingested documents and their store.

use crate::base::{AccountId, DocumentId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;

/// Extracted text of an uploaded brief plus its metadata.
///
/// Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub document_id: DocumentId,
    pub extracted_text: String,
    pub owner_account_id: AccountId,
    pub storage_key: String,
    pub original_name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Whether there is anything to analyze.
    pub fn has_text(&self) -> bool {
        !self.extracted_text.trim().is_empty()
    }
}

/// Storage contract for documents.
pub trait DocumentStore: Send + Sync {
    fn get(&self, document_id: &DocumentId) -> Option<Arc<Document>>;

    /// Stores a new document. Returns `false` without replacing anything if
    /// the identifier is already taken.
    fn put(&self, document: Document) -> bool;
}

/// Process-local document store.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<DocumentId, Arc<Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, document_id: &DocumentId) -> Option<Arc<Document>> {
        self.documents.get(document_id).map(|d| Arc::clone(d.value()))
    }

    fn put(&self, document: Document) -> bool {
        match self.documents.entry(document.document_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(document));
                true
            }
        }
    }
}
