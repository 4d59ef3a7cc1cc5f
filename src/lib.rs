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

//! # Brief Ledger
//!
//! Backend for a paid PDF brief analysis service. Users upload a brief,
//! buy credit bundles through a payment gateway and spend one credit per
//! AI analysis.
//!
//! ## Core Components
//!
//! - [`Ledger`]: per-account credit balances; [`InMemoryLedger`] is the default store
//! - [`CheckoutFlow`]: gateway orders and payment-to-credit reconciliation
//! - [`AnalysisFlow`]: the paid operation, gated on the ledger
//! - [`IngestFlow`]: upload, blob storage and text extraction
//! - [`server`]: the REST surface over the flows
//!
//! ## Example
//!
//! ```
//! use brief_ledger_rs::{AccountId, InMemoryLedger, Ledger};
//!
//! let ledger = InMemoryLedger::new();
//! let account = AccountId::new("user-1");
//!
//! ledger.credit(&account, 50).unwrap();
//! assert_eq!(ledger.try_debit(&account, 1).unwrap(), 49);
//! assert_eq!(ledger.balance(&account), 49);
//! ```
//!
//! ## Thread Safety
//!
//! Balances are kept per account behind their own lock, so requests for
//! different accounts never contend and a debit can never take a balance
//! below zero, however many run concurrently.

pub mod account;
pub mod analysis;
mod base;
pub mod capture_registry;
pub mod checkout;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod grant;
pub mod ingest;
pub mod ledger;
pub mod llm;
pub mod prompts;
pub mod server;
pub mod storage;

pub use account::{Account, EntryKind, LedgerEntry};
pub use analysis::{AnalysisFlow, AnalysisOutcome, AnalysisPayload, AnalysisResult};
pub use base::{AccountId, DocumentId, OrderId};
pub use capture_registry::{CaptureReceipt, CaptureRegistry, Claim, ClaimGuard};
pub use checkout::{CheckoutFlow, CheckoutOutcome};
pub use config::{Config, ConfigError};
pub use document::{Document, DocumentStore, InMemoryDocumentStore};
pub use error::{LedgerError, ServiceError, UpstreamError};
pub use extract::{PdfTextExtractor, TextExtractor};
pub use gateway::{CapturedOrder, CreatedOrder, OrderRequest, PayPalGateway, PayPalSettings, PaymentGateway};
pub use grant::CreditPolicy;
pub use ingest::{IngestFlow, Ingested};
pub use ledger::{InMemoryLedger, Ledger};
pub use llm::{AnalysisClient, OpenAiClient};
pub use storage::{BlobStore, HttpBlobStore, LocalBlobStore};
