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

//! Error types for the ledger, its collaborators and the orchestration flows.
//!
//! - [`LedgerError`]: balance operations rejected by an account.
//! - [`UpstreamError`]: a remote collaborator (gateway, model, blob store) failed.
//! - [`ServiceError`]: the taxonomy surfaced to callers of the flows.

use crate::base::{AccountId, DocumentId, OrderId};
use std::fmt;
use thiserror::Error;

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Debit would take the balance below zero
    #[error("insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: u64, requested: u64 },
}

/// Failure reported by a remote collaborator.
///
/// `status` carries the upstream HTTP status when one was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "upstream returned {}: {}", status, self.message),
            None => write!(f, "upstream request failed: {}", self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl UpstreamError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Errors returned by the checkout, analysis and ingestion flows.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A required field is missing or malformed
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// The account cannot pay for the requested operation
    #[error("insufficient credits for account {account_id} (balance {balance})")]
    InsufficientCredits { account_id: AccountId, balance: u64 },

    /// The document has no text to analyze
    #[error("no extractable text in document {0}")]
    NoExtractableText(DocumentId),

    /// Payment gateway rejected or failed a call
    #[error("payment gateway error: {0}")]
    Gateway(UpstreamError),

    #[error("payment gateway did not respond within {secs}s")]
    GatewayTimeout { secs: u64 },

    /// Another request is capturing the same order right now
    #[error("capture already in progress for order {0}")]
    CaptureInProgress(OrderId),

    #[error("storage error: {0}")]
    Storage(String),

    /// The remote host for upload-by-url did not answer in time
    #[error("download did not complete within {secs}s")]
    DownloadTimeout { secs: u64 },

    /// Remote analysis call failed at the transport level
    #[error("analysis failed: {0}")]
    Analysis(UpstreamError),

    #[error("analysis did not complete within {secs}s")]
    AnalysisTimeout { secs: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
