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

//! Analysis flow: the paid operation.
//!
//! # Ordering
//!
//! | Step | Failure |
//! |------|---------|
//! | Resolve document | `DocumentNotFound` |
//! | Check the text is usable | `NoExtractableText`, nothing charged |
//! | Debit the account | `InsufficientCredits`, no remote call |
//! | Remote completion (bounded) | `Analysis` / `AnalysisTimeout`, credit refunded |
//! | Parse reply | never fails: unparseable replies are tagged |
//!
//! The debit is held by a `PendingDebit` until a reply arrives, so a
//! caller that goes away during the remote call is refunded too.

use crate::base::{AccountId, DocumentId};
use crate::document::DocumentStore;
use crate::error::{LedgerError, ServiceError};
use crate::ledger::Ledger;
use crate::llm::AnalysisClient;
use crate::prompts::{ANALYSIS_SYSTEM_PROMPT, analysis_user_prompt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Structured analysis of a brief.
///
/// Every field is optional in the model reply; unknown keys are kept in
/// `extra` rather than dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisPayload {
    pub summary: String,
    pub parties: Vec<String>,
    pub key_issues: Vec<String>,
    pub arguments: Vec<String>,
    pub cited_authorities: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Model reply, validated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisResult {
    Structured(AnalysisPayload),
    /// The reply was not a JSON object of the expected shape.
    Unstructured {
        #[serde(rename = "parseError")]
        parse_error: bool,
        raw: String,
    },
}

impl AnalysisResult {
    pub fn is_structured(&self) -> bool {
        matches!(self, AnalysisResult::Structured(_))
    }

    /// Validates a raw model reply.
    ///
    /// An outer Markdown code fence is stripped before parsing.
    pub fn from_reply(raw: &str) -> Self {
        let body = strip_code_fence(raw);
        let parsed = serde_json::from_str::<Value>(body)
            .ok()
            .filter(Value::is_object)
            .and_then(|value| serde_json::from_value::<AnalysisPayload>(value).ok());
        match parsed {
            Some(payload) => AnalysisResult::Structured(payload),
            None => AnalysisResult::Unstructured {
                parse_error: true,
                raw: raw.to_string(),
            },
        }
    }
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```$").expect("valid fence regex"));

fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Successful analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub document_id: DocumentId,
    pub account_id: AccountId,
    pub result: AnalysisResult,
    pub remaining_credits: u64,
}

pub struct AnalysisFlow {
    documents: Arc<dyn DocumentStore>,
    ledger: Arc<dyn Ledger>,
    client: Arc<dyn AnalysisClient>,
    cost: u64,
    max_prompt_chars: usize,
    timeout: Duration,
}

impl AnalysisFlow {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        ledger: Arc<dyn Ledger>,
        client: Arc<dyn AnalysisClient>,
        cost: u64,
        max_prompt_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            documents,
            ledger,
            client,
            cost,
            max_prompt_chars,
            timeout,
        }
    }

    /// Analyzes a stored document on behalf of an account.
    ///
    /// The effective account is `account_id` if given, else the document
    /// owner (which is itself anonymous when the upload carried no account).
    ///
    /// # Errors
    ///
    /// - [`ServiceError::DocumentNotFound`] - unknown document.
    /// - [`ServiceError::NoExtractableText`] - empty text; no credit is taken.
    /// - [`ServiceError::InsufficientCredits`] - balance below the analysis cost.
    /// - [`ServiceError::Analysis`] / [`ServiceError::AnalysisTimeout`] - remote call failed; the credit is refunded.
    pub async fn analyze(
        &self,
        document_id: &DocumentId,
        account_id: Option<&str>,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let document = self
            .documents
            .get(document_id)
            .ok_or_else(|| ServiceError::DocumentNotFound(document_id.clone()))?;

        let account_id = match account_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => AccountId::new(id),
            None => document.owner_account_id.clone(),
        };

        if !document.has_text() {
            return Err(ServiceError::NoExtractableText(document_id.clone()));
        }

        let remaining = self
            .ledger
            .try_debit(&account_id, self.cost)
            .map_err(|e| match e {
                LedgerError::InsufficientCredits { balance, .. } => {
                    ServiceError::InsufficientCredits {
                        account_id: account_id.clone(),
                        balance,
                    }
                }
                other => ServiceError::Ledger(other),
            })?;
        let debit = PendingDebit::new(Arc::clone(&self.ledger), account_id.clone(), self.cost);

        let user_prompt = analysis_user_prompt(&document.extracted_text, self.max_prompt_chars);
        let reply = tokio::time::timeout(
            self.timeout,
            self.client.complete(ANALYSIS_SYSTEM_PROMPT, &user_prompt),
        )
        .await;

        // Dropping `debit` on the error arms refunds the credit.
        let raw = match reply {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(ServiceError::Analysis(e)),
            Err(_) => {
                return Err(ServiceError::AnalysisTimeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };
        debit.settle();

        let result = AnalysisResult::from_reply(&raw);
        if !result.is_structured() {
            warn!(document = %document_id, "analysis reply was not valid JSON");
        }
        info!(
            document = %document_id,
            account = %account_id,
            remaining,
            "analysis completed"
        );
        Ok(AnalysisOutcome {
            document_id: document_id.clone(),
            account_id,
            result,
            remaining_credits: remaining,
        })
    }
}

/// A debit that is refunded on drop unless settled.
struct PendingDebit {
    ledger: Arc<dyn Ledger>,
    account_id: AccountId,
    amount: u64,
    settled: bool,
}

impl PendingDebit {
    fn new(ledger: Arc<dyn Ledger>, account_id: AccountId, amount: u64) -> Self {
        Self {
            ledger,
            account_id,
            amount,
            settled: false,
        }
    }

    /// Keeps the credit spent.
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingDebit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        match self.ledger.refund(&self.account_id, self.amount) {
            Ok(balance) => warn!(account = %self.account_id, balance, "analysis failed, credit refunded"),
            Err(e) => warn!(account = %self.account_id, "analysis refund failed: {}", e),
        }
    }
}
