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

//! In-process stand-ins for the external collaborators.

#![allow(dead_code)]

use brief_ledger_rs::extract::looks_like_pdf;
use brief_ledger_rs::{
    AccountId, AnalysisClient, BlobStore, CapturedOrder, CreatedOrder, OrderId, OrderRequest,
    PaymentGateway, TextExtractor, UpstreamError,
};
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

async fn pause(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

// === Payment gateway ===

#[derive(Debug, Clone)]
struct PendingOrder {
    account_id: Option<String>,
    amount: Option<String>,
}

/// Gateway that remembers created orders and captures them on request.
#[derive(Debug, Default)]
pub struct StubGateway {
    orders: DashMap<String, PendingOrder>,
    next_id: AtomicU64,
    pub create_calls: AtomicUsize,
    pub capture_calls: AtomicUsize,
    pub fail_capture: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an order as if a buyer had approved it.
    pub fn approve(&self, order_id: &str, account_id: Option<&str>, amount: Option<&str>) {
        self.orders.insert(
            order_id.to_string(),
            PendingOrder {
                account_id: account_id.map(str::to_string),
                amount: amount.map(str::to_string),
            },
        );
    }

    pub fn captures(&self) -> usize {
        self.capture_calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl PaymentGateway for StubGateway {
    fn create_order<'a>(
        &'a self,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, Result<CreatedOrder, UpstreamError>> {
        Box::pin(async move {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            pause(&self.delay_ms).await;
            let id = format!("ORDER-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.approve(&id, Some(request.account_id.as_str()), Some(&request.amount));
            Ok(CreatedOrder {
                order_id: OrderId::new(id.clone()),
                approval_url: format!("https://gateway.test/checkoutnow?token={id}"),
            })
        })
    }

    fn capture_order<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, Result<CapturedOrder, UpstreamError>> {
        Box::pin(async move {
            self.capture_calls.fetch_add(1, Ordering::SeqCst);
            pause(&self.delay_ms).await;
            if self.fail_capture.load(Ordering::SeqCst) {
                return Err(UpstreamError::new(Some(422), "UNPROCESSABLE_ENTITY"));
            }
            let order = self
                .orders
                .get(order_id.as_str())
                .map(|o| o.value().clone())
                .ok_or_else(|| UpstreamError::new(Some(404), "RESOURCE_NOT_FOUND"))?;
            Ok(CapturedOrder {
                order_id: order_id.clone(),
                status: Some("COMPLETED".to_string()),
                account_id: order.account_id,
                amount: order.amount,
            })
        })
    }
}

// === Language model ===

/// Analysis client returning a canned reply and counting calls.
#[derive(Debug)]
pub struct StubAnalysisClient {
    reply: Mutex<Result<String, UpstreamError>>,
    pub calls: AtomicUsize,
    pub delay_ms: AtomicU64,
    pub last_prompt: Mutex<Option<String>>,
}

impl StubAnalysisClient {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Mutex::new(Ok(reply.to_string())),
            calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn failing(status: u16, message: &str) -> Self {
        let client = Self::replying("");
        *client.reply.lock() = Err(UpstreamError::new(Some(status), message));
        client
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl AnalysisClient for StubAnalysisClient {
    fn complete<'a>(
        &'a self,
        _system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, UpstreamError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock() = Some(user_prompt.to_string());
            pause(&self.delay_ms).await;
            let reply = self.reply.lock().clone();
            reply
        })
    }
}

pub const STRUCTURED_REPLY: &str = r#"{
  "summary": "Appellant challenges the denial of a motion to suppress.",
  "parties": ["State", "Appellant"],
  "keyIssues": ["Fourth Amendment standing"],
  "arguments": ["The search exceeded the warrant's scope."],
  "citedAuthorities": ["Mapp v. Ohio, 367 U.S. 643 (1961)"],
  "weaknesses": ["No record citation for the consent claim."],
  "recommendations": ["Address the inevitable discovery doctrine."]
}"#;

// === Storage and extraction ===

/// Blob store keeping uploads in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    pub blobs: DashMap<String, Vec<u8>>,
    pub fail: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        bytes: &'a [u8],
        _content_type: &'a str,
    ) -> BoxFuture<'a, Result<String, UpstreamError>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(UpstreamError::new(Some(503), "blob service unavailable"));
            }
            self.blobs.insert(key.to_string(), bytes.to_vec());
            Ok(format!("memory://{key}"))
        })
    }
}

/// Treats everything after a `%PDF-` header line as the document text.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderStrippingExtractor;

impl TextExtractor for HeaderStrippingExtractor {
    fn extract<'a>(&'a self, bytes: &'a [u8]) -> BoxFuture<'a, String> {
        Box::pin(async move {
            if !looks_like_pdf(bytes) {
                return String::new();
            }
            let text = String::from_utf8_lossy(bytes);
            text.split_once('\n')
                .map(|(_, body)| body.to_string())
                .unwrap_or_default()
        })
    }
}

/// Minimal "PDF" the extractor above reads `text` from.
pub fn fake_pdf(text: &str) -> Vec<u8> {
    format!("%PDF-1.4\n{text}").into_bytes()
}

pub fn account(id: &str) -> AccountId {
    AccountId::new(id)
}
