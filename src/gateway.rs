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

//! Payment gateway adapter.
//!
//! [`PaymentGateway`] is the seam the checkout flow depends on.
//! [`PayPalGateway`] implements it against the PayPal REST API:
//!
//! 1. `POST /v1/oauth2/token` - client-credentials exchange (cached).
//! 2. `POST /v2/checkout/orders` - create an order, account id in `custom_id`.
//! 3. `POST /v2/checkout/orders/{id}/capture` - capture an approved order.

use crate::base::{AccountId, OrderId};
use crate::error::UpstreamError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Order to be created at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub account_id: AccountId,
    /// Decimal string with two fractional digits, e.g. `"15.00"`.
    pub amount: String,
    pub description: String,
}

/// Order created at the gateway, awaiting buyer approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    pub approval_url: String,
}

/// Fields of a capture response the ledger cares about.
///
/// Both fields are optional: the checkout flow decides the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOrder {
    pub order_id: OrderId,
    pub status: Option<String>,
    pub account_id: Option<String>,
    pub amount: Option<String>,
}

pub trait PaymentGateway: Send + Sync {
    fn create_order<'a>(
        &'a self,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, Result<CreatedOrder, UpstreamError>>;

    fn capture_order<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, Result<CapturedOrder, UpstreamError>>;
}

/// PayPal credentials and redirect targets.
#[derive(Debug, Clone)]
pub struct PayPalSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub currency: String,
    /// Where PayPal sends the buyer after approval (our capture route).
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

pub struct PayPalGateway {
    client: reqwest::Client,
    settings: PayPalSettings,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalGateway {
    /// Tokens are refreshed this long before PayPal says they expire.
    const TOKEN_SLACK: Duration = Duration::from_secs(60);

    pub fn new(settings: PayPalSettings, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            settings: PayPalSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, UpstreamError> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
            .map(|token| token.value.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.settings.base_url))
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(upstream_failure(response).await);
        }
        let token: TokenResponse = response.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(Self::TOKEN_SLACK);
        *self.token.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!("Obtained PayPal access token valid for {:?}", lifetime);
        Ok(token.access_token)
    }

    fn order_body(&self, request: &OrderRequest) -> Value {
        json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": self.settings.currency,
                    "value": request.amount,
                },
                "description": request.description,
                "custom_id": request.account_id.as_str(),
            }],
            "application_context": {
                "return_url": self.settings.return_url,
                "cancel_url": self.settings.cancel_url,
                "user_action": "PAY_NOW",
            },
        })
    }
}

impl PaymentGateway for PayPalGateway {
    fn create_order<'a>(
        &'a self,
        request: &'a OrderRequest,
    ) -> BoxFuture<'a, Result<CreatedOrder, UpstreamError>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            let response = self
                .client
                .post(format!("{}/v2/checkout/orders", self.settings.base_url))
                .bearer_auth(token)
                .json(&self.order_body(request))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(upstream_failure(response).await);
            }
            let order: OrderResponse = response.json().await?;
            let approval_url = approval_link(&order.links).ok_or_else(|| {
                UpstreamError::new(None, format!("order {} has no approval link", order.id))
            })?;

            Ok(CreatedOrder {
                order_id: OrderId::new(order.id),
                approval_url,
            })
        })
    }

    fn capture_order<'a>(
        &'a self,
        order_id: &'a OrderId,
    ) -> BoxFuture<'a, Result<CapturedOrder, UpstreamError>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            let response = self
                .client
                .post(format!(
                    "{}/v2/checkout/orders/{}/capture",
                    self.settings.base_url, order_id
                ))
                .bearer_auth(token)
                .json(&json!({}))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(upstream_failure(response).await);
            }
            let body: Value = response.json().await?;
            let captured = parse_capture(order_id, &body);
            if captured.status.as_deref() != Some("COMPLETED") {
                warn!(order = %order_id, status = ?captured.status, "capture not completed");
            }
            Ok(captured)
        })
    }
}

/// Picks the buyer approval link of a created order.
fn approval_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel == "approve")
        .or_else(|| links.iter().find(|l| l.rel == "payer-action"))
        .map(|l| l.href.clone())
}

/// Extracts account reference and captured amount from a capture response.
///
/// The capture-level `custom_id` wins over the purchase-unit one.
pub fn parse_capture(order_id: &OrderId, body: &Value) -> CapturedOrder {
    let text = |pointer: &str| {
        body.pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    CapturedOrder {
        order_id: text("/id").map(OrderId::new).unwrap_or_else(|| order_id.clone()),
        status: text("/status"),
        account_id: text("/purchase_units/0/payments/captures/0/custom_id")
            .or_else(|| text("/purchase_units/0/custom_id")),
        amount: text("/purchase_units/0/payments/captures/0/amount/value")
            .or_else(|| text("/purchase_units/0/amount/value")),
    }
}

/// Builds an [`UpstreamError`] from a failed PayPal response.
async fn upstream_failure(response: reqwest::Response) -> UpstreamError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            let issue = v.pointer("/details/0/issue").and_then(Value::as_str);
            let message = v
                .get("message")
                .or_else(|| v.get("error_description"))
                .and_then(Value::as_str);
            match (issue, message) {
                (Some(issue), Some(message)) => Some(format!("{issue}: {message}")),
                (None, Some(message)) => Some(message.to_string()),
                (Some(issue), None) => Some(issue.to_string()),
                (None, None) => None,
            }
        })
        .unwrap_or(body);
    warn!("PayPal returned {}: {}", status, message);
    UpstreamError::new(Some(status), message)
}
