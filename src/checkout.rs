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

//! Checkout flow: sells credit bundles through the payment gateway.
//!
//! # Reconciliation
//!
//! 1. [`CheckoutFlow::initiate_checkout`] creates a gateway order tagged with
//!    the account id and hands back the buyer approval URL.
//! 2. After approval the gateway redirects to the capture route with the
//!    order id. [`CheckoutFlow::finalize_checkout`] claims the order in the
//!    [`CaptureRegistry`], captures it, converts the captured amount into
//!    credits and grants them.
//!
//! A given order is credited at most once. A failed capture grants nothing
//! and leaves the order free to be captured again.
//!
//! Capture, grant and completion run on their own task, so a caller that
//! goes away mid-capture does not leave the order half reconciled.

use crate::base::{AccountId, OrderId};
use crate::capture_registry::{CaptureReceipt, CaptureRegistry, Claim, ClaimGuard};
use crate::error::{ServiceError, UpstreamError};
use crate::gateway::{CreatedOrder, OrderRequest, PaymentGateway};
use crate::grant::{CreditPolicy, parse_checkout_amount};
use crate::ledger::Ledger;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Result of finalizing a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub credits_added: u64,
    pub new_balance: u64,
    /// The order had been captured before; nothing was granted this time.
    pub already_captured: bool,
}

pub struct CheckoutFlow {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn Ledger>,
    captures: Arc<CaptureRegistry>,
    policy: CreditPolicy,
    default_description: String,
    timeout: Duration,
}

impl CheckoutFlow {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn Ledger>,
        policy: CreditPolicy,
        default_description: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            ledger,
            captures: Arc::new(CaptureRegistry::new()),
            policy,
            default_description: default_description.into(),
            timeout,
        }
    }

    pub fn policy(&self) -> &CreditPolicy {
        &self.policy
    }

    pub fn captures(&self) -> &CaptureRegistry {
        &self.captures
    }

    /// Creates a gateway order for `account_id`.
    ///
    /// `amount` defaults to the reference price and `description` to the
    /// configured order description.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] - `amount` is not a positive two-decimal value.
    /// - [`ServiceError::Gateway`] / [`ServiceError::GatewayTimeout`] - order creation failed.
    pub async fn initiate_checkout(
        &self,
        account_id: AccountId,
        amount: Option<&str>,
        description: Option<&str>,
    ) -> Result<CreatedOrder, ServiceError> {
        let amount = match amount.map(str::trim).filter(|a| !a.is_empty()) {
            Some(raw) => parse_checkout_amount(raw)?,
            None => self.policy.reference_amount(),
        };
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.default_description)
            .to_string();

        let request = OrderRequest {
            account_id,
            amount,
            description,
        };
        let order = self.call_gateway(self.gateway.create_order(&request)).await?;
        info!(
            order = %order.order_id,
            account = %request.account_id,
            amount = %request.amount,
            "checkout order created"
        );
        Ok(order)
    }

    /// Captures an approved order and grants its credits exactly once.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] - empty order token.
    /// - [`ServiceError::CaptureInProgress`] - the same order is being captured concurrently.
    /// - [`ServiceError::Gateway`] / [`ServiceError::GatewayTimeout`] - capture failed; nothing granted.
    pub async fn finalize_checkout(
        &self,
        order_token: &str,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let order_token = order_token.trim();
        if order_token.is_empty() {
            return Err(ServiceError::Validation("missing order token".into()));
        }
        let order_id = OrderId::new(order_token);

        match self.captures.claim(&order_id) {
            Claim::Acquired => {}
            Claim::InProgress => return Err(ServiceError::CaptureInProgress(order_id)),
            Claim::Completed(receipt) => {
                info!(order = %order_id, account = %receipt.account_id, "order already captured");
                return Ok(CheckoutOutcome {
                    new_balance: self.ledger.balance(&receipt.account_id),
                    order_id,
                    account_id: receipt.account_id,
                    credits_added: 0,
                    already_captured: true,
                });
            }
        }

        let task = tokio::spawn(capture_and_grant(
            Arc::clone(&self.gateway),
            Arc::clone(&self.ledger),
            self.policy,
            self.timeout,
            ClaimGuard::new(Arc::clone(&self.captures), order_id.clone()),
        ));
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(order = %order_id, "capture task failed: {}", e);
                Err(ServiceError::Gateway(UpstreamError::transport(format!(
                    "capture task failed: {e}"
                ))))
            }
        }
    }

    async fn call_gateway<T>(
        &self,
        call: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Result<T, ServiceError> {
        bounded(self.timeout, call).await
    }
}

async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, UpstreamError>>,
) -> Result<T, ServiceError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ServiceError::Gateway(e)),
        Err(_) => Err(ServiceError::GatewayTimeout {
            secs: timeout.as_secs(),
        }),
    }
}

/// Captures a claimed order and grants its credits.
///
/// Any early return drops `claim`, which releases the order for retry.
async fn capture_and_grant(
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn Ledger>,
    policy: CreditPolicy,
    timeout: Duration,
    claim: ClaimGuard,
) -> Result<CheckoutOutcome, ServiceError> {
    let order_id = claim.order_id().clone();
    let captured = match bounded(timeout, gateway.capture_order(&order_id)).await {
        Ok(captured) => captured,
        Err(e) => {
            warn!(order = %order_id, "capture failed: {}", e);
            return Err(e);
        }
    };

    let account_id = AccountId::resolve(captured.account_id.as_deref());
    let credits = policy.credits_for(captured.amount.as_deref());

    let new_balance = match ledger.credit(&account_id, credits) {
        Ok(balance) => balance,
        Err(e) => {
            error!(order = %order_id, account = %account_id, "captured order could not be credited: {}", e);
            return Err(e.into());
        }
    };
    claim.complete(CaptureReceipt {
        account_id: account_id.clone(),
        credits_added: credits,
        captured_at: Utc::now(),
    });

    info!(
        order = %order_id,
        account = %account_id,
        amount = ?captured.amount,
        credits,
        balance = new_balance,
        "order captured and credited"
    );
    Ok(CheckoutOutcome {
        order_id,
        account_id,
        credits_added: credits,
        new_balance,
        already_captured: false,
    })
}
