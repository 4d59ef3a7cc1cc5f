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

//! Thread-safe registry of captured orders.
//!
//! Makes order capture idempotent: an order id is claimed before the gateway
//! is asked to capture it, and marked captured once its credits are granted.
//!
//! ```text
//!  (absent) ──claim──► InFlight ──complete──► Captured
//!                         │
//!                         └──release / ClaimGuard drop──► (absent)
//! ```

use crate::base::{AccountId, OrderId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// What was granted for a captured order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReceipt {
    pub account_id: AccountId,
    pub credits_added: u64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum CaptureState {
    InFlight,
    Captured(CaptureReceipt),
}

/// Result of trying to claim an order for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns the capture and must `complete` or `release` it.
    Acquired,
    /// Another caller is capturing this order.
    InProgress,
    /// The order was already captured and credited.
    Completed(CaptureReceipt),
}

/// Registry of order ids with duplicate-capture detection.
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    orders: DashMap<OrderId, CaptureState>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }

    /// Claims `order_id` for capture.
    pub fn claim(&self, order_id: &OrderId) -> Claim {
        // Entry API makes check-and-insert atomic across concurrent captures
        match self.orders.entry(order_id.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                CaptureState::InFlight => Claim::InProgress,
                CaptureState::Captured(receipt) => Claim::Completed(receipt.clone()),
            },
            Entry::Vacant(entry) => {
                entry.insert(CaptureState::InFlight);
                Claim::Acquired
            }
        }
    }

    /// Marks a claimed order as captured.
    pub fn complete(&self, order_id: &OrderId, receipt: CaptureReceipt) {
        self.orders
            .insert(order_id.clone(), CaptureState::Captured(receipt));
    }

    /// Drops an in-flight claim so the capture can be retried.
    ///
    /// Completed captures are never released.
    pub fn release(&self, order_id: &OrderId) {
        self.orders
            .remove_if(order_id, |_, state| matches!(state, CaptureState::InFlight));
    }

    /// Receipt of a captured order, `None` if absent or still in flight.
    pub fn receipt(&self, order_id: &OrderId) -> Option<CaptureReceipt> {
        self.orders.get(order_id).and_then(|state| match state.value() {
            CaptureState::Captured(receipt) => Some(receipt.clone()),
            CaptureState::InFlight => None,
        })
    }
}

/// Owns an acquired claim until it is completed.
///
/// Dropping the guard before [`ClaimGuard::complete`] releases the claim,
/// so a capture abandoned partway can be retried.
#[derive(Debug)]
pub struct ClaimGuard {
    registry: Arc<CaptureRegistry>,
    order_id: OrderId,
    armed: bool,
}

impl ClaimGuard {
    /// Wraps a claim the caller already acquired.
    pub fn new(registry: Arc<CaptureRegistry>, order_id: OrderId) -> Self {
        Self {
            registry,
            order_id,
            armed: true,
        }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    /// Records the receipt and disarms the guard.
    pub fn complete(mut self, receipt: CaptureReceipt) {
        self.registry.complete(&self.order_id, receipt);
        self.armed = false;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(&self.order_id);
        }
    }
}
