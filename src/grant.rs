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

//! Conversion of a captured payment amount into credits.
//!
//! ```text
//! credits = round(amount_paid / reference_price * reference_credits)
//! ```
//!
//! A result that is zero (or an amount that does not parse) grants the
//! reference bundle instead.

use crate::error::ServiceError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Price of the reference credit bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPolicy {
    pub reference_price: Decimal,
    pub reference_credits: u64,
}

impl CreditPolicy {
    /// Currency amounts carry at most this many fractional digits.
    pub const CURRENCY_SCALE: u32 = 2;

    pub fn new(reference_price: Decimal, reference_credits: u64) -> Self {
        Self {
            reference_price,
            reference_credits,
        }
    }

    /// Credits granted for a captured amount.
    ///
    /// `amount_paid` is the gateway's string value. Missing, unparseable,
    /// zero or negative amounts all fall back to the reference bundle.
    pub fn credits_for(&self, amount_paid: Option<&str>) -> u64 {
        let Some(amount) = amount_paid.and_then(|s| Decimal::from_str(s.trim()).ok()) else {
            return self.reference_credits;
        };
        if self.reference_price <= Decimal::ZERO {
            return self.reference_credits;
        }

        let credits = amount
            .checked_div(self.reference_price)
            .and_then(|ratio| ratio.checked_mul(Decimal::from(self.reference_credits)))
            .map(|raw| raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero));

        match credits.and_then(|c| c.to_u64()) {
            Some(credits) if credits > 0 => credits,
            _ => self.reference_credits,
        }
    }

    /// Reference price formatted the way the gateway expects it.
    pub fn reference_amount(&self) -> String {
        format_amount(self.reference_price)
    }
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            reference_price: dec!(15.00),
            reference_credits: 50,
        }
    }
}

/// Parses a caller-supplied checkout amount.
///
/// Accepts positive decimals with at most two fractional digits and returns
/// them normalised to two places (`"15"` → `"15.00"`).
pub fn parse_checkout_amount(raw: &str) -> Result<String, ServiceError> {
    let amount = Decimal::from_str(raw.trim())
        .map_err(|_| ServiceError::Validation(format!("amount '{raw}' is not a decimal")))?;
    if amount <= Decimal::ZERO {
        return Err(ServiceError::Validation(format!(
            "amount '{raw}' must be positive"
        )));
    }
    if amount.normalize().scale() > CreditPolicy::CURRENCY_SCALE {
        return Err(ServiceError::Validation(format!(
            "amount '{raw}' has more than two decimal places"
        )));
    }
    Ok(format_amount(amount))
}

fn format_amount(amount: Decimal) -> String {
    let mut amount = amount.round_dp(CreditPolicy::CURRENCY_SCALE);
    amount.rescale(CreditPolicy::CURRENCY_SCALE);
    amount.to_string()
}
