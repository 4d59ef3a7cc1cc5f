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

//! Credit ledger.
//!
//! [`Ledger`] is the repository contract the checkout and analysis flows call
//! into; [`InMemoryLedger`] is the process-local implementation.
//!
//! # Operations
//!
//! - **Credit**: add purchased credits, creating the account if needed.
//! - **Try debit**: spend credits only if the balance covers them.
//! - **Refund**: give back credits whose paid work did not complete.
//!
//! # Thread Safety
//!
//! Accounts live in a [`DashMap`] and each one guards its balance with its
//! own mutex. Operations on different accounts proceed in parallel; operations
//! on the same account are serialised, so two debits against a balance of 1
//! cannot both succeed.

use crate::account::{Account, LedgerEntry};
use crate::base::AccountId;
use crate::error::LedgerError;
use dashmap::DashMap;
use tracing::debug;

/// Storage contract for credit balances.
///
/// Unknown accounts read as zero. Mutating operations get-or-create the
/// account, so the first reference to an identifier opens it with no credits.
pub trait Ledger: Send + Sync {
    /// Current balance, 0 for unknown accounts.
    fn balance(&self, account_id: &AccountId) -> u64;

    /// Adds `amount` credits and returns the new balance.
    fn credit(&self, account_id: &AccountId, amount: u64) -> Result<u64, LedgerError>;

    /// Atomically checks and decrements the balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientCredits`] - balance is below `amount`; nothing changes.
    /// - [`LedgerError::InvalidAmount`] - `amount` is zero.
    fn try_debit(&self, account_id: &AccountId, amount: u64) -> Result<u64, LedgerError>;

    /// Returns previously debited credits.
    fn refund(&self, account_id: &AccountId, amount: u64) -> Result<u64, LedgerError>;

    /// Journal of an account, oldest first. Empty for unknown accounts.
    fn history(&self, account_id: &AccountId) -> Vec<LedgerEntry>;
}

/// Process-local ledger backed by a concurrent map.
///
/// Balances do not survive a restart.
pub struct InMemoryLedger {
    accounts: DashMap<AccountId, Account>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        InMemoryLedger {
            accounts: DashMap::new(),
        }
    }

    /// Runs `op` against the account, opening it with zero credits first if
    /// it does not exist yet.
    fn with_account<T>(&self, account_id: &AccountId, op: impl FnOnce(&Account) -> T) -> T {
        if let Some(account) = self.accounts.get(account_id) {
            return op(account.value());
        }
        let account = self
            .accounts
            .entry(account_id.clone())
            .or_insert_with(|| Account::new(account_id.clone()));
        op(account.value())
    }

    /// Returns an iterator over all accounts.
    pub fn accounts(
        &self,
    ) -> impl Iterator<Item = dashmap::mapref::multiple::RefMulti<'_, AccountId, Account>> {
        self.accounts.iter()
    }

    /// Retrieves an account by ID, `None` if it was never referenced.
    pub fn get_account(
        &self,
        account_id: &AccountId,
    ) -> Option<dashmap::mapref::one::Ref<'_, AccountId, Account>> {
        self.accounts.get(account_id)
    }
}

impl Ledger for InMemoryLedger {
    fn balance(&self, account_id: &AccountId) -> u64 {
        self.accounts
            .get(account_id)
            .map(|account| account.credits())
            .unwrap_or(0)
    }

    fn credit(&self, account_id: &AccountId, amount: u64) -> Result<u64, LedgerError> {
        let balance = self.with_account(account_id, |account| account.grant(amount))?;
        debug!(account = %account_id, amount, balance, "credited");
        Ok(balance)
    }

    fn try_debit(&self, account_id: &AccountId, amount: u64) -> Result<u64, LedgerError> {
        let balance = self.with_account(account_id, |account| account.debit(amount))?;
        debug!(account = %account_id, amount, balance, "debited");
        Ok(balance)
    }

    fn refund(&self, account_id: &AccountId, amount: u64) -> Result<u64, LedgerError> {
        let balance = self.with_account(account_id, |account| account.refund(amount))?;
        debug!(account = %account_id, amount, balance, "refunded");
        Ok(balance)
    }

    fn history(&self, account_id: &AccountId) -> Vec<LedgerEntry> {
        self.accounts
            .get(account_id)
            .map(|account| account.entries())
            .unwrap_or_default()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}
