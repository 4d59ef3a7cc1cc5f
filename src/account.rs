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

//! Credit account management.
//!
//! Every balance change runs inside the account's mutex, so a check and the
//! mutation it guards are one critical section.
//!
//! # Example
//!
//! ```
//! use brief_ledger_rs::{Account, AccountId};
//!
//! let account = Account::new(AccountId::new("user-1"));
//! assert_eq!(account.credits(), 0);
//! account.grant(50).unwrap();
//! assert_eq!(account.debit(1).unwrap(), 49);
//! ```

use crate::base::AccountId;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Kind of balance change recorded in an account journal.
///
//  Grant ──► credits += n      (captured payment)
//  Debit ──► credits -= n      (paid analysis, only if credits >= n)
//  Refund ─► credits += n      (compensates a debit whose work failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Grant,
    Debit,
    Refund,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub kind: EntryKind,
    pub amount: u64,
    pub balance_after: u64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
struct AccountData {
    account_id: AccountId,
    credits: u64,
    entries: Vec<LedgerEntry>,
}

impl AccountData {
    fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            credits: 0,
            entries: Vec::new(),
        }
    }

    fn record(&mut self, kind: EntryKind, amount: u64) {
        self.entries.push(LedgerEntry {
            kind,
            amount,
            balance_after: self.credits,
            recorded_at: Utc::now(),
        });
    }

    /// Increases the balance.
    fn add(&mut self, kind: EntryKind, amount: u64) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        self.credits = self.credits.saturating_add(amount);
        self.record(kind, amount);
        Ok(self.credits)
    }

    /// Decreases the balance if it covers `amount`.
    fn subtract(&mut self, amount: u64) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.credits < amount {
            return Err(LedgerError::InsufficientCredits {
                balance: self.credits,
                requested: amount,
            });
        }
        self.credits -= amount;
        self.record(EntryKind::Debit, amount);
        Ok(self.credits)
    }
}

/// Credit account.
#[derive(Debug)]
pub struct Account {
    inner: Mutex<AccountData>,
}

impl Account {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            inner: Mutex::new(AccountData::new(account_id)),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.inner.lock().account_id.clone()
    }

    pub fn credits(&self) -> u64 {
        self.inner.lock().credits
    }

    /// Adds purchased credits and returns the new balance.
    pub fn grant(&self, amount: u64) -> Result<u64, LedgerError> {
        self.inner.lock().add(EntryKind::Grant, amount)
    }

    /// Spends credits, failing without change when the balance is short.
    pub fn debit(&self, amount: u64) -> Result<u64, LedgerError> {
        self.inner.lock().subtract(amount)
    }

    /// Returns credits taken by an earlier debit.
    pub fn refund(&self, amount: u64) -> Result<u64, LedgerError> {
        self.inner.lock().add(EntryKind::Refund, amount)
    }

    /// Snapshot of the journal, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().entries.clone()
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Account", 2)?;
        state.serialize_field("accountId", &data.account_id)?;
        state.serialize_field("credits", &data.credits)?;
        state.end()
    }
}
