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

//! Ledger public API integration tests.

use brief_ledger_rs::{AccountId, EntryKind, InMemoryLedger, Ledger, LedgerError};
use std::sync::Arc;

fn acct(id: &str) -> AccountId {
    AccountId::new(id)
}

#[test]
fn unknown_account_has_zero_balance() {
    let ledger = InMemoryLedger::new();
    assert_eq!(ledger.balance(&acct("nobody")), 0);
    assert!(ledger.history(&acct("nobody")).is_empty());
}

#[test]
fn credit_opens_account() {
    let ledger = InMemoryLedger::new();
    assert_eq!(ledger.credit(&acct("a"), 50).unwrap(), 50);
    assert_eq!(ledger.balance(&acct("a")), 50);
    assert!(ledger.get_account(&acct("a")).is_some());
}

#[test]
fn credits_accumulate() {
    let ledger = InMemoryLedger::new();
    ledger.credit(&acct("a"), 50).unwrap();
    ledger.credit(&acct("a"), 100).unwrap();
    assert_eq!(ledger.balance(&acct("a")), 150);
}

#[test]
fn debit_decrements_balance() {
    let ledger = InMemoryLedger::new();
    ledger.credit(&acct("a"), 3).unwrap();
    assert_eq!(ledger.try_debit(&acct("a"), 1).unwrap(), 2);
    assert_eq!(ledger.try_debit(&acct("a"), 2).unwrap(), 0);
    assert_eq!(ledger.balance(&acct("a")), 0);
}

#[test]
fn debit_insufficient_leaves_balance_unchanged() {
    let ledger = InMemoryLedger::new();
    ledger.credit(&acct("a"), 2).unwrap();

    let result = ledger.try_debit(&acct("a"), 3);
    assert_eq!(
        result,
        Err(LedgerError::InsufficientCredits {
            balance: 2,
            requested: 3
        })
    );
    assert_eq!(ledger.balance(&acct("a")), 2);
}

#[test]
fn debit_on_fresh_account_fails() {
    let ledger = InMemoryLedger::new();
    assert!(matches!(
        ledger.try_debit(&acct("fresh"), 1),
        Err(LedgerError::InsufficientCredits { balance: 0, .. })
    ));
    assert_eq!(ledger.balance(&acct("fresh")), 0);
}

#[test]
fn zero_amounts_are_rejected() {
    let ledger = InMemoryLedger::new();
    assert_eq!(ledger.credit(&acct("a"), 0), Err(LedgerError::InvalidAmount));
    assert_eq!(ledger.try_debit(&acct("a"), 0), Err(LedgerError::InvalidAmount));
    assert_eq!(ledger.refund(&acct("a"), 0), Err(LedgerError::InvalidAmount));
}

#[test]
fn refund_restores_debited_credit() {
    let ledger = InMemoryLedger::new();
    ledger.credit(&acct("a"), 1).unwrap();
    ledger.try_debit(&acct("a"), 1).unwrap();
    assert_eq!(ledger.refund(&acct("a"), 1).unwrap(), 1);
}

#[test]
fn history_records_every_change_in_order() {
    let ledger = InMemoryLedger::new();
    let a = acct("a");
    ledger.credit(&a, 50).unwrap();
    ledger.try_debit(&a, 1).unwrap();
    ledger.refund(&a, 1).unwrap();
    let _ = ledger.try_debit(&a, 500);

    let kinds: Vec<(EntryKind, u64, u64)> = ledger
        .history(&a)
        .iter()
        .map(|e| (e.kind, e.amount, e.balance_after))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (EntryKind::Grant, 50, 50),
            (EntryKind::Debit, 1, 49),
            (EntryKind::Refund, 1, 50),
        ]
    );
}

#[test]
fn accounts_are_isolated() {
    let ledger = InMemoryLedger::new();
    ledger.credit(&acct("a"), 10).unwrap();
    ledger.credit(&acct("b"), 20).unwrap();
    ledger.try_debit(&acct("a"), 5).unwrap();

    assert_eq!(ledger.balance(&acct("a")), 5);
    assert_eq!(ledger.balance(&acct("b")), 20);
    assert_eq!(ledger.accounts().count(), 2);
}

#[test]
fn anonymous_is_an_ordinary_account() {
    let ledger = InMemoryLedger::new();
    let anon = AccountId::resolve(None);
    ledger.credit(&anon, 5).unwrap();
    assert_eq!(ledger.balance(&AccountId::resolve(Some("  "))), 5);
    assert_eq!(ledger.balance(&AccountId::new("anonymous")), 5);
}

#[test]
fn usable_as_trait_object() {
    let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::default());
    ledger.credit(&acct("a"), 1).unwrap();
    assert_eq!(ledger.balance(&acct("a")), 1);
}
