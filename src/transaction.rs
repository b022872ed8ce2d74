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

//! Immutable transaction records.
//!
//! A [`Transaction`] is written exactly once per completed operation and is
//! never updated afterwards. Fraud-flagged transfers are recorded with their
//! verdict attached; the flag is computed at commit time and preserved on
//! read, never re-evaluated.

use crate::base::{AccountId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Debit one account, credit another.
    Transfer,
    /// External funds in; `from` is `None`.
    Deposit,
    /// Funds out of the ledger; `to` is `None`.
    Withdrawal,
}

/// A completed, immutable ledger movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub kind: TransactionKind,
    pub from: Option<AccountId>,
    pub to: Option<AccountId>,
    pub amount: Decimal,
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// `true` when any fraud rule matched. The transfer still committed.
    pub flagged: bool,
    /// Matched rule reasons in evaluation order, joined with `"; "`.
    pub flag_reason: Option<String>,
}

impl Transaction {
    /// Returns `true` when this transaction debits `account`.
    pub fn debits(&self, account: AccountId) -> bool {
        self.from == Some(account)
    }

    /// Returns `true` when this transaction touches `account` on either side.
    pub fn touches(&self, account: AccountId) -> bool {
        self.from == Some(account) || self.to == Some(account)
    }
}
