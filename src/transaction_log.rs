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

//! Thread-safe, append-only transaction store with per-account history.
//!
//! Backs the fraud detector's velocity window and the history queries.
//! Records are deduplicated by transaction ID and indexed by source account
//! so the trailing-window scan does not walk the whole log.

use crate::LedgerError;
use crate::base::{AccountId, TransactionId};
use crate::transaction::Transaction;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Append-only concurrent transaction store.
///
/// Uses a [`DashMap`] keyed by transaction ID for O(1) duplicate detection
/// plus a per-source-account index for history scans. Appends for the same
/// source account are serialized by the engine's account lock, so the index
/// order for one account matches commit order.
#[derive(Debug, Default)]
pub struct TransactionLog {
    /// All records, keyed by transaction ID.
    transactions: DashMap<TransactionId, Arc<Transaction>>,
    /// Records debiting a given account, in commit order.
    by_source: DashMap<AccountId, Vec<Arc<Transaction>>>,
    /// Records crediting a given account, in commit order.
    by_destination: DashMap<AccountId, Vec<Arc<Transaction>>>,
}

impl TransactionLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateTransaction`] if a record with the
    /// same ID already exists.
    pub fn append(&self, transaction: Transaction) -> Result<Arc<Transaction>, LedgerError> {
        let transaction = Arc::new(transaction);

        // Entry API for atomic check-and-insert.
        match self.transactions.entry(transaction.id) {
            Entry::Occupied(_) => return Err(LedgerError::DuplicateTransaction),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&transaction));
            }
        }

        if let Some(from) = transaction.from {
            self.by_source
                .entry(from)
                .or_default()
                .push(Arc::clone(&transaction));
        }
        if let Some(to) = transaction.to {
            self.by_destination
                .entry(to)
                .or_default()
                .push(Arc::clone(&transaction));
        }

        Ok(transaction)
    }

    /// Looks up a record by ID.
    pub fn get(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.transactions.get(&id).map(|r| Arc::clone(&r))
    }

    /// Returns records debiting `account` with `timestamp > since`.
    ///
    /// The strict inequality gives the fraud detector its half-open trailing
    /// window: a record at exactly `now - window` is excluded.
    pub fn recent_from(&self, account: AccountId, since: DateTime<Utc>) -> Vec<Arc<Transaction>> {
        self.by_source
            .get(&account)
            .map(|list| {
                list.iter()
                    .filter(|tx| tx.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns records touching `account` on either side, newest first,
    /// capped at `limit`.
    pub fn history(&self, account: AccountId, limit: usize) -> Vec<Arc<Transaction>> {
        let mut out: Vec<Arc<Transaction>> = Vec::new();
        if let Some(list) = self.by_source.get(&account) {
            out.extend(list.iter().cloned());
        }
        if let Some(list) = self.by_destination.get(&account) {
            // Self-transfers are rejected upstream, so no record appears in
            // both indexes and no dedup is needed here.
            out.extend(list.iter().cloned());
        }
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.0.cmp(&a.id.0)));
        out.truncate(limit);
        out
    }

    /// Returns all flagged records, newest first.
    pub fn flagged(&self) -> Vec<Arc<Transaction>> {
        let mut out: Vec<Arc<Transaction>> = self
            .transactions
            .iter()
            .filter(|r| r.flagged)
            .map(|r| Arc::clone(&r))
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.0.cmp(&a.id.0)));
        out
    }

    /// Total number of records in the log.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
