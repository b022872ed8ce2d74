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

//! Transfer orchestration engine.
//!
//! The [`Engine`] owns the account registry, the transaction log, the loan
//! book, and the audit sink, and composes them into atomic operations.
//!
//! # Atomicity
//!
//! A transfer holds both account mutexes (acquired in ascending
//! [`AccountId`] order, so opposing transfers cannot deadlock) across the
//! whole sequence: funds check, fraud snapshot, debit, credit, and
//! transaction append. Any concurrent transfer touching either account
//! observes the sequence as one unit; two transfers draining the same source
//! serialize on its lock, so they can never jointly overdraw it.
//!
//! # Fraud flags
//!
//! A matched fraud rule never rejects a transfer. The verdict is attached to
//! the persisted transaction for after-the-fact review.

use crate::account::{Account, AccountData, AccountType};
use crate::audit::{AuditLogEntry, AuditSink, MemoryAuditLog};
use crate::base::{AccountId, AccountNumber, LoanId, TransactionId, UserId};
use crate::error::LedgerError;
use crate::fraud::{FraudConfig, FraudDetector};
use crate::loan::{Loan, LoanBook, LoanDecision, LoanType};
use crate::transaction::{Transaction, TransactionKind};
use crate::transaction_log::TransactionLog;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::MutexGuard;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// History queries return at most this many records.
const HISTORY_LIMIT: usize = 50;

/// Generated account numbers start here, keeping them at ten digits.
const ACCOUNT_NUMBER_BASE: u64 = 1_000_000_000;

/// Result of a committed transfer, shaped for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
    pub flagged: bool,
    pub flag_reason: Option<String>,
    pub from_balance: Decimal,
    pub to_balance: Decimal,
}

/// Core banking engine: accounts, transfers, fraud annotation, loans, audit.
pub struct Engine {
    /// Accounts indexed by customer-facing number.
    accounts: DashMap<AccountNumber, Arc<Account>>,
    transactions: TransactionLog,
    loans: LoanBook,
    detector: FraudDetector,
    audit: Arc<dyn AuditSink>,
    next_account_id: AtomicU64,
    next_account_number: AtomicU64,
    next_transaction_id: AtomicU64,
    next_audit_id: AtomicU64,
}

impl Engine {
    /// Creates an engine with default fraud thresholds and an in-memory
    /// audit log.
    pub fn new() -> Self {
        Self::with_config(FraudConfig::default())
    }

    /// Creates an engine with deployment-specific fraud thresholds.
    pub fn with_config(config: FraudConfig) -> Self {
        Self::with_audit_sink(config, Arc::new(MemoryAuditLog::new()))
    }

    /// Creates an engine writing audit records to the given sink.
    pub fn with_audit_sink(config: FraudConfig, audit: Arc<dyn AuditSink>) -> Self {
        Engine {
            accounts: DashMap::new(),
            transactions: TransactionLog::new(),
            loans: LoanBook::new(),
            detector: FraudDetector::new(config),
            audit,
            next_account_id: AtomicU64::new(0),
            next_account_number: AtomicU64::new(0),
            next_transaction_id: AtomicU64::new(0),
            next_audit_id: AtomicU64::new(0),
        }
    }

    // === Accounts ===

    /// Opens an account with a freshly generated number.
    pub fn open_account(
        &self,
        owner: UserId,
        kind: AccountType,
        opening_balance: Decimal,
    ) -> Result<Arc<Account>, LedgerError> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        loop {
            let n = self.next_account_number.fetch_add(1, Ordering::Relaxed) + 1;
            let number = AccountNumber(format!("{:010}", ACCOUNT_NUMBER_BASE + n));
            match self.try_insert_account(owner, number, kind, opening_balance) {
                Ok(account) => return Ok(account),
                // Number already taken by a seeded account; draw the next one.
                Err(LedgerError::DuplicateAccountNumber) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Opens an account with a caller-chosen number. Used when seeding the
    /// ledger from external records.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateAccountNumber`] if the number is taken.
    pub fn open_account_numbered(
        &self,
        owner: UserId,
        number: AccountNumber,
        kind: AccountType,
        opening_balance: Decimal,
    ) -> Result<Arc<Account>, LedgerError> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.try_insert_account(owner, number, kind, opening_balance)
    }

    fn try_insert_account(
        &self,
        owner: UserId,
        number: AccountNumber,
        kind: AccountType,
        opening_balance: Decimal,
    ) -> Result<Arc<Account>, LedgerError> {
        let now = Utc::now();
        let account = match self.accounts.entry(number.clone()) {
            Entry::Occupied(_) => return Err(LedgerError::DuplicateAccountNumber),
            Entry::Vacant(entry) => {
                let id = AccountId(self.next_account_id.fetch_add(1, Ordering::Relaxed) + 1);
                let account = Arc::new(Account::new(
                    id,
                    number.clone(),
                    kind,
                    owner,
                    opening_balance,
                    now,
                ));
                entry.insert(Arc::clone(&account));
                account
            }
        };
        self.record_audit(owner, "ACCOUNT_CREATED", format!("Account {number} created"));
        Ok(account)
    }

    /// Looks up an account by its customer-facing number.
    pub fn account(&self, number: &str) -> Option<Arc<Account>> {
        self.accounts
            .get(&AccountNumber::from(number))
            .map(|r| Arc::clone(&r))
    }

    /// All accounts, sorted by number.
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        let mut out: Vec<Arc<Account>> = self.accounts.iter().map(|r| Arc::clone(&r)).collect();
        out.sort_by(|a, b| a.number().as_str().cmp(b.number().as_str()));
        out
    }

    /// Accounts owned by `owner`, sorted by number.
    pub fn accounts_for(&self, owner: UserId) -> Vec<Arc<Account>> {
        let mut out: Vec<Arc<Account>> = self
            .accounts
            .iter()
            .filter(|r| r.owner() == owner)
            .map(|r| Arc::clone(&r))
            .collect();
        out.sort_by(|a, b| a.number().as_str().cmp(b.number().as_str()));
        out
    }

    // === Transfers ===

    /// Moves `amount` from one account to another, all-or-nothing.
    ///
    /// Validation failures are raised before any balance changes. The fraud
    /// verdict is computed against the source balance before the debit and
    /// its trailing transaction history, and is attached to the persisted
    /// record; it never rejects the transfer.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - amount is zero or negative.
    /// - [`LedgerError::AccountNotFound`] - either number is unknown.
    /// - [`LedgerError::SameAccountTransfer`] - source equals destination.
    /// - [`LedgerError::AccountInactive`] - either account is deactivated.
    /// - [`LedgerError::InsufficientFunds`] - amount exceeds the source balance.
    pub fn transfer(
        &self,
        user: UserId,
        from_number: &str,
        to_number: &str,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<TransferReceipt, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let from = self.account(from_number).ok_or(LedgerError::AccountNotFound)?;
        let to = self.account(to_number).ok_or(LedgerError::AccountNotFound)?;
        if from.id() == to.id() {
            return Err(LedgerError::SameAccountTransfer);
        }

        let now = Utc::now();
        let receipt = {
            let (mut from_data, mut to_data) = lock_pair(&from, &to);

            if !from_data.is_active() || !to_data.is_active() {
                return Err(LedgerError::AccountInactive);
            }
            from_data.reset_daily_window_if_stale(now);
            if from_data.balance() < amount {
                return Err(LedgerError::InsufficientFunds);
            }

            // Fraud snapshot: balance before the debit plus the trailing
            // history. The source lock is held, so the history cannot gain
            // entries for this account mid-evaluation.
            let balance_before = from_data.balance();
            let window_start = now - self.detector.config().velocity_window;
            let history = self.transactions.recent_from(from.id(), window_start);
            let verdict = self.detector.evaluate(amount, balance_before, &history, now);

            let record = Transaction {
                id: self.next_transaction_id(),
                kind: TransactionKind::Transfer,
                from: Some(from.id()),
                to: Some(to.id()),
                amount,
                description,
                timestamp: now,
                flagged: verdict.flagged(),
                flag_reason: verdict.reason(),
            };
            // Append before touching balances: the funds check above already
            // guarantees the commit below cannot fail, while an append error
            // here leaves both accounts in their pre-transfer state.
            let record = self.transactions.append(record)?;

            from_data.debit(amount)?;
            to_data.credit(amount)?;
            from_data.note_transfer_out(amount);

            TransferReceipt {
                transaction_id: record.id,
                flagged: record.flagged,
                flag_reason: record.flag_reason.clone(),
                from_balance: from_data.balance(),
                to_balance: to_data.balance(),
            }
        };

        self.record_audit(
            user,
            "TRANSFER",
            format!("{amount} from {from_number} to {to_number}"),
        );
        Ok(receipt)
    }

    /// Credits an account from outside the ledger. Returns the new balance.
    pub fn deposit(
        &self,
        user: UserId,
        number: &str,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let account = self.account(number).ok_or(LedgerError::AccountNotFound)?;
        let balance = account.deposit(amount)?;

        let record = Transaction {
            id: self.next_transaction_id(),
            kind: TransactionKind::Deposit,
            from: None,
            to: Some(account.id()),
            amount,
            description: None,
            timestamp: Utc::now(),
            flagged: false,
            flag_reason: None,
        };
        self.transactions.append(record)?;
        self.record_audit(user, "DEPOSIT", format!("{amount} to {number}"));
        Ok(balance)
    }

    /// Debits an account out of the ledger. Returns the new balance.
    pub fn withdraw(
        &self,
        user: UserId,
        number: &str,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let account = self.account(number).ok_or(LedgerError::AccountNotFound)?;
        let now = Utc::now();
        let balance = account.withdraw(amount, now)?;

        let record = Transaction {
            id: self.next_transaction_id(),
            kind: TransactionKind::Withdrawal,
            from: Some(account.id()),
            to: None,
            amount,
            description: None,
            timestamp: now,
            flagged: false,
            flag_reason: None,
        };
        self.transactions.append(record)?;
        self.record_audit(user, "WITHDRAWAL", format!("{amount} from {number}"));
        Ok(balance)
    }

    // === Queries ===

    /// Looks up a persisted transaction. The flag verdict returned is the
    /// one computed at commit time; it is never re-evaluated on read.
    pub fn transaction(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.transactions.get(id)
    }

    /// Transactions touching the account on either side, newest first,
    /// capped at 50.
    pub fn history(&self, number: &str) -> Result<Vec<Arc<Transaction>>, LedgerError> {
        let account = self.account(number).ok_or(LedgerError::AccountNotFound)?;
        Ok(self.transactions.history(account.id(), HISTORY_LIMIT))
    }

    /// All transactions marked for review, newest first.
    pub fn flagged_transactions(&self) -> Vec<Arc<Transaction>> {
        self.transactions.flagged()
    }

    // === Loans ===

    /// Records a loan application in pending state.
    pub fn apply_loan(
        &self,
        user: UserId,
        kind: LoanType,
        principal: Decimal,
        tenure_months: u32,
    ) -> Result<Loan, LedgerError> {
        let loan = self
            .loans
            .apply(user, kind, principal, tenure_months, Utc::now())?;
        self.record_audit(
            user,
            "LOAN_APPLIED",
            format!("{:?} loan for {principal}", kind),
        );
        Ok(loan)
    }

    /// Applies the one-shot approval or rejection to a pending loan.
    /// Approval fixes the rate and computes the EMI.
    pub fn decide_loan(
        &self,
        admin: UserId,
        id: LoanId,
        decision: LoanDecision,
    ) -> Result<Loan, LedgerError> {
        let loan = self.loans.decide(id, decision, admin, Utc::now())?;
        let action = match decision {
            LoanDecision::Approve { .. } => "LOAN_APPROVED",
            LoanDecision::Reject => "LOAN_REJECTED",
        };
        self.record_audit(admin, action, format!("Loan {} {:?}", loan.id, loan.status));
        Ok(loan)
    }

    pub fn loan(&self, id: LoanId) -> Option<Loan> {
        self.loans.get(id)
    }

    pub fn loans_for(&self, owner: UserId) -> Vec<Loan> {
        self.loans.loans_for(owner)
    }

    // === Internals ===

    fn next_transaction_id(&self) -> TransactionId {
        TransactionId(self.next_transaction_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Appends an audit record. A sink failure is reported and swallowed:
    /// the triggering operation already committed and must not roll back.
    fn record_audit(&self, user: UserId, action: &str, details: String) {
        let entry = AuditLogEntry {
            id: self.next_audit_id.fetch_add(1, Ordering::Relaxed) + 1,
            user,
            action: action.to_string(),
            timestamp: Utc::now(),
            details,
        };
        if let Err(e) = self.audit.append(entry) {
            tracing::warn!(action, error = %e, "audit write failed; operation already committed");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Locks two distinct accounts, acquiring in ascending ID order, and returns
/// the guards in `(first, second)` argument order.
fn lock_pair<'a>(
    first: &'a Account,
    second: &'a Account,
) -> (MutexGuard<'a, AccountData>, MutexGuard<'a, AccountData>) {
    debug_assert_ne!(first.id(), second.id());
    if first.id() < second.id() {
        let a = first.lock();
        let b = second.lock();
        (a, b)
    } else {
        let b = second.lock();
        let a = first.lock();
        (a, b)
    }
}
