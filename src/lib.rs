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

//! # Bankcore
//!
//! This library provides a core banking ledger engine: atomic balance
//! transfers between accounts, rule-based fraud annotation, EMI loan
//! schedules, and an append-only audit trail.
//!
//! ## Core Components
//!
//! - [`Engine`]: orchestrates transfers, deposits, withdrawals, and loans
//! - [`Account`]: per-account balance state with its own lock
//! - [`FraudDetector`]: evaluates transfers against configurable rules
//! - [`LoanBook`] and [`compute_emi`]: loan lifecycle and repayment math
//! - [`MemoryAuditLog`]: append-only record of domain events
//! - [`LedgerError`]: error taxonomy for ledger operations
//!
//! ## Example
//!
//! ```
//! use bankcore_rs::{AccountType, Engine, UserId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let alice = engine
//!     .open_account(UserId(1), AccountType::Savings, dec!(1000.00))
//!     .unwrap();
//! let bob = engine
//!     .open_account(UserId(2), AccountType::Current, dec!(0.00))
//!     .unwrap();
//!
//! let receipt = engine
//!     .transfer(UserId(1), alice.number().as_str(), bob.number().as_str(), dec!(250.00), None)
//!     .unwrap();
//! assert!(!receipt.flagged);
//! assert_eq!(receipt.from_balance, dec!(750.00));
//! assert_eq!(receipt.to_balance, dec!(250.00));
//! ```
//!
//! ## Thread Safety
//!
//! Accounts live behind per-account mutexes; transfers lock both sides in
//! ascending account-ID order, so operations on disjoint accounts run in
//! parallel and operations on shared accounts serialize without deadlock.
//!
//! ## Fraud Flags
//!
//! Fraud evaluation annotates transfers, it never rejects them. A flagged
//! transfer commits normally and is queued for manual review.

pub mod account;
pub mod audit;
mod base;
mod engine;
pub mod error;
pub mod fraud;
pub mod loan;
mod transaction;
mod transaction_log;

pub use account::{Account, AccountType};
pub use audit::{AuditLogEntry, AuditSink, MemoryAuditLog};
pub use base::{AccountId, AccountNumber, LoanId, TransactionId, UserId};
pub use engine::{Engine, TransferReceipt};
pub use error::LedgerError;
pub use fraud::{FraudConfig, FraudDetector, Verdict};
pub use loan::{Loan, LoanBook, LoanDecision, LoanStatus, LoanType, compute_emi};
pub use transaction::{Transaction, TransactionKind};
pub use transaction_log::TransactionLog;
