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

//! Error types for ledger operations.
//!
//! All validation errors are raised before any balance mutation, so a caller
//! receiving an error can assume no state changed. Fraud flags are not
//! errors; a flagged transfer is a successful transfer.

use thiserror::Error;

/// Ledger operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No account exists with the given account number
    #[error("account not found")]
    AccountNotFound,

    /// Account exists but has been deactivated
    #[error("account is inactive")]
    AccountInactive,

    /// Source and destination of a transfer are the same account
    #[error("cannot transfer to the same account")]
    SameAccountTransfer,

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// Debit would exceed the current balance
    #[error("insufficient funds")]
    InsufficientFunds,

    /// An account with this number already exists
    #[error("duplicate account number")]
    DuplicateAccountNumber,

    /// Transaction ID already recorded in the log
    #[error("duplicate transaction ID")]
    DuplicateTransaction,

    /// Loan principal, tenure, or rate outside the valid range
    #[error("invalid loan parameters")]
    InvalidLoanParameters,

    /// Referenced loan does not exist
    #[error("loan not found")]
    LoanNotFound,

    /// Loan has already been approved or rejected
    #[error("loan already decided")]
    LoanAlreadyDecided,

    /// Audit record could not be written.
    ///
    /// Non-fatal by contract: if the primary effect already committed, the
    /// engine reports this as a warning instead of propagating it.
    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),
}
