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

//! Loan lifecycle and EMI computation.
//!
//! A loan is created pending, with no rate and no EMI. A single decision
//! either approves it (fixing the rate and computing the EMI) or rejects it.
//! No further transitions happen in this engine; closure of an approved loan
//! is an out-of-scope administrative action.

use crate::LedgerError;
use crate::base::{LoanId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of loan product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanType {
    Home,
    Personal,
    Vehicle,
}

/// Loan lifecycle state.
///
/// `Pending -> Approved | Rejected` is the only transition this engine
/// performs. `Closed` exists for approved loans paid off elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Closed,
}

/// A loan application and its decision state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub owner: UserId,
    pub kind: LoanType,
    pub principal: Decimal,
    pub tenure_months: u32,
    /// Annual interest rate in percent; `None` until approved.
    pub annual_rate: Option<Decimal>,
    /// Equated monthly installment; `None` until approved.
    pub emi: Option<Decimal>,
    pub status: LoanStatus,
    pub applied_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<UserId>,
}

/// Outcome an administrator hands to [`LoanBook::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanDecision {
    Approve { annual_rate: Decimal },
    Reject,
}

/// EMI amounts are rounded to two decimal places (banker's rounding).
const EMI_PRECISION: u32 = 2;

/// Computes the equated monthly installment for an amortizing loan.
///
/// With monthly rate `r = annual_rate / 12 / 100`:
/// - `r == 0`: `principal / tenure_months`
/// - otherwise: `principal * r * (1+r)^n / ((1+r)^n - 1)`
///
/// The zero-rate path stays in exact decimal arithmetic. The compounding
/// path routes the power term through `f64`, then rounds the result to two
/// decimal places.
///
/// # Errors
///
/// [`LedgerError::InvalidLoanParameters`] if `principal <= 0`,
/// `tenure_months == 0`, or `annual_rate < 0`.
pub fn compute_emi(
    principal: Decimal,
    annual_rate: Decimal,
    tenure_months: u32,
) -> Result<Decimal, LedgerError> {
    validate_terms(principal, tenure_months)?;
    if annual_rate < Decimal::ZERO {
        return Err(LedgerError::InvalidLoanParameters);
    }

    if annual_rate.is_zero() {
        let emi = principal / Decimal::from(tenure_months);
        return Ok(emi.round_dp(EMI_PRECISION));
    }

    let p = principal
        .to_f64()
        .ok_or(LedgerError::InvalidLoanParameters)?;
    let rate = annual_rate
        .to_f64()
        .ok_or(LedgerError::InvalidLoanParameters)?;
    let r = rate / 12.0 / 100.0;
    let growth = (1.0 + r).powi(tenure_months as i32);
    let emi = p * r * growth / (growth - 1.0);

    Decimal::from_f64(emi)
        .map(|d| d.round_dp(EMI_PRECISION))
        .ok_or(LedgerError::InvalidLoanParameters)
}

fn validate_terms(principal: Decimal, tenure_months: u32) -> Result<(), LedgerError> {
    if principal <= Decimal::ZERO || tenure_months == 0 {
        return Err(LedgerError::InvalidLoanParameters);
    }
    Ok(())
}

/// Concurrent store of loan applications.
#[derive(Debug, Default)]
pub struct LoanBook {
    loans: DashMap<LoanId, Loan>,
    next_id: AtomicU64,
}

impl LoanBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new application in `Pending` state, rate and EMI unset.
    pub fn apply(
        &self,
        owner: UserId,
        kind: LoanType,
        principal: Decimal,
        tenure_months: u32,
        now: DateTime<Utc>,
    ) -> Result<Loan, LedgerError> {
        validate_terms(principal, tenure_months)?;

        let id = LoanId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let loan = Loan {
            id,
            owner,
            kind,
            principal,
            tenure_months,
            annual_rate: None,
            emi: None,
            status: LoanStatus::Pending,
            applied_at: now,
            decided_at: None,
            decided_by: None,
        };
        self.loans.insert(id, loan.clone());
        Ok(loan)
    }

    /// Applies the one-shot decision to a pending loan.
    ///
    /// Approval fixes the annual rate, computes the EMI, and moves the loan
    /// to `Approved`. Rejection moves it to `Rejected` with no EMI.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::LoanNotFound`] for an unknown ID.
    /// - [`LedgerError::LoanAlreadyDecided`] when the loan left `Pending`.
    /// - [`LedgerError::InvalidLoanParameters`] for a negative approval rate.
    pub fn decide(
        &self,
        id: LoanId,
        decision: LoanDecision,
        decided_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Loan, LedgerError> {
        let mut entry = self.loans.get_mut(&id).ok_or(LedgerError::LoanNotFound)?;
        if entry.status != LoanStatus::Pending {
            return Err(LedgerError::LoanAlreadyDecided);
        }

        match decision {
            LoanDecision::Approve { annual_rate } => {
                let emi = compute_emi(entry.principal, annual_rate, entry.tenure_months)?;
                entry.annual_rate = Some(annual_rate);
                entry.emi = Some(emi);
                entry.status = LoanStatus::Approved;
            }
            LoanDecision::Reject => {
                entry.status = LoanStatus::Rejected;
            }
        }
        entry.decided_at = Some(now);
        entry.decided_by = Some(decided_by);
        Ok(entry.clone())
    }

    pub fn get(&self, id: LoanId) -> Option<Loan> {
        self.loans.get(&id).map(|l| l.clone())
    }

    /// All loans belonging to `owner`, oldest application first.
    pub fn loans_for(&self, owner: UserId) -> Vec<Loan> {
        let mut out: Vec<Loan> = self
            .loans
            .iter()
            .filter(|l| l.owner == owner)
            .map(|l| l.clone())
            .collect();
        out.sort_by_key(|l| l.id.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    // === EMI Computation ===

    #[test]
    fn zero_rate_emi_is_exact_division() {
        let emi = compute_emi(dec!(1200), dec!(0), 12).unwrap();
        assert_eq!(emi, dec!(100));
    }

    #[test]
    fn standard_amortization_value() {
        // 500000 at 8.5% over 120 months: monthly rate 0.0070833..,
        // standard amortization lands just under 6200 per month.
        let emi = compute_emi(dec!(500000), dec!(8.5), 120).unwrap();
        assert!(emi > dec!(6190) && emi < dec!(6210), "emi was {emi}");
        // Total repaid exceeds the principal when interest applies.
        assert!(emi * dec!(120) > dec!(500000));
    }

    #[test]
    fn emi_rounds_to_two_decimals() {
        let emi = compute_emi(dec!(100000), dec!(7.25), 36).unwrap();
        assert_eq!(emi, emi.round_dp(2));
        assert!(emi.scale() <= 2);
    }

    #[test]
    fn emi_grows_with_rate() {
        let low = compute_emi(dec!(250000), dec!(6), 60).unwrap();
        let high = compute_emi(dec!(250000), dec!(12), 60).unwrap();
        assert!(high > low);
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert_eq!(
            compute_emi(dec!(0), dec!(8.5), 12),
            Err(LedgerError::InvalidLoanParameters)
        );
        assert_eq!(
            compute_emi(dec!(-100), dec!(8.5), 12),
            Err(LedgerError::InvalidLoanParameters)
        );
        assert_eq!(
            compute_emi(dec!(1000), dec!(8.5), 0),
            Err(LedgerError::InvalidLoanParameters)
        );
        assert_eq!(
            compute_emi(dec!(1000), dec!(-1), 12),
            Err(LedgerError::InvalidLoanParameters)
        );
    }

    // === Loan Lifecycle ===

    #[test]
    fn apply_creates_pending_loan_without_emi() {
        let book = LoanBook::new();
        let loan = book
            .apply(UserId(1), LoanType::Home, dec!(500000), 120, now())
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.annual_rate, None);
        assert_eq!(loan.emi, None);
        assert_eq!(book.get(loan.id).unwrap(), loan);
    }

    #[test]
    fn approval_fixes_rate_and_emi() {
        let book = LoanBook::new();
        let loan = book
            .apply(UserId(1), LoanType::Home, dec!(500000), 120, now())
            .unwrap();

        let decided = book
            .decide(
                loan.id,
                LoanDecision::Approve {
                    annual_rate: dec!(8.5),
                },
                UserId(99),
                now(),
            )
            .unwrap();

        assert_eq!(decided.status, LoanStatus::Approved);
        assert_eq!(decided.annual_rate, Some(dec!(8.5)));
        assert_eq!(
            decided.emi,
            Some(compute_emi(dec!(500000), dec!(8.5), 120).unwrap())
        );
        assert_eq!(decided.decided_by, Some(UserId(99)));
        assert!(decided.decided_at.is_some());
    }

    #[test]
    fn rejection_leaves_emi_unset() {
        let book = LoanBook::new();
        let loan = book
            .apply(UserId(1), LoanType::Personal, dec!(20000), 24, now())
            .unwrap();

        let decided = book
            .decide(loan.id, LoanDecision::Reject, UserId(99), now())
            .unwrap();
        assert_eq!(decided.status, LoanStatus::Rejected);
        assert_eq!(decided.emi, None);
        assert_eq!(decided.annual_rate, None);
    }

    #[test]
    fn decision_is_one_shot() {
        let book = LoanBook::new();
        let loan = book
            .apply(UserId(1), LoanType::Vehicle, dec!(80000), 48, now())
            .unwrap();
        book.decide(loan.id, LoanDecision::Reject, UserId(99), now())
            .unwrap();

        let again = book.decide(
            loan.id,
            LoanDecision::Approve {
                annual_rate: dec!(9),
            },
            UserId(99),
            now(),
        );
        assert_eq!(again, Err(LedgerError::LoanAlreadyDecided));
    }

    #[test]
    fn decide_unknown_loan_fails() {
        let book = LoanBook::new();
        let result = book.decide(LoanId(404), LoanDecision::Reject, UserId(1), now());
        assert_eq!(result, Err(LedgerError::LoanNotFound));
    }

    #[test]
    fn loans_for_owner_in_application_order() {
        let book = LoanBook::new();
        let a = book
            .apply(UserId(1), LoanType::Home, dec!(100000), 60, now())
            .unwrap();
        book.apply(UserId(2), LoanType::Personal, dec!(5000), 12, now())
            .unwrap();
        let b = book
            .apply(UserId(1), LoanType::Vehicle, dec!(40000), 36, now())
            .unwrap();

        let mine = book.loans_for(UserId(1));
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, a.id);
        assert_eq!(mine[1].id, b.id);
    }
}
