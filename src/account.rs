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

//! Account state and the per-account mutation primitives.
//!
//! Each [`Account`] guards its mutable state with a [`parking_lot::Mutex`].
//! Single-account operations (deposit, withdrawal) lock and commit inside
//! this module. Transfers need both sides under lock at once, so the engine
//! holds the guards across the whole check-evaluate-commit sequence; see
//! [`Account::lock`].
//!
//! # Invariants
//!
//! - `balance >= 0` at all times.
//! - `daily_transferred_out` resets to zero whenever the clock crosses a UTC
//!   day boundary relative to `daily_window_start`.

use crate::LedgerError;
use crate::base::{AccountId, AccountNumber, UserId};
use chrono::{DateTime, NaiveTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Kind of bank account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Savings,
    Current,
    FixedDeposit,
}

/// Mutable account state. Only reachable through the owning [`Account`] lock.
#[derive(Debug)]
pub(crate) struct AccountData {
    balance: Decimal,
    /// Amount debited by transfers since the start of the current UTC day.
    daily_transferred_out: Decimal,
    /// Marks when the daily counter last reset.
    daily_window_start: DateTime<Utc>,
    active: bool,
}

impl AccountData {
    fn new(opening_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            balance: opening_balance,
            daily_transferred_out: Decimal::ZERO,
            daily_window_start: start_of_utc_day(now),
            active: true,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            self.daily_transferred_out >= Decimal::ZERO,
            "Invariant violated: daily counter went negative: {}",
            self.daily_transferred_out
        );
    }

    pub(crate) fn balance(&self) -> Decimal {
        self.balance
    }

    pub(crate) fn daily_transferred_out(&self) -> Decimal {
        self.daily_transferred_out
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Increases the balance.
    pub(crate) fn credit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        self.balance += amount;
        self.assert_invariants();
        Ok(())
    }

    /// Decreases the balance.
    pub(crate) fn debit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        self.balance -= amount;
        self.assert_invariants();
        Ok(())
    }

    /// Resets the daily counter if `now` is on a later UTC day than the
    /// window marker. Must run before any read of the daily counter.
    pub(crate) fn reset_daily_window_if_stale(&mut self, now: DateTime<Utc>) {
        if now.date_naive() != self.daily_window_start.date_naive() {
            self.daily_transferred_out = Decimal::ZERO;
            self.daily_window_start = start_of_utc_day(now);
        }
    }

    /// Records a committed transfer out of this account.
    ///
    /// The daily cap is advisory in this design: the counter feeds fraud
    /// evaluation and reporting, it never blocks a debit.
    pub(crate) fn note_transfer_out(&mut self, amount: Decimal) {
        self.daily_transferred_out += amount;
        self.assert_invariants();
    }
}

fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// A ledger account: immutable identity plus lock-guarded balance state.
#[derive(Debug)]
pub struct Account {
    id: AccountId,
    number: AccountNumber,
    kind: AccountType,
    owner: UserId,
    inner: Mutex<AccountData>,
}

impl Account {
    /// Currency amounts are reported with two decimal places.
    const DECIMAL_PRECISION: u32 = 2;

    pub fn new(
        id: AccountId,
        number: AccountNumber,
        kind: AccountType,
        owner: UserId,
        opening_balance: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            number,
            kind,
            owner,
            inner: Mutex::new(AccountData::new(opening_balance, now)),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn number(&self) -> &AccountNumber {
        &self.number
    }

    pub fn kind(&self) -> AccountType {
        self.kind
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    /// Amount transferred out since the last daily-window reset.
    ///
    /// Reads the raw counter; callers that care about staleness go through
    /// an operation that refreshes the window first.
    pub fn daily_transferred_out(&self) -> Decimal {
        self.inner.lock().daily_transferred_out
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn set_active(&self, active: bool) {
        self.inner.lock().set_active(active);
    }

    /// Locks the account state for a compound critical section.
    ///
    /// The engine uses this to hold both sides of a transfer at once;
    /// guards must be acquired in ascending [`AccountId`] order.
    pub(crate) fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.inner.lock()
    }

    /// Credits the account. Returns the new balance.
    pub fn deposit(&self, amount: Decimal) -> Result<Decimal, LedgerError> {
        let mut data = self.inner.lock();
        if !data.is_active() {
            return Err(LedgerError::AccountInactive);
        }
        data.credit(amount)?;
        Ok(data.balance())
    }

    /// Debits the account. Returns the new balance.
    pub fn withdraw(&self, amount: Decimal, now: DateTime<Utc>) -> Result<Decimal, LedgerError> {
        let mut data = self.inner.lock();
        if !data.is_active() {
            return Err(LedgerError::AccountInactive);
        }
        data.reset_daily_window_if_stale(now);
        data.debit(amount)?;
        Ok(data.balance())
    }
}

impl Serialize for Account {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Account", 5)?;
        state.serialize_field("number", &self.number)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field(
            "balance",
            &data.balance().round_dp(Account::DECIMAL_PRECISION),
        )?;
        state.serialize_field(
            "transferred_today",
            &data
                .daily_transferred_out()
                .round_dp(Account::DECIMAL_PRECISION),
        )?;
        state.serialize_field("active", &data.is_active())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn t(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn make_account(balance: Decimal) -> Account {
        Account::new(
            AccountId(1),
            AccountNumber::from("1000000001"),
            AccountType::Savings,
            UserId(1),
            balance,
            t(2026, 3, 1, 9, 0),
        )
    }

    // === AccountData Internal Tests ===

    #[test]
    fn credit_increases_balance() {
        let mut data = AccountData::new(dec!(100.00), t(2026, 3, 1, 9, 0));
        data.credit(dec!(50.00)).unwrap();
        assert_eq!(data.balance(), dec!(150.00));
    }

    #[test]
    fn debit_decreases_balance() {
        let mut data = AccountData::new(dec!(100.00), t(2026, 3, 1, 9, 0));
        data.debit(dec!(30.00)).unwrap();
        assert_eq!(data.balance(), dec!(70.00));
    }

    #[test]
    fn debit_insufficient_returns_error() {
        let mut data = AccountData::new(dec!(50.00), t(2026, 3, 1, 9, 0));
        let result = data.debit(dec!(100.00));
        assert_eq!(result, Err(LedgerError::InsufficientFunds));
        assert_eq!(data.balance(), dec!(50.00));
    }

    #[test]
    fn exact_balance_debit_succeeds() {
        let mut data = AccountData::new(dec!(50.00), t(2026, 3, 1, 9, 0));
        data.debit(dec!(50.00)).unwrap();
        assert_eq!(data.balance(), Decimal::ZERO);
    }

    #[test]
    fn zero_or_negative_amounts_rejected() {
        let mut data = AccountData::new(dec!(100.00), t(2026, 3, 1, 9, 0));
        assert_eq!(data.credit(Decimal::ZERO), Err(LedgerError::InvalidAmount));
        assert_eq!(data.debit(dec!(-1)), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn daily_window_resets_on_new_utc_day() {
        let mut data = AccountData::new(dec!(100.00), t(2026, 3, 1, 23, 50));
        data.note_transfer_out(dec!(40.00));
        assert_eq!(data.daily_transferred_out(), dec!(40.00));

        // Same day: no reset.
        data.reset_daily_window_if_stale(t(2026, 3, 1, 23, 59));
        assert_eq!(data.daily_transferred_out(), dec!(40.00));

        // Ten minutes later, past UTC midnight: counter resets.
        data.reset_daily_window_if_stale(t(2026, 3, 2, 0, 9));
        assert_eq!(data.daily_transferred_out(), Decimal::ZERO);
    }

    #[test]
    fn daily_window_marker_advances_to_day_start() {
        let mut data = AccountData::new(dec!(100.00), t(2026, 3, 1, 12, 0));
        data.reset_daily_window_if_stale(t(2026, 3, 3, 15, 30));
        // A later reset within the same day must not clear again.
        data.note_transfer_out(dec!(10.00));
        data.reset_daily_window_if_stale(t(2026, 3, 3, 23, 59));
        assert_eq!(data.daily_transferred_out(), dec!(10.00));
    }

    // === Account Public API Tests ===

    #[test]
    fn deposit_and_withdraw_roundtrip() {
        let account = make_account(dec!(100.00));
        assert_eq!(account.deposit(dec!(25.00)).unwrap(), dec!(125.00));
        assert_eq!(
            account.withdraw(dec!(50.00), t(2026, 3, 1, 10, 0)).unwrap(),
            dec!(75.00)
        );
    }

    #[test]
    fn inactive_account_rejects_operations() {
        let account = make_account(dec!(100.00));
        account.set_active(false);
        assert_eq!(
            account.deposit(dec!(10.00)),
            Err(LedgerError::AccountInactive)
        );
        assert_eq!(
            account.withdraw(dec!(10.00), t(2026, 3, 1, 10, 0)),
            Err(LedgerError::AccountInactive)
        );
    }

    #[test]
    fn withdraw_insufficient_leaves_balance_unchanged() {
        let account = make_account(dec!(30.00));
        let result = account.withdraw(dec!(31.00), t(2026, 3, 1, 10, 0));
        assert_eq!(result, Err(LedgerError::InsufficientFunds));
        assert_eq!(account.balance(), dec!(30.00));
    }

    // === Serialization Tests ===

    #[test]
    fn serializer_rounds_to_two_decimal_places() {
        let account = make_account(dec!(123.456));
        let json = serde_json::to_string(&account).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["number"].as_str().unwrap(), "1000000001");
        assert_eq!(parsed["kind"].as_str().unwrap(), "savings");
        // Banker's rounding: 123.456 -> 123.46
        assert_eq!(parsed["balance"].as_str().unwrap(), "123.46");
        assert_eq!(parsed["transferred_today"].as_str().unwrap(), "0");
        assert_eq!(parsed["active"], true);
    }
}
